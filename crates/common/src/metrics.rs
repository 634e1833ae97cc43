//! Prometheus metrics of the task scheduler and the batch pipeline.
//!
//! Everything is registered with the prometheus default registry. Storage code bumps these
//! only after the corresponding transaction committed.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram,
    IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    // ==================== Task Metrics ====================

    /// Task entries inserted or updated
    pub static ref TASKS_ADDED_TOTAL: IntCounter = register_int_counter!(
        "committee_tasks_added_total",
        "Total number of task entries added"
    )
    .unwrap();

    /// Tasks claimed by an executor
    pub static ref TASKS_STARTED_TOTAL: IntCounter = register_int_counter!(
        "committee_tasks_started_total",
        "Total number of tasks handed to executors"
    )
    .unwrap();

    /// Tasks that reached a terminal status
    pub static ref TASKS_TERMINATED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "committee_tasks_terminated_total",
        "Total number of tasks that reached a terminal status",
        &["status"] // status=[completed|failed]
    )
    .unwrap();

    /// Running tasks put back into the queue after a timeout
    pub static ref TASKS_RESCHEDULED_TOTAL: IntCounter = register_int_counter!(
        "committee_tasks_rescheduled_total",
        "Total number of hanging tasks rescheduled"
    )
    .unwrap();

    // ==================== Batch Metrics ====================

    /// Batch lifecycle events
    pub static ref BATCH_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "committee_batch_events_total",
        "Total number of batch lifecycle events",
        &["event"] // event=[created|sealed|proved|proposed|reset]
    )
    .unwrap();

    /// Time from fetching the first block of a batch to its proposal
    pub static ref BATCH_PROPOSAL_LATENCY: Histogram = register_histogram!(
        "committee_batch_proposal_latency_seconds",
        "Time from fetching the first block of a batch to proposing it",
        vec![1.0, 10.0, 30.0, 60.0, 300.0, 600.0, 1800.0, 3600.0, 7200.0]
    )
    .unwrap();
}

/// Label values of [`BATCH_EVENTS_TOTAL`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchEvent {
    Created,
    Sealed,
    Proved,
    Proposed,
    Reset,
}

impl BatchEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            BatchEvent::Created => "created",
            BatchEvent::Sealed => "sealed",
            BatchEvent::Proved => "proved",
            BatchEvent::Proposed => "proposed",
            BatchEvent::Reset => "reset",
        }
    }
}

pub fn record_batch_event(event: BatchEvent, count: u64) {
    BATCH_EVENTS_TOTAL
        .with_label_values(&[event.as_str()])
        .inc_by(count);
}

pub fn record_task_terminated(status: &str) {
    TASKS_TERMINATED_TOTAL.with_label_values(&[status]).inc();
}

/// Renders every registered metric in the prometheus text format.
pub fn render_text() -> Result<String, prometheus::Error> {
    let mut buf = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buf)?;
    String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
