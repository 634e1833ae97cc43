//! Constraints deciding whether a batch may keep growing.

use std::{fmt, time::Duration};

use committee_primitives::time::elapsed;
use serde::{Deserialize, Serialize};

use crate::BlockBatch;

/// Default time after which a non-empty batch gets sealed.
pub const DEFAULT_SEALING_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Default number of blocks (all shards together) a batch may hold.
pub const DEFAULT_MAX_BLOCKS_COUNT: usize = 1000;

/// Verdict of a constraint check, ordered by severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CheckResultKind {
    CanBeExtended,
    ShouldBeSealed,
    ShouldBeDiscarded,
}

impl fmt::Display for CheckResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckResultKind::CanBeExtended => "can be extended",
            CheckResultKind::ShouldBeSealed => "should be sealed",
            CheckResultKind::ShouldBeDiscarded => "should be discarded",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckResult {
    pub kind: CheckResultKind,
    pub details: String,
}

impl CheckResult {
    pub fn can_be_extended() -> Self {
        Self {
            kind: CheckResultKind::CanBeExtended,
            details: String::new(),
        }
    }

    pub fn should_be_sealed(details: impl Into<String>) -> Self {
        Self {
            kind: CheckResultKind::ShouldBeSealed,
            details: details.into(),
        }
    }

    pub fn should_be_discarded(details: impl Into<String>) -> Self {
        Self {
            kind: CheckResultKind::ShouldBeDiscarded,
            details: details.into(),
        }
    }

    /// Combines two verdicts. The more severe kind wins and carries both details; on a tie the
    /// first details are kept.
    pub fn join(self, other: CheckResult) -> CheckResult {
        if self.kind == other.kind {
            return self;
        }

        let kind = self.kind.max(other.kind);
        let details = [self.details, other.details]
            .into_iter()
            .filter(|d| !d.is_empty())
            .collect::<Vec<_>>()
            .join("; ");

        CheckResult { kind, details }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintConfig {
    pub sealing_timeout: Duration,
    pub max_blocks_count: usize,
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        Self {
            sealing_timeout: DEFAULT_SEALING_TIMEOUT,
            max_blocks_count: DEFAULT_MAX_BLOCKS_COUNT,
        }
    }
}

/// A single rule a batch is checked against.
pub trait BatchConstraint: fmt::Debug + Send + Sync {
    fn check(&self, batch: &BlockBatch, now_ms: u64) -> CheckResult;
}

#[derive(Debug)]
struct TimeoutConstraint {
    sealing_timeout: Duration,
}

impl BatchConstraint for TimeoutConstraint {
    fn check(&self, batch: &BlockBatch, now_ms: u64) -> CheckResult {
        if batch.is_empty() {
            return CheckResult::can_be_extended();
        }

        let age = elapsed(batch.created_at_ms, now_ms);
        if age >= self.sealing_timeout {
            return CheckResult::should_be_sealed(format!(
                "batch is {}ms old, sealing timeout is {}ms",
                age.as_millis(),
                self.sealing_timeout.as_millis()
            ));
        }
        CheckResult::can_be_extended()
    }
}

#[derive(Debug)]
struct SizeConstraint {
    max_blocks_count: usize,
}

impl BatchConstraint for SizeConstraint {
    fn check(&self, batch: &BlockBatch, _now_ms: u64) -> CheckResult {
        let count = batch.blocks_count();
        match count.cmp(&self.max_blocks_count) {
            std::cmp::Ordering::Greater => CheckResult::should_be_discarded(format!(
                "batch holds {count} blocks, limit is {}",
                self.max_blocks_count
            )),
            std::cmp::Ordering::Equal => CheckResult::should_be_sealed(format!(
                "batch reached the limit of {count} blocks"
            )),
            std::cmp::Ordering::Less => CheckResult::can_be_extended(),
        }
    }
}

/// Runs every batch constraint and joins the verdicts.
#[derive(Debug)]
pub struct ConstraintChecker {
    constraints: Vec<Box<dyn BatchConstraint>>,
}

impl ConstraintChecker {
    pub fn new(config: &ConstraintConfig) -> Self {
        Self {
            constraints: vec![
                Box::new(TimeoutConstraint {
                    sealing_timeout: config.sealing_timeout,
                }),
                Box::new(SizeConstraint {
                    max_blocks_count: config.max_blocks_count,
                }),
            ],
        }
    }

    pub fn check_constraints(&self, batch: &BlockBatch, now_ms: u64) -> CheckResult {
        self.constraints
            .iter()
            .map(|c| c.check(batch, now_ms))
            .fold(CheckResult::can_be_extended(), CheckResult::join)
    }
}

impl Default for ConstraintChecker {
    fn default() -> Self {
        Self::new(&ConstraintConfig::default())
    }
}
