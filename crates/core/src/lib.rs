//! Batch pipeline of the sync committee.
//!
//! The [`Aggregator`] pulls blocks from the shards into batches and plans their proof tasks,
//! the [`Proposer`] hands proved batches to the L1 contract, and [`BatchStateHandler`] turns
//! task outcomes into batch state changes.

mod aggregator;
mod encoder;
mod handler;
mod l1;
mod proposer;
mod resetter;
mod source;
mod utils;

#[cfg(test)]
mod test_utils;

pub use aggregator::{Aggregator, AggregatorConfig};
pub use encoder::{BatchEncoder, Sha256BatchEncoder};
pub use handler::BatchStateHandler;
pub use l1::{L1Contract, LocalL1Contract, TxHash, UpdateStateParams};
pub use proposer::{Proposer, ProposerConfig};
pub use resetter::BatchResetter;
pub use source::BlockSource;
