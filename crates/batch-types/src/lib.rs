//! Batch model: contiguous per-shard block segments that are proved and proposed together,
//! and the constraints deciding when a batch stops growing.

mod batch;
pub mod constraints;
mod errors;
mod proposal;
mod segments;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use batch::BlockBatch;
pub use constraints::{CheckResult, CheckResultKind, ConstraintChecker, ConstraintConfig};
pub use errors::BatchError;
pub use proposal::ProposalData;
pub use segments::ChainSegments;
