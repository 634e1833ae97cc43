//! Types for the JSON-RPC API of the sync committee.

pub mod errors;
pub mod types;

pub use errors::*;
pub use types::*;
