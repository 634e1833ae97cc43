//! # typed-sled
//!
//! A type-safe wrapper around the sled embedded database.
//!
//! Trees are declared through a [`Schema`] that fixes their key and value types; the codecs
//! attached to those types decide the on-disk encoding. On top of sled's multi-tree
//! transactions, [`transaction::SledTransactional::transaction_with_retry`] provides a bounded,
//! backoff-driven retry loop for optimistic writers.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use borsh::{BorshDeserialize, BorshSerialize};
//! use typed_sled::{CodecError, KeyCodec, Schema, SledDb, TreeName, ValueCodec, error::Result};
//!
//! #[derive(BorshSerialize, BorshDeserialize, Debug)]
//! struct Executor {
//!     id: u32,
//!     host: String,
//! }
//!
//! #[derive(Debug)]
//! struct ExecutorSchema;
//!
//! impl Schema for ExecutorSchema {
//!     const TREE_NAME: TreeName = TreeName("executors");
//!     type Key = u32;
//!     type Value = Executor;
//! }
//!
//! impl KeyCodec<ExecutorSchema> for u32 {
//!     fn encode_key(&self) -> typed_sled::CodecResult<Vec<u8>> {
//!         Ok(self.to_be_bytes().to_vec())
//!     }
//!     fn decode_key(buf: &[u8]) -> typed_sled::CodecResult<Self> {
//!         let bytes: [u8; 4] = buf.try_into().map_err(|_| CodecError::InvalidKeyLength {
//!             schema: ExecutorSchema::TREE_NAME.0,
//!             expected: 4,
//!             actual: buf.len(),
//!         })?;
//!         Ok(u32::from_be_bytes(bytes))
//!     }
//! }
//!
//! impl ValueCodec<ExecutorSchema> for Executor {
//!     fn encode_value(&self) -> typed_sled::CodecResult<Vec<u8>> {
//!         borsh::to_vec(self).map_err(|e| CodecError::SerializationFailed {
//!             schema: ExecutorSchema::TREE_NAME.0,
//!             source: e.into(),
//!         })
//!     }
//!     fn decode_value(buf: &[u8]) -> typed_sled::CodecResult<Self> {
//!         borsh::from_slice(buf).map_err(|e| CodecError::DeserializationFailed {
//!             schema: ExecutorSchema::TREE_NAME.0,
//!             source: e.into(),
//!         })
//!     }
//! }
//!
//! fn main() -> Result<()> {
//!     let sled_db = Arc::new(sled::open("mydb").unwrap());
//!     let db = SledDb::new(sled_db)?;
//!     let tree = db.get_tree::<ExecutorSchema>()?;
//!
//!     tree.insert(&1, &Executor { id: 1, host: "prover-1".to_string() })?;
//!     println!("{:?}", tree.get(&1)?);
//!
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod db;
pub mod error;
pub mod schema;
pub mod transaction;
pub mod tree;

#[cfg(test)]
mod test_utils;

// Re-export main types
pub use codec::{CodecError, CodecResult, KeyCodec, ValueCodec};
pub use db::SledDb;
pub use schema::{Schema, TreeName};
pub use tree::{SledTransactionalTree, SledTree};
