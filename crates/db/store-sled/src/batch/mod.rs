pub mod db;
pub(crate) mod schemas;

pub use db::{BatchDBSled, DEFAULT_BATCH_CAPACITY};
