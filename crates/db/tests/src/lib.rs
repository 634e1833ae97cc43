//! Backend-agnostic test suites for the storage traits.
//!
//! Each backend expands the suites against its own setup expression:
//!
//! ```ignore
//! committee_db_tests::task_db_tests!(setup_db());
//! ```

pub mod batch_tests;
pub mod task_tests;
