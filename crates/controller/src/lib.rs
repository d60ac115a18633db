//! Fleet controller service
//!
//! Command line handling and the HTTP surface of the `auto-cluster`
//! binary. The reconciliation engine itself lives in `controller-lib`.

pub mod api;
pub mod config;
