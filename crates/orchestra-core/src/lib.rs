//! orchestra-core: Todoist delta sync and ritual extraction.
//!
//! # Conventions
//!
//! - **Errors**: each module owns a `thiserror` enum exposing `code()` for a
//!   stable [`error::ErrorCode`]. Expected absence is `Option`, never an error.
//! - **Logging**: `tracing` macros with structured fields (`table`, `id`,
//!   `name`, `cursor`). No subscriber is installed here.
//! - **Files**: JSON documents are written atomically through
//!   [`store::write_json_atomic`].

pub mod alarm;
pub mod config;
pub mod error;
pub mod lock;
pub mod ritual;
pub mod schema;
pub mod store;
pub mod sync;
pub mod todoist;

pub use config::Config;
pub use error::ErrorCode;
pub use sync::{SyncContext, SyncError, SyncReport, extract_only, run_sync};
