pub mod alarms;
pub mod completions;
pub mod config;
pub mod extract;
pub mod sync;

use orchestra_core::ErrorCode;
use orchestra_core::config::ConfigError;
use orchestra_core::store::StoreError;
use orchestra_core::sync::SyncError;

/// Core errors that map onto a stable [`ErrorCode`].
pub trait Coded: std::error::Error + Send + Sync + 'static {
    fn error_code(&self) -> ErrorCode;
}

impl Coded for SyncError {
    fn error_code(&self) -> ErrorCode {
        self.code()
    }
}

impl Coded for ConfigError {
    fn error_code(&self) -> ErrorCode {
        self.code()
    }
}

impl Coded for StoreError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::FileWriteFailed
    }
}

/// Wrap a core error so the report leads with its code and operator hint.
pub fn coded<E: Coded>(err: E) -> anyhow::Error {
    let code = err.error_code();
    let mut label = format!("{code}: {}", code.message());
    if let Some(hint) = code.hint() {
        label.push_str(" (");
        label.push_str(hint);
        label.push(')');
    }
    anyhow::Error::new(err).context(label)
}
