//! Download backend variants and their shared contract.
//!
//! Each backend wraps one external tool and knows three things: how to ask
//! whether the tool exists, how to turn a [`RequestSpec`] into a command
//! line, and how to dig the HTTP status and payload out of the tool's
//! free-form output. The orchestrator drives them purely through the
//! [`DownloadBackend`] trait.

mod curl;
mod powershell;
pub mod types;
mod wget;

pub use curl::CurlBackend;
pub use powershell::PowerShellBackend;
pub use types::{
    BackendKind, DownloadBackend, DownloadError, DownloadResult, Fetched, Invocation,
    ParsedOutput, RequestSpec,
};
pub use wget::WgetBackend;

/// Create the backend for a concrete kind. `Auto` is request-only and has
/// no backend of its own.
pub fn create_backend(kind: BackendKind) -> Option<Box<dyn DownloadBackend>> {
    match kind {
        BackendKind::Auto => None,
        BackendKind::Curl => Some(Box::new(CurlBackend::new())),
        BackendKind::Wget => Some(Box::new(WgetBackend::new())),
        BackendKind::PowerShell => Some(Box::new(PowerShellBackend::new())),
    }
}
