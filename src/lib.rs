//! Multiplexer for download tools.
//!
//! Fetches a URL by delegating to one of several external download tools
//! (curl, wget, or a generated PowerShell script), falling back through the
//! chain until one succeeds and normalizing each tool's ad-hoc output into
//! one structured [`DownloadResult`]. No HTTP is spoken in-process; all
//! protocol work happens inside the external tool.
//!
//! # Example
//!
//! ```ignore
//! use fetch_mux::{Orchestrator, RequestSpec, BackendKind};
//!
//! let orchestrator = Orchestrator::new();
//! let result = orchestrator
//!     .download(&RequestSpec::new("https://example.com/file.txt"))
//!     .await;
//!
//! if result.success {
//!     println!("{} via {}", result.status_code, result.used_method);
//! } else {
//!     eprintln!("{}", result.error_message);
//! }
//! ```

pub mod backend;
pub mod config;
pub mod logging;
pub mod orchestrator;
pub mod probe;
pub mod process;
pub mod temp;

pub use backend::{
    BackendKind, CurlBackend, DownloadBackend, DownloadError, DownloadResult, PowerShellBackend,
    RequestSpec, WgetBackend,
};
pub use config::FetchConfig;
pub use orchestrator::Orchestrator;
