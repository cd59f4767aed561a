//! Core types and traits for download backends

use crate::process::ProcessOutput;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// The closed set of download methods.
///
/// `Auto` is request-only: it selects the full fallback chain and never
/// appears as the method of an actual attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Auto,
    Curl,
    Wget,
    PowerShell,
}

impl BackendKind {
    /// Fixed preference order used for `Auto` and for fallback sequencing.
    pub const FALLBACK_ORDER: [BackendKind; 3] =
        [BackendKind::Curl, BackendKind::Wget, BackendKind::PowerShell];
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Auto => "auto",
            BackendKind::Curl => "curl",
            BackendKind::Wget => "wget",
            BackendKind::PowerShell => "powershell",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(BackendKind::Auto),
            "curl" => Ok(BackendKind::Curl),
            "wget" => Ok(BackendKind::Wget),
            "powershell" | "ps" => Ok(BackendKind::PowerShell),
            other => Err(format!(
                "unknown method '{}' (expected auto, curl, wget, or powershell)",
                other
            )),
        }
    }
}

/// Errors that can occur during a single backend attempt.
///
/// All of these are recovered locally by the orchestrator and recorded into
/// the result's error map; only `AllFailed` surfaces to the caller, and even
/// that only as the message of a failure result, never as a raised error.
#[derive(Debug, Clone, Error)]
pub enum DownloadError {
    /// Backend executable missing or unrunnable
    #[error("failed to launch '{program}': {message}")]
    Launch { program: String, message: String },

    /// Wall-clock budget exceeded, process killed
    #[error("timed out after {elapsed:?}, process killed")]
    Timeout { elapsed: Duration },

    /// Tool ran but reported failure
    #[error("exited with code {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    /// Tool succeeded but the remote status was outside 2xx
    #[error("server returned HTTP status {status}")]
    HttpStatus { status: u16 },

    /// Tool claimed success but produced no artifact
    #[error("output file is empty or missing: {path}")]
    EmptyArtifact { path: PathBuf },

    /// Every backend in the chain failed
    #[error("{}", format_all_failed(.url, .errors))]
    AllFailed {
        url: String,
        errors: Vec<(BackendKind, String)>,
    },
}

fn format_all_failed(url: &str, errors: &[(BackendKind, String)]) -> String {
    let mut message = format!("all download methods failed for URL: {}", url);
    for (kind, error) in errors {
        message.push_str(&format!("\n  {}: {}", kind, error));
    }
    message
}

impl DownloadError {
    pub fn launch(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Launch {
            program: program.into(),
            message: message.into(),
        }
    }

    pub fn timeout(elapsed: Duration) -> Self {
        Self::Timeout { elapsed }
    }

    pub fn non_zero_exit(code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::NonZeroExit {
            code,
            stderr: stderr.into(),
        }
    }
}

/// Request parameters for one top-level download call.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    /// URL to fetch
    pub url: String,

    /// Requested method (`Auto` tries the whole chain)
    pub method: BackendKind,

    /// Whether to fall back to other backends when the primary fails
    pub fallback: bool,

    /// User-Agent header value
    pub user_agent: Option<String>,

    /// Basic-auth username (only applied together with `password`)
    pub username: Option<String>,

    /// Basic-auth password
    pub password: Option<String>,

    /// Extra request headers, in caller order
    pub headers: Vec<(String, String)>,

    /// Wall-clock budget per backend attempt
    pub timeout: Duration,

    /// Proxy URL, passed to the tool via flag or environment override
    pub proxy: Option<String>,

    /// Write the payload here instead of capturing it in memory
    pub output_file: Option<PathBuf>,

    /// Skip TLS certificate verification
    pub insecure: bool,
}

impl RequestSpec {
    /// Create a spec with defaults: auto method, fallback on, 30s timeout.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: BackendKind::Auto,
            fallback: true,
            user_agent: None,
            username: None,
            password: None,
            headers: Vec::new(),
            timeout: Duration::from_secs(30),
            proxy: None,
            output_file: None,
            insecure: false,
        }
    }

    pub fn with_method(mut self, method: BackendKind) -> Self {
        self.method = method;
        self
    }

    pub fn with_fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Add a header, replacing any existing header with the same name
    /// (case-insensitive). Duplicate header keys are not allowed.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = Some(path.into());
        self
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Basic-auth pair, present only when both halves are set.
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        }
    }

    /// True when the payload goes to a caller-supplied file.
    pub fn saving_to_file(&self) -> bool {
        self.output_file.is_some()
    }
}

/// What a successful backend attempt produced.
#[derive(Debug, Clone)]
pub struct Fetched {
    /// HTTP status reported by the tool (defaulted to 200 on silence)
    pub status: u16,

    /// Captured payload text; empty in file-output mode
    pub content: String,
}

/// Status and payload extracted from raw process output, before the shared
/// success checks are applied.
#[derive(Debug, Clone, Default)]
pub struct ParsedOutput {
    /// Status code, if the tool's convention yielded one
    pub status: Option<u16>,

    /// Payload text assembled from stdout
    pub content: String,
}

/// Final result of a top-level download call.
///
/// On success exactly one of `content` / `data` / `file_path` is populated,
/// matching the requested output mode. On failure none of them are, and
/// `error_message` carries the composite failure text.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    pub success: bool,
    pub content: Option<String>,
    pub data: Option<Vec<u8>>,
    pub file_path: Option<PathBuf>,
    pub error_message: String,
    pub used_method: BackendKind,
    /// 0 when no status was ever determined
    pub status_code: u16,
    pub duration_ms: u64,
    /// One entry per attempted-and-failed backend, in attempt order.
    /// Backends skipped as unavailable are omitted.
    pub errors_by_method: Vec<(BackendKind, String)>,
}

impl DownloadResult {
    pub fn failure(
        message: String,
        used_method: BackendKind,
        duration_ms: u64,
        errors_by_method: Vec<(BackendKind, String)>,
    ) -> Self {
        Self {
            success: false,
            content: None,
            data: None,
            file_path: None,
            error_message: message,
            used_method,
            status_code: 0,
            duration_ms,
            errors_by_method,
        }
    }

    pub fn error_for(&self, kind: BackendKind) -> Option<&str> {
        self.errors_by_method
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, e)| e.as_str())
    }
}

/// A command line ready to hand to the process runner.
///
/// Holds any scratch file (Variant C's generated script) alive for the
/// duration of the attempt; dropping the invocation deletes it.
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Environment overrides for the child only; the parent environment is
    /// never mutated.
    pub env: Vec<(String, String)>,
    pub scratch: Option<crate::temp::ScratchFile>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            scratch: None,
        }
    }
}

/// Trait implemented by each download backend variant.
///
/// The orchestrator holds these as trait objects and drives probe, argument
/// construction, and output parsing through this interface.
#[async_trait]
pub trait DownloadBackend: Send + Sync {
    /// Which member of the closed backend set this is
    fn kind(&self) -> BackendKind;

    /// Executable name or path
    fn program(&self) -> &str;

    /// Availability check. Backends that cannot be meaningfully probed
    /// override this to return true unconditionally.
    async fn probe(&self) -> bool {
        crate::probe::is_available(self.program()).await
    }

    /// Build the command line for this request.
    fn prepare(&self, spec: &RequestSpec) -> Result<Invocation, DownloadError>;

    /// Extract status and payload from raw process output, per this
    /// backend's status-reporting convention.
    fn parse(&self, output: &ProcessOutput) -> ParsedOutput;

    /// Run one complete attempt: prepare, spawn, parse, and apply the
    /// shared success checks.
    async fn execute(&self, spec: &RequestSpec) -> Result<Fetched, DownloadError> {
        let invocation = self.prepare(spec)?;
        let output = crate::process::run(
            &invocation.program,
            &invocation.args,
            &invocation.env,
            spec.timeout,
        )
        .await?;
        let parsed = self.parse(&output);
        let fetched = finalize(&output, parsed, spec)?;
        drop(invocation);
        Ok(fetched)
    }
}

#[async_trait]
impl DownloadBackend for Box<dyn DownloadBackend> {
    fn kind(&self) -> BackendKind {
        (**self).kind()
    }

    fn program(&self) -> &str {
        (**self).program()
    }

    async fn probe(&self) -> bool {
        (**self).probe().await
    }

    fn prepare(&self, spec: &RequestSpec) -> Result<Invocation, DownloadError> {
        (**self).prepare(spec)
    }

    fn parse(&self, output: &ProcessOutput) -> ParsedOutput {
        (**self).parse(output)
    }

    async fn execute(&self, spec: &RequestSpec) -> Result<Fetched, DownloadError> {
        (**self).execute(spec).await
    }
}

/// Shared post-processing applied to every backend's parsed output.
///
/// A non-zero exit always fails. Exit 0 with no parseable status defaults to
/// 200, since the tool itself signaled success; this mirrors the tools'
/// inconsistent status reporting and is kept for compatibility. A status
/// outside 2xx fails. In file-output mode the target must exist with
/// non-zero length, since these tools sometimes exit 0 without materializing
/// output.
pub fn finalize(
    output: &ProcessOutput,
    parsed: ParsedOutput,
    spec: &RequestSpec,
) -> Result<Fetched, DownloadError> {
    if output.timed_out {
        return Err(DownloadError::timeout(spec.timeout));
    }

    if output.exit_code != Some(0) {
        return Err(DownloadError::non_zero_exit(
            output.exit_code,
            output.stderr.join("\n"),
        ));
    }

    let status = parsed.status.unwrap_or(200);
    if !(200..300).contains(&status) {
        return Err(DownloadError::HttpStatus { status });
    }

    if let Some(path) = &spec.output_file {
        let non_empty = std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
        if !non_empty {
            return Err(DownloadError::EmptyArtifact { path: path.clone() });
        }
    }

    Ok(Fetched {
        status,
        content: parsed.content,
    })
}
