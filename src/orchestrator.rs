//! Fallback orchestration: try backends in order until one delivers.

use crate::backend::types::{
    BackendKind, DownloadBackend, DownloadError, DownloadResult, RequestSpec,
};
use crate::backend::create_backend;
use crate::temp::ScratchFile;
use std::time::Instant;
use tracing::{debug, warn};

/// Drives the ordered backend chain for top-level download calls.
///
/// Backends are tried strictly sequentially; the first success wins and no
/// later backend is tried. Every per-backend failure is recovered locally
/// and recorded, never raised. Each call owns its buffers, scratch paths,
/// and result, so concurrent callers need no external locking.
pub struct Orchestrator {
    backends: Vec<Box<dyn DownloadBackend>>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    /// Orchestrator over the standard chain in fixed preference order.
    pub fn new() -> Self {
        let backends = BackendKind::FALLBACK_ORDER
            .iter()
            .filter_map(|kind| create_backend(*kind))
            .collect();
        Self { backends }
    }

    /// Orchestrator over a caller-supplied backend set. The set's order is
    /// taken as the preference order.
    pub fn with_backends(backends: Vec<Box<dyn DownloadBackend>>) -> Self {
        Self { backends }
    }

    /// The kinds that would be attempted for this request, in order.
    ///
    /// `Auto` selects the whole chain. A concrete method goes first; with
    /// fallback enabled the remaining backends follow in preference order,
    /// without fallback the plan is that single method.
    pub fn plan(&self, spec: &RequestSpec) -> Vec<BackendKind> {
        if spec.method == BackendKind::Auto {
            return self.backends.iter().map(|b| b.kind()).collect();
        }
        let mut plan: Vec<BackendKind> = self
            .backends
            .iter()
            .map(|b| b.kind())
            .filter(|k| *k == spec.method)
            .collect();
        if spec.fallback {
            plan.extend(
                self.backends
                    .iter()
                    .map(|b| b.kind())
                    .filter(|k| *k != spec.method),
            );
        }
        plan
    }

    fn backend_for(&self, kind: BackendKind) -> Option<&dyn DownloadBackend> {
        self.backends
            .iter()
            .find(|b| b.kind() == kind)
            .map(|b| b.as_ref())
    }

    /// Top-level entry: fetch `spec.url` through the fallback chain.
    ///
    /// Never returns an error; every failure mode lands in the result. On
    /// total failure the message aggregates each attempted backend's error,
    /// `used_method` reports the originally requested method, and the
    /// status code is 0.
    pub async fn download(&self, spec: &RequestSpec) -> DownloadResult {
        let started = Instant::now();
        let mut errors: Vec<(BackendKind, String)> = Vec::new();

        for kind in self.plan(spec) {
            let Some(backend) = self.backend_for(kind) else {
                continue;
            };

            if !backend.probe().await {
                debug!(backend = %kind, "backend unavailable, skipping");
                continue;
            }

            debug!(backend = %kind, url = %spec.url, "attempting download");
            match backend.execute(spec).await {
                Ok(fetched) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    debug!(
                        backend = %kind,
                        status = fetched.status,
                        duration_ms,
                        "download succeeded"
                    );
                    return DownloadResult {
                        success: true,
                        content: if spec.saving_to_file() {
                            None
                        } else {
                            Some(fetched.content)
                        },
                        data: None,
                        file_path: spec.output_file.clone(),
                        error_message: String::new(),
                        used_method: kind,
                        status_code: fetched.status,
                        duration_ms,
                        errors_by_method: errors,
                    };
                }
                Err(e) => {
                    warn!(backend = %kind, error = %e, "download attempt failed");
                    errors.push((kind, e.to_string()));
                }
            }
        }

        let composite = DownloadError::AllFailed {
            url: spec.url.clone(),
            errors: errors.clone(),
        };
        DownloadResult::failure(
            composite.to_string(),
            spec.method,
            started.elapsed().as_millis() as u64,
            errors,
        )
    }

    /// Fetch into memory as text with default options.
    pub async fn fetch_text(&self, url: &str) -> DownloadResult {
        self.download(&RequestSpec::new(url)).await
    }

    /// Fetch to a caller-supplied file.
    pub async fn fetch_to_file(
        &self,
        url: &str,
        path: impl Into<std::path::PathBuf>,
    ) -> DownloadResult {
        self.download(&RequestSpec::new(url).with_output_file(path))
            .await
    }

    /// Fetch into memory as raw bytes.
    ///
    /// Routes through a scratch file because a backend may not be able to
    /// pipe binary data to stdout without corrupting it; the scratch file is
    /// deleted before returning on success and failure alike.
    pub async fn fetch_bytes(&self, spec: RequestSpec) -> DownloadResult {
        let scratch = match ScratchFile::new(".download") {
            Ok(scratch) => scratch,
            Err(e) => {
                return DownloadResult::failure(
                    format!("failed to create scratch file: {}", e),
                    spec.method,
                    0,
                    Vec::new(),
                );
            }
        };

        let spec = spec.with_output_file(scratch.path_buf());
        let mut result = self.download(&spec).await;
        if result.success {
            match scratch.read_bytes() {
                Ok(bytes) => {
                    result.file_path = None;
                    result.data = Some(bytes);
                }
                Err(e) => {
                    result = DownloadResult::failure(
                        format!("failed to read downloaded data: {}", e),
                        result.used_method,
                        result.duration_ms,
                        result.errors_by_method,
                    );
                }
            }
        } else {
            result.file_path = None;
        }
        result
    }

    /// Probe every backend in the chain, in preference order.
    pub async fn availability(&self) -> Vec<(BackendKind, bool)> {
        let mut report = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            report.push((backend.kind(), backend.probe().await));
        }
        report
    }

    /// First available backend in preference order, if any.
    pub async fn best_available(&self) -> Option<BackendKind> {
        for backend in &self.backends {
            if backend.probe().await {
                return Some(backend.kind());
            }
        }
        None
    }
}
