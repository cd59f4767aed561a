//! wget backend: status reported through server-response headers on stderr.
//!
//! wget is told to echo the server's response headers (`--server-response`),
//! which land on stderr. The parser scans those for `HTTP/<ver> <code>`
//! lines; the last match wins so redirect chains report the final hop.
//! stdout is payload, verbatim. Proxy configuration goes through environment
//! overrides on the child, never the parent environment.

use super::types::{
    BackendKind, DownloadBackend, DownloadError, Invocation, ParsedOutput, RequestSpec,
};
use crate::process::ProcessOutput;
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

static STATUS_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*HTTP/\S+\s+(\d{3})").expect("valid status-line regex"));

#[derive(Debug, Clone)]
pub struct WgetBackend {
    program: String,
}

impl Default for WgetBackend {
    fn default() -> Self {
        Self {
            program: "wget".into(),
        }
    }
}

impl WgetBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point at a different executable, mainly for tests.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl DownloadBackend for WgetBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Wget
    }

    fn program(&self) -> &str {
        &self.program
    }

    fn prepare(&self, spec: &RequestSpec) -> Result<Invocation, DownloadError> {
        let mut inv = Invocation::new(&self.program);
        let timeout_secs = spec.timeout.as_secs().max(1);

        inv.args.push("--server-response".into());
        inv.args.push("--no-verbose".into());
        inv.args.push("--tries=1".into());
        inv.args.push(format!("--timeout={}", timeout_secs));

        if let Some(agent) = &spec.user_agent {
            inv.args.push(format!("--user-agent={}", agent));
        }
        if let Some((user, pass)) = spec.basic_auth() {
            inv.args.push(format!("--user={}", user));
            inv.args.push(format!("--password={}", pass));
        }
        for (name, value) in &spec.headers {
            inv.args.push(format!("--header={}: {}", name, value));
        }
        if spec.insecure {
            inv.args.push("--no-check-certificate".into());
        }
        if let Some(proxy) = &spec.proxy {
            inv.env.push(("http_proxy".into(), proxy.clone()));
            inv.env.push(("https_proxy".into(), proxy.clone()));
        }

        inv.args.push("-O".into());
        match &spec.output_file {
            Some(path) => inv.args.push(path.display().to_string()),
            None => inv.args.push("-".into()),
        }

        inv.args.push(spec.url.clone());
        Ok(inv)
    }

    fn parse(&self, output: &ProcessOutput) -> ParsedOutput {
        let status = output
            .stderr
            .iter()
            .filter_map(|line| {
                STATUS_LINE
                    .captures(line)
                    .and_then(|c| c.get(1))
                    .and_then(|m| m.as_str().parse::<u16>().ok())
            })
            .last();

        let mut content = String::new();
        for line in &output.stdout {
            content.push_str(line);
            content.push('\n');
        }
        ParsedOutput { status, content }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(stdout: &[&str], stderr: &[&str]) -> ProcessOutput {
        ProcessOutput {
            exit_code: Some(0),
            stdout: stdout.iter().map(|s| s.to_string()).collect(),
            stderr: stderr.iter().map(|s| s.to_string()).collect(),
            timed_out: false,
        }
    }

    #[test]
    fn test_parse_status_from_stderr_header() {
        let backend = WgetBackend::new();
        let parsed = backend.parse(&output(
            &["body line"],
            &["  HTTP/1.1 200 OK", "  Content-Type: text/html"],
        ));
        assert_eq!(parsed.status, Some(200));
        assert_eq!(parsed.content, "body line\n");
    }

    #[test]
    fn test_parse_redirect_chain_takes_final_status() {
        let backend = WgetBackend::new();
        let parsed = backend.parse(&output(
            &[],
            &[
                "  HTTP/1.1 301 Moved Permanently",
                "  Location: https://example.com/new",
                "  HTTP/1.1 404 Not Found",
            ],
        ));
        assert_eq!(parsed.status, Some(404));
    }

    #[test]
    fn test_parse_ignores_non_header_stderr() {
        let backend = WgetBackend::new();
        let parsed = backend.parse(&output(
            &["payload"],
            &["2024-01-01 wrote 5 bytes", "some diagnostic"],
        ));
        assert_eq!(parsed.status, None);
        assert_eq!(parsed.content, "payload\n");
    }

    #[test]
    fn test_prepare_proxy_goes_through_env_overrides() {
        let spec = RequestSpec::new("https://example.com").with_proxy("http://proxy:3128");
        let inv = WgetBackend::new().prepare(&spec).unwrap();
        assert!(inv.env.contains(&("http_proxy".into(), "http://proxy:3128".into())));
        assert!(inv.env.contains(&("https_proxy".into(), "http://proxy:3128".into())));
        assert!(!inv.args.iter().any(|a| a.contains("proxy")));
    }

    #[test]
    fn test_prepare_stdout_capture_by_default() {
        let spec = RequestSpec::new("https://example.com");
        let inv = WgetBackend::new().prepare(&spec).unwrap();
        let o_pos = inv.args.iter().position(|a| a == "-O").unwrap();
        assert_eq!(inv.args[o_pos + 1], "-");
        assert!(inv.args.contains(&"--server-response".into()));
    }

    #[test]
    fn test_prepare_headers_preserve_order() {
        let spec = RequestSpec::new("https://example.com")
            .with_header("X-First", "1")
            .with_header("X-Second", "2");
        let inv = WgetBackend::new().prepare(&spec).unwrap();
        let first = inv.args.iter().position(|a| a == "--header=X-First: 1").unwrap();
        let second = inv.args.iter().position(|a| a == "--header=X-Second: 2").unwrap();
        assert!(first < second);
    }
}
