//! curl backend: status reported as a trailing stdout line.
//!
//! curl is told to append the HTTP status code as a final machine-readable
//! stdout line via `-w`. The parser pulls any pure-integer line out as the
//! status and treats the rest as payload.

use super::types::{
    BackendKind, DownloadBackend, DownloadError, Invocation, ParsedOutput, RequestSpec,
};
use crate::process::ProcessOutput;
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct CurlBackend {
    program: String,
}

impl Default for CurlBackend {
    fn default() -> Self {
        Self {
            program: "curl".into(),
        }
    }
}

impl CurlBackend {
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
impl DownloadBackend for CurlBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Curl
    }

    fn program(&self) -> &str {
        &self.program
    }

    fn prepare(&self, spec: &RequestSpec) -> Result<Invocation, DownloadError> {
        let mut inv = Invocation::new(&self.program);
        let timeout_secs = spec.timeout.as_secs().max(1).to_string();

        // Follow redirects, silent except for errors, status as final stdout line
        inv.args.push("-L".into());
        inv.args.push("-sS".into());
        inv.args.push("-w".into());
        inv.args.push("\n%{http_code}".into());

        if let Some(agent) = &spec.user_agent {
            inv.args.push("-A".into());
            inv.args.push(agent.clone());
        }
        if let Some((user, pass)) = spec.basic_auth() {
            inv.args.push("-u".into());
            inv.args.push(format!("{}:{}", user, pass));
        }
        if let Some(proxy) = &spec.proxy {
            inv.args.push("-x".into());
            inv.args.push(proxy.clone());
        }
        for (name, value) in &spec.headers {
            inv.args.push("-H".into());
            inv.args.push(format!("{}: {}", name, value));
        }
        inv.args.push("--connect-timeout".into());
        inv.args.push(timeout_secs.clone());
        inv.args.push("--max-time".into());
        inv.args.push(timeout_secs);

        if spec.insecure {
            inv.args.push("-k".into());
        }
        if let Some(path) = &spec.output_file {
            inv.args.push("-o".into());
            inv.args.push(path.display().to_string());
        }

        inv.args.push(spec.url.clone());
        Ok(inv)
    }

    fn parse(&self, output: &ProcessOutput) -> ParsedOutput {
        let mut status = None;
        let mut content = String::new();
        for line in &output.stdout {
            if let Ok(code) = line.trim().parse::<u16>() {
                status = Some(code);
            } else {
                content.push_str(line);
                content.push('\n');
            }
        }
        ParsedOutput { status, content }
    }
}
