//! PowerShell backend: status smuggled through a synthesized marker line.
//!
//! Invoke-WebRequest has no status-reporting convention usable from outside,
//! so each attempt generates a throwaway script that performs the request
//! and writes a `STATUS_CODE:<n>` marker line to stdout ahead of the
//! payload. The script enables TLS 1.2 explicitly and, when certificate
//! verification is disabled, installs a validation callback bypass. The
//! script file is a scratch file and is deleted after the attempt regardless
//! of outcome.
//!
//! PowerShell is assumed present and is never probed.

use super::types::{
    BackendKind, DownloadBackend, DownloadError, Invocation, ParsedOutput, RequestSpec,
};
use crate::process::ProcessOutput;
use crate::temp::ScratchFile;
use async_trait::async_trait;

const STATUS_MARKER: &str = "STATUS_CODE:";

#[derive(Debug, Clone)]
pub struct PowerShellBackend {
    program: String,
}

impl Default for PowerShellBackend {
    fn default() -> Self {
        Self {
            program: "powershell".into(),
        }
    }
}

impl PowerShellBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point at a different executable, mainly for tests.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn build_script(&self, spec: &RequestSpec) -> String {
        let mut script = String::new();
        script.push_str("$ErrorActionPreference = 'Stop'\n");
        script.push_str(
            "[Net.ServicePointManager]::SecurityProtocol = \
             [Net.ServicePointManager]::SecurityProtocol -bor [Net.SecurityProtocolType]::Tls12\n",
        );
        if spec.insecure {
            script.push_str(
                "[Net.ServicePointManager]::ServerCertificateValidationCallback = { $true }\n",
            );
        }

        script.push_str("$params = @{\n");
        script.push_str(&format!("    Uri = '{}'\n", quote(&spec.url)));
        script.push_str("    UseBasicParsing = $true\n");
        script.push_str("    MaximumRedirection = 10\n");
        script.push_str(&format!(
            "    TimeoutSec = {}\n",
            spec.timeout.as_secs().max(1)
        ));
        if let Some(agent) = &spec.user_agent {
            script.push_str(&format!("    UserAgent = '{}'\n", quote(agent)));
        }
        if let Some(proxy) = &spec.proxy {
            script.push_str(&format!("    Proxy = '{}'\n", quote(proxy)));
        }
        if let Some(path) = &spec.output_file {
            script.push_str(&format!(
                "    OutFile = '{}'\n",
                quote(&path.display().to_string())
            ));
            script.push_str("    PassThru = $true\n");
        }
        script.push_str("}\n");

        if !spec.headers.is_empty() {
            script.push_str("$headers = @{}\n");
            for (name, value) in &spec.headers {
                script.push_str(&format!(
                    "$headers['{}'] = '{}'\n",
                    quote(name),
                    quote(value)
                ));
            }
            script.push_str("$params['Headers'] = $headers\n");
        }

        if let Some((user, pass)) = spec.basic_auth() {
            script.push_str(&format!(
                "$secure = ConvertTo-SecureString '{}' -AsPlainText -Force\n",
                quote(pass)
            ));
            script.push_str(&format!(
                "$params['Credential'] = New-Object \
                 System.Management.Automation.PSCredential('{}', $secure)\n",
                quote(user)
            ));
        }

        script.push_str("$response = Invoke-WebRequest @params\n");
        script.push_str(&format!(
            "Write-Output ('{}' + $response.StatusCode)\n",
            STATUS_MARKER
        ));
        if spec.output_file.is_none() {
            script.push_str("Write-Output $response.Content\n");
        }
        script
    }
}

/// Escape for a single-quoted PowerShell string literal.
fn quote(value: &str) -> String {
    value.replace('\'', "''")
}

#[async_trait]
impl DownloadBackend for PowerShellBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::PowerShell
    }

    fn program(&self) -> &str {
        &self.program
    }

    async fn probe(&self) -> bool {
        true
    }

    fn prepare(&self, spec: &RequestSpec) -> Result<Invocation, DownloadError> {
        let script = self.build_script(spec);
        let scratch = ScratchFile::with_contents(".ps1", &script)
            .map_err(|e| DownloadError::launch(&self.program, format!("script file: {}", e)))?;

        let mut inv = Invocation::new(&self.program);
        inv.args.push("-NoProfile".into());
        inv.args.push("-NonInteractive".into());
        inv.args.push("-ExecutionPolicy".into());
        inv.args.push("Bypass".into());
        inv.args.push("-File".into());
        inv.args.push(scratch.path().display().to_string());
        inv.scratch = Some(scratch);
        Ok(inv)
    }

    fn parse(&self, output: &ProcessOutput) -> ParsedOutput {
        let mut status = None;
        let mut content = String::new();
        for line in &output.stdout {
            if status.is_none() {
                if let Some(rest) = line.strip_prefix(STATUS_MARKER) {
                    if let Ok(code) = rest.trim().parse::<u16>() {
                        status = Some(code);
                        continue;
                    }
                }
            }
            content.push_str(line);
            content.push('\n');
        }
        ParsedOutput { status, content }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output_with_stdout(lines: &[&str]) -> ProcessOutput {
        ProcessOutput {
            exit_code: Some(0),
            stdout: lines.iter().map(|s| s.to_string()).collect(),
            stderr: vec![],
            timed_out: false,
        }
    }

    #[test]
    fn test_parse_strips_first_marker_line() {
        let backend = PowerShellBackend::new();
        let parsed = backend.parse(&output_with_stdout(&["STATUS_CODE:200", "payload"]));
        assert_eq!(parsed.status, Some(200));
        assert_eq!(parsed.content, "payload\n");
    }

    #[test]
    fn test_parse_later_marker_lines_are_payload() {
        let backend = PowerShellBackend::new();
        let parsed = backend.parse(&output_with_stdout(&[
            "STATUS_CODE:200",
            "STATUS_CODE:999",
            "tail",
        ]));
        assert_eq!(parsed.status, Some(200));
        assert_eq!(parsed.content, "STATUS_CODE:999\ntail\n");
    }

    #[test]
    fn test_parse_without_marker() {
        let backend = PowerShellBackend::new();
        let parsed = backend.parse(&output_with_stdout(&["just output"]));
        assert_eq!(parsed.status, None);
        assert_eq!(parsed.content, "just output\n");
    }

    #[tokio::test]
    async fn test_never_probed() {
        // Probe must report available even when the executable is absent
        let backend = PowerShellBackend::with_program("definitely_not_powershell_12345");
        assert!(backend.probe().await);
    }

    #[test]
    fn test_script_contains_request_options() {
        let spec = RequestSpec::new("https://example.com/o'brien")
            .with_user_agent("fetch-mux/0.1")
            .with_header("Accept", "text/plain")
            .with_basic_auth("user", "pa'ss")
            .with_insecure(true);

        let script = PowerShellBackend::new().build_script(&spec);
        assert!(script.contains("Uri = 'https://example.com/o''brien'"));
        assert!(script.contains("UserAgent = 'fetch-mux/0.1'"));
        assert!(script.contains("$headers['Accept'] = 'text/plain'"));
        assert!(script.contains("ConvertTo-SecureString 'pa''ss'"));
        assert!(script.contains("ServerCertificateValidationCallback"));
        assert!(script.contains("SecurityProtocolType]::Tls12"));
        assert!(script.contains("Write-Output ('STATUS_CODE:' + $response.StatusCode)"));
    }

    #[test]
    fn test_script_file_mode_uses_outfile_passthru() {
        let spec = RequestSpec::new("https://example.com").with_output_file("/tmp/out.bin");
        let script = PowerShellBackend::new().build_script(&spec);
        assert!(script.contains("OutFile = '/tmp/out.bin'"));
        assert!(script.contains("PassThru = $true"));
        assert!(!script.contains("Write-Output $response.Content"));
    }

    #[test]
    fn test_prepare_script_deleted_with_invocation() {
        let spec = RequestSpec::new("https://example.com");
        let path = {
            let inv = PowerShellBackend::new().prepare(&spec).unwrap();
            let path = inv.scratch.as_ref().unwrap().path_buf();
            assert!(path.exists());
            assert!(inv.args.iter().any(|a| a == &path.display().to_string()));
            path
        };
        assert!(!path.exists());
    }
}
