//! Backend availability probing.

use crate::process;
use std::time::Duration;

/// Fixed budget for a version check; a tool that cannot print its version
/// in this window is treated as absent.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Check whether an executable is present and runnable by invoking its
/// version flag. Absence is a normal condition, never an error: any launch
/// failure, non-zero exit, or timeout yields false.
pub async fn is_available(program: &str) -> bool {
    let args = vec!["--version".to_string()];
    match process::run(program, &args, &[], PROBE_TIMEOUT).await {
        Ok(output) => !output.timed_out && output.exit_code == Some(0),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        assert!(!is_available("definitely_not_a_real_command_12345").await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_present_binary_is_available() {
        // GNU and BSD `true` both ignore arguments and exit 0
        assert!(is_available("true").await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_version_exit_is_unavailable() {
        assert!(!is_available("false").await);
    }
}
