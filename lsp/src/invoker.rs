//! Analyzer process invocation.
//!
//! One pass is one short-lived child process:
//!
//! ```text
//! <analyzer> <file> --lsp-mode [--emit-ir]
//! ```
//!
//! The invoker knows nothing about documents or diagnostics; it returns raw
//! stdout/stderr and the exit status.

use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::AnalysisError;
use crate::types::{AnalyzerOutput, LSP_MODE_FLAG, PassKind, RelaySettings};

/// Something that can analyze a file on disk.
pub trait Analyzer: Send + Sync + 'static {
    fn analyze(
        &self,
        file: &Path,
        kind: PassKind,
    ) -> impl Future<Output = Result<AnalyzerOutput, AnalysisError>> + Send;
}

/// Runs the external analyzer binary as a subprocess.
#[derive(Debug, Clone)]
pub struct ProcessAnalyzer {
    binary: Option<String>,
    deep_flag: String,
    timeout: Duration,
}

impl ProcessAnalyzer {
    #[must_use]
    pub fn new(settings: &RelaySettings) -> Self {
        Self {
            binary: settings.analyzer_binary.clone(),
            deep_flag: settings.deep_flag.clone(),
            timeout: settings.analyzer_timeout,
        }
    }

    /// Resolve the configured binary to an executable path.
    ///
    /// Accepts both explicit paths and bare names looked up on `PATH`.
    pub fn resolve_binary(&self) -> Result<PathBuf, AnalysisError> {
        let Some(binary) = self.binary.as_deref().filter(|b| !b.trim().is_empty()) else {
            return Err(AnalysisError::AnalyzerNotFound {
                binary: String::new(),
                reason: "no analyzer path configured (set helix_path)".to_string(),
            });
        };
        which::which(binary).map_err(|e| AnalysisError::AnalyzerNotFound {
            binary: binary.to_string(),
            reason: e.to_string(),
        })
    }

    /// Arguments after the program name.
    #[must_use]
    pub fn arguments(&self, file: &Path, kind: PassKind) -> Vec<OsString> {
        let mut args = vec![file.as_os_str().to_owned(), OsString::from(LSP_MODE_FLAG)];
        if kind == PassKind::Deep {
            args.push(OsString::from(&self.deep_flag));
        }
        args
    }
}

impl Analyzer for ProcessAnalyzer {
    async fn analyze(&self, file: &Path, kind: PassKind) -> Result<AnalyzerOutput, AnalysisError> {
        let binary = self.resolve_binary()?;

        let mut cmd = Command::new(&binary);
        cmd.args(self.arguments(file, kind))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = file.parent().filter(|d| d.is_dir()) {
            cmd.current_dir(dir);
        }

        tracing::debug!(
            binary = %binary.display(),
            file = %file.display(),
            pass = kind.label(),
            "Running analyzer"
        );

        let child = cmd.spawn().map_err(|source| AnalysisError::Spawn {
            binary: binary.clone(),
            source,
        })?;

        // Dropping the child on timeout kills it (kill_on_drop).
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| AnalysisError::Spawn {
                binary: binary.clone(),
                source,
            })?,
            Err(_) => {
                return Err(AnalysisError::Timeout {
                    after: self.timeout,
                });
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !stderr.trim().is_empty() {
            tracing::warn!(
                file = %file.display(),
                pass = kind.label(),
                "Analyzer stderr: {}",
                stderr.trim_end()
            );
        }

        Ok(AnalyzerOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
            exit_code: output.status.code(),
        })
    }
}
