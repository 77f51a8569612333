//! Child-process code sandbox
//!
//! Source is written to a scratch file and run by its interpreter under
//! `sh`, which applies `ulimit` address-space and CPU limits before `exec`.
//! The wall-clock limit is enforced here; the child is killed when it
//! elapses.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use switchyard_engine::{CodeExecutionResult, CodeSandbox, EngineError, Result, SandboxLimits};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::languages::Language;

/// Applies the limits passed as `$1`/`$2`, then replaces itself with the
/// interpreter command line that follows
const LIMIT_WRAPPER: &str = r#"ulimit -v "$1" 2>/dev/null; ulimit -t "$2" 2>/dev/null; shift 2; exec "$@""#;

/// Interpreter messages that indicate the address-space limit was hit
const MEMORY_MARKERS: &[&str] = &[
    "MemoryError",
    "Cannot allocate memory",
    "out of memory",
    "failed to allocate",
    "Allowed memory size",
];

pub struct ProcessSandbox {
    work_dir: PathBuf,
}

impl ProcessSandbox {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    /// Sandbox writing scratch files to the system temp directory
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir().join("switchyard-sandbox"))
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    async fn write_source(&self, source: &str, language: &Language) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let path = self
            .work_dir
            .join(format!("{}.{}", uuid::Uuid::new_v4(), language.extension));
        tokio::fs::write(&path, source).await?;
        Ok(path)
    }

    async fn run(
        &self,
        path: &Path,
        language: &Language,
        limits: &SandboxLimits,
        stdin: Option<&str>,
    ) -> Result<CodeExecutionResult> {
        let cpu_secs = limits.cpu_time_ms.div_ceil(1000).max(1);
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(LIMIT_WRAPPER)
            .arg("sandbox")
            .arg(limits.memory_limit_kb.to_string())
            .arg(cpu_secs.to_string())
            .arg(language.command)
            .args(language.args)
            .arg(path)
            .current_dir(&self.work_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| EngineError::handler(format!("failed to start {} sandbox: {}", language.name, e)))?;

        let run = async {
            if let Some(data) = stdin {
                if let Some(mut pipe) = child.stdin.take() {
                    // A child that exits without reading closes the pipe
                    let _ = pipe.write_all(data.as_bytes()).await;
                    drop(pipe);
                }
            }
            child.wait_with_output().await
        };

        let outcome = tokio::time::timeout(Duration::from_millis(limits.timeout_ms), run).await;
        let execution_time_ms = started.elapsed().as_millis() as u64;

        let output = match outcome {
            Ok(output) => output?,
            Err(_) => {
                log::warn!("{} sandbox timed out after {} ms", language.name, limits.timeout_ms);
                return Ok(CodeExecutionResult {
                    success: false,
                    output: String::new(),
                    exit_code: None,
                    execution_time_ms,
                    error: Some(format!("execution timed out after {} ms", limits.timeout_ms)),
                    timed_out: true,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() && MEMORY_MARKERS.iter().any(|m| stderr.contains(m)) {
            return Err(EngineError::SandboxMemory(limits.memory_limit_kb));
        }

        log::debug!(
            "{} sandbox exited with {:?} in {} ms ({} bytes stdout)",
            language.name,
            output.status.code(),
            execution_time_ms,
            stdout.len()
        );
        Ok(CodeExecutionResult {
            success: output.status.success(),
            output: stdout,
            exit_code: output.status.code(),
            execution_time_ms,
            error: (!stderr.is_empty()).then_some(stderr),
            timed_out: false,
        })
    }
}

#[async_trait]
impl CodeSandbox for ProcessSandbox {
    async fn execute(
        &self,
        source: &str,
        language: &str,
        limits: &SandboxLimits,
        stdin: Option<&str>,
    ) -> Result<CodeExecutionResult> {
        let lang = Language::find(language)
            .ok_or_else(|| EngineError::config(format!("unsupported language '{}'", language)))?;
        let path = self.write_source(source, lang).await?;
        let result = self.run(&path, lang, limits, stdin).await;
        if let Err(e) = tokio::fs::remove_file(&path).await {
            log::warn!("Failed to remove sandbox file {:?}: {}", path, e);
        }
        result
    }

    fn languages(&self) -> Vec<String> {
        Language::names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox(dir: &tempfile::TempDir) -> ProcessSandbox {
        ProcessSandbox::new(dir.path())
    }

    #[tokio::test]
    async fn test_runs_shell_with_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let result = sandbox(&dir)
            .execute("read name; echo \"hi $name\"", "sh", &SandboxLimits::default(), Some("ada\n"))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output.trim(), "hi ada");
        assert_eq!(result.exit_code, Some(0));
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_nonzero_exit_keeps_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let result = sandbox(&dir)
            .execute("echo boom >&2; exit 3", "sh", &SandboxLimits::default(), None)
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.error.as_deref().map(str::trim), Some("boom"));
    }

    #[tokio::test]
    async fn test_timeout_kills_child_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let limits = SandboxLimits::default().with_overrides(Some(200), None, Some(5000));
        let started = Instant::now();
        let result = sandbox(&dir).execute("sleep 5", "sh", &limits, None).await.unwrap();
        assert!(result.timed_out);
        assert!(!result.success);
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_language() {
        let dir = tempfile::tempdir().unwrap();
        let err = sandbox(&dir)
            .execute("x", "cobol", &SandboxLimits::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }
}
