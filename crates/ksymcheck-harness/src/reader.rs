//! Symbol-table tool adapter.
//!
//! The tool is treated as an oracle: we hand it a binary path and a mode and
//! take its stdout lines as-is. Parsing lives in `ksymcheck_core::normalize`.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use ksymcheck_core::AuditError;

use crate::process;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Source of raw symbol-table lines for a binary.
///
/// Implementations must be safe to call from several worker threads.
pub trait SymbolTableReader: Sync {
    /// Lines describing symbols the binary references but does not define.
    fn read_undefined(&self, binary: &Path) -> Result<Vec<String>, AuditError>;
    /// Lines describing symbols the binary defines.
    fn read_defined(&self, binary: &Path) -> Result<Vec<String>, AuditError>;
}

/// Runs an `nm`-compatible program (`llvm-nm`, `nm`) as a subprocess.
#[derive(Debug, Clone)]
pub struct NmReader {
    program: String,
    timeout: Option<Duration>,
}

impl NmReader {
    #[must_use]
    pub fn new(program: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    fn run(&self, mode_flag: &str, binary: &Path) -> Result<Vec<String>, AuditError> {
        if process::interrupted() {
            return Err(AuditError::Interrupted);
        }
        let mut command = Command::new(&self.program);
        command
            .arg(mode_flag)
            .arg(binary)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = process::isolate(&mut command)
            .spawn()
            .map_err(|e| self.invocation_error(binary, spawn_reason(&e)))?;

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        // Drain both pipes while waiting so a chatty child cannot block on a full pipe.
        // The pipes only close once the whole process group is gone, so `wait`
        // must not return before that.
        let (status, stdout, stderr) = std::thread::scope(|scope| {
            let out = scope.spawn(move || drain(stdout_pipe));
            let err = scope.spawn(move || drain(stderr_pipe));
            let status = self.wait(&mut child, binary);
            (
                status,
                out.join().unwrap_or_default(),
                err.join().unwrap_or_default(),
            )
        });
        let status = status?;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            let reason = match stderr.trim() {
                "" => format!("exited with {status}"),
                diag => format!("exited with {status}: {diag}"),
            };
            return Err(self.invocation_error(binary, reason));
        }

        Ok(String::from_utf8_lossy(&stdout)
            .lines()
            .map(str::to_string)
            .collect())
    }

    /// Wait for the child, killing its process group on timeout or interrupt.
    fn wait(&self, child: &mut Child, binary: &Path) -> Result<ExitStatus, AuditError> {
        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    process::kill_stragglers(child);
                    return Ok(status);
                }
                Ok(None) if process::interrupted() => {
                    process::kill_tree(child);
                    return Err(AuditError::Interrupted);
                }
                Ok(None) => {
                    if let Some(timeout) = self.timeout.filter(|t| started.elapsed() >= *t) {
                        process::kill_tree(child);
                        return Err(AuditError::ToolTimeout {
                            tool: self.program.clone(),
                            binary: binary.to_path_buf(),
                            timeout,
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    process::kill_tree(child);
                    return Err(self.invocation_error(binary, format!("wait: {e}")));
                }
            }
        }
    }

    fn invocation_error(&self, binary: &Path, reason: String) -> AuditError {
        AuditError::ToolInvocation {
            tool: self.program.clone(),
            binary: binary.to_path_buf(),
            reason,
        }
    }
}

impl SymbolTableReader for NmReader {
    fn read_undefined(&self, binary: &Path) -> Result<Vec<String>, AuditError> {
        self.run("--undefined-only", binary)
    }

    fn read_defined(&self, binary: &Path) -> Result<Vec<String>, AuditError> {
        self.run("--defined-only", binary)
    }
}

fn drain<R: Read>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    buf
}

fn spawn_reason(err: &std::io::Error) -> String {
    if err.kind() == std::io::ErrorKind::NotFound {
        "program not found".to_string()
    } else {
        format!("spawn: {err}")
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &Path, body: &str) -> String {
        let path = dir.join("fake-nm");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn passes_mode_flag_and_captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let tool = script(dir.path(), r#"echo "                 U $1""#);
        let reader = NmReader::new(tool, Some(Duration::from_secs(10)));
        let lines = reader.read_undefined(Path::new("foo.ko")).unwrap();
        assert_eq!(lines, vec!["                 U --undefined-only"]);
        let lines = reader.read_defined(Path::new("foo.ko")).unwrap();
        assert_eq!(lines, vec!["                 U --defined-only"]);
    }

    #[test]
    fn nonzero_exit_surfaces_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let tool = script(dir.path(), "echo 'not an object file' >&2\nexit 1");
        let reader = NmReader::new(tool, None);
        match reader.read_defined(Path::new("broken.ko")) {
            Err(AuditError::ToolInvocation { reason, binary, .. }) => {
                assert!(reason.contains("not an object file"), "{reason}");
                assert_eq!(binary, Path::new("broken.ko"));
            }
            other => panic!("expected tool invocation error, got {other:?}"),
        }
    }

    #[test]
    fn missing_program_is_invocation_error() {
        let reader = NmReader::new("/definitely/not/here/llvm-nm", None);
        match reader.read_undefined(Path::new("foo.ko")) {
            Err(AuditError::ToolInvocation { reason, .. }) => {
                assert_eq!(reason, "program not found");
            }
            other => panic!("expected tool invocation error, got {other:?}"),
        }
    }

    /// Dead or a zombie waiting to be reaped by init.
    #[cfg(target_os = "linux")]
    fn process_gone(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit_once(')')
                .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z')),
            Err(_) => true,
        }
    }

    #[test]
    fn hung_tool_is_killed_after_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let tool = script(dir.path(), "exec sleep 30");
        let reader = NmReader::new(tool, Some(Duration::from_millis(200)));
        let started = Instant::now();
        let err = reader.read_undefined(Path::new("slow.ko")).unwrap_err();
        assert!(matches!(err, AuditError::ToolTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn timeout_holds_when_tool_forks() {
        let dir = tempfile::tempdir().unwrap();
        // No exec: the shell forks sleep, which inherits the output pipes.
        let tool = script(dir.path(), "sleep 5\necho done");
        let reader = NmReader::new(tool, Some(Duration::from_millis(200)));
        let started = Instant::now();
        let err = reader.read_defined(Path::new("slow.ko")).unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
        match err {
            AuditError::ToolTimeout { timeout, .. } => {
                assert_eq!(timeout, Duration::from_millis(200));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn forked_helpers_do_not_outlive_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("helper.pid");
        let tool = script(
            dir.path(),
            &format!("sleep 30 &\necho $! > {}\nwait", pid_file.display()),
        );
        let reader = NmReader::new(tool, Some(Duration::from_millis(500)));
        let err = reader.read_undefined(Path::new("slow.ko")).unwrap_err();
        assert!(matches!(err, AuditError::ToolTimeout { .. }));

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let pid = pid.trim();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !process_gone(pid) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(process_gone(pid), "helper {pid} still running");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn background_helper_is_cleaned_up_after_success() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("helper.pid");
        let tool = script(
            dir.path(),
            &format!(
                "sleep 30 &\necho $! > {}\necho \"                 U alpha\"",
                pid_file.display()
            ),
        );
        let reader = NmReader::new(tool, Some(Duration::from_secs(20)));
        let started = Instant::now();
        let lines = reader.read_undefined(Path::new("foo.ko")).unwrap();
        assert_eq!(lines, vec!["                 U alpha"]);
        assert!(started.elapsed() < Duration::from_secs(10));

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let pid = pid.trim();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !process_gone(pid) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(process_gone(pid), "helper {pid} still running");
    }
}
