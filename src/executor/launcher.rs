use super::ScriptDialect;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;

/// The external program scripts are piped into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interpreter {
    pub program: String,
    pub args: Vec<String>,
    pub dialect: ScriptDialect,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::for_dialect(ScriptDialect::PowerShell)
    }
}

/// A started interpreter with its output pipes detached from the child handle.
pub struct LaunchedProcess {
    pub child: Child,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
    pub stdin_writer: JoinHandle<()>,
}

impl Interpreter {
    /// Stock invocation for a dialect: non-interactive, no profile, script read from stdin.
    pub fn for_dialect(dialect: ScriptDialect) -> Self {
        let (program, args): (&str, &[&str]) = match dialect {
            ScriptDialect::PowerShell => (
                "pwsh",
                &["-NoProfile", "-NonInteractive", "-Command", "-"],
            ),
            ScriptDialect::Posix => ("sh", &["-s"]),
        };
        Self {
            program: program.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            dialect,
        }
    }

    /// Short name used in synthesized failure messages.
    pub fn display_name(&self) -> &str {
        Path::new(&self.program)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.program)
    }

    /// Spawns the interpreter and feeds `script` to its stdin from a
    /// background task, closing the pipe once written.
    ///
    /// The child is killed if its handle is dropped, so every early return
    /// below releases the process.
    pub fn launch(&self, script: String) -> io::Result<LaunchedProcess> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("interpreter stdin was not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("interpreter stdout was not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("interpreter stderr was not piped"))?;

        let stdin_writer = tokio::spawn(write_script(stdin, script));

        Ok(LaunchedProcess {
            child,
            stdout,
            stderr,
            stdin_writer,
        })
    }
}

async fn write_script(mut stdin: ChildStdin, script: String) {
    // The interpreter may exit before reading everything; that surfaces
    // through its exit status, not here.
    if let Err(e) = stdin.write_all(script.as_bytes()).await {
        tracing::debug!("Failed to write script to interpreter stdin: {}", e);
        return;
    }
    if let Err(e) = stdin.shutdown().await {
        tracing::debug!("Failed to close interpreter stdin: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn display_name_strips_directories() {
        let interpreter = Interpreter {
            program: "/usr/local/bin/pwsh".to_string(),
            args: Vec::new(),
            dialect: ScriptDialect::PowerShell,
        };
        assert_eq!(interpreter.display_name(), "pwsh");
    }

    #[tokio::test]
    async fn feeds_script_through_stdin() {
        let interpreter = Interpreter::for_dialect(ScriptDialect::Posix);
        let mut process = interpreter
            .launch("echo from-stdin\n".to_string())
            .expect("launch sh");

        let mut out = String::new();
        process
            .stdout
            .read_to_string(&mut out)
            .await
            .expect("read stdout");
        let status = process.child.wait().await.expect("wait");

        assert!(status.success());
        assert_eq!(out, "from-stdin\n");
    }

    #[tokio::test]
    async fn missing_program_fails_to_start() {
        let interpreter = Interpreter {
            program: "/nonexistent/interpreter".to_string(),
            args: Vec::new(),
            dialect: ScriptDialect::Posix,
        };
        let err = interpreter.launch(String::new()).err().expect("spawn should fail");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
