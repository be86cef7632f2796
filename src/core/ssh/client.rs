use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread;

use crate::error::{Error, Result};
use crate::host::Host;
use crate::template::{TemplateStore, VariableContext};
use crate::utils::shell;

/// Connection parameters shared by every command a session runs.
#[derive(Debug, Clone)]
pub struct SshOptions {
    pub port: u16,
    pub identity_file: Option<String>,
}

impl Default for SshOptions {
    fn default() -> Self {
        SshOptions {
            port: 22,
            identity_file: None,
        }
    }
}

impl SshOptions {
    pub fn with_identity_file(mut self, path: Option<&str>) -> Result<Self> {
        self.identity_file = match path {
            Some(path) if !path.is_empty() => {
                let expanded = shellexpand::tilde(path).to_string();
                if !std::path::Path::new(&expanded).exists() {
                    return Err(Error::config(format!(
                        "SSH identity file not found: {}",
                        expanded
                    )));
                }
                Some(expanded)
            }
            _ => None,
        };
        Ok(self)
    }
}

/// Outcome of one remote command. Immutable once produced.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub exit_signal: Option<i32>,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && self.exit_signal.is_none()
    }

    /// Primary diagnostic for a failed step: stderr if any, else stdout.
    pub fn error_text(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Runs commands on one resolved host over SSH.
///
/// Each `execute` call is a fresh `ssh` process running the command string as
/// a single remote shell invocation (multi-line scripts included). While the
/// remote command runs, stdout and stderr are each serviced by a dedicated
/// reader thread that tees chunks to the local stream and accumulates them,
/// so neither channel can stall the other. Both readers are joined before
/// the exit status is collected.
#[derive(Debug)]
pub struct RemoteSession<'a> {
    host: &'a Host,
    options: SshOptions,
}

impl<'a> RemoteSession<'a> {
    /// Open a session against a host. The host must have resolved already;
    /// an unresolved hostname is a configuration error, not an SSH failure.
    pub fn open(host: &'a Host, options: SshOptions) -> Result<Self> {
        if !host.is_resolved() {
            return Err(Error::config(format!(
                "host '{}' has not been resolved",
                host.hostname()
            )));
        }
        Ok(RemoteSession { host, options })
    }

    /// Connection parameters, for callers that reach the host outside the
    /// session (the git push must target the same port and key).
    pub fn options(&self) -> &SshOptions {
        &self.options
    }

    fn build_ssh_args(&self, username: &str, command: &str) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(identity_file) = &self.options.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }

        if self.options.port != 22 {
            args.push("-p".to_string());
            args.push(self.options.port.to_string());
        }

        // Never fall back to password prompts mid-procedure
        args.extend(["-o".to_string(), "BatchMode=yes".to_string()]);

        args.push(format!("{}@{}", username, self.host.hostname()));
        args.push(command.to_string());

        args
    }

    /// Run `command` as `username` on the session host, streaming output
    /// locally while accumulating it, and capturing the exit status or the
    /// terminating signal.
    pub fn execute(&self, username: &str, command: &str) -> Result<ExecutionResult> {
        log_status!(
            "ssh",
            "{}@{}: {}",
            username,
            self.host.hostname(),
            condense(command)
        );

        let mut child = Command::new("ssh")
            .args(self.build_ssh_args(username, command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::remote("ssh", format!("failed to spawn ssh: {}", e)))?;

        self.collect(&mut child)
    }

    /// Convenience variant for call sites that branch on the result inline
    /// (existence tests, file reads) without building a full procedure step.
    pub fn execute_with<T>(
        &self,
        username: &str,
        command: &str,
        handler: impl FnOnce(&ExecutionResult) -> T,
    ) -> Result<T> {
        let result = self.execute(username, command)?;
        Ok(handler(&result))
    }

    /// Run a command that must succeed; nonzero exit or a signal aborts the
    /// procedure with the step's diagnostic.
    pub fn execute_checked(
        &self,
        step: &str,
        username: &str,
        command: &str,
    ) -> Result<ExecutionResult> {
        let result = self.execute(username, command)?;
        if result.success() {
            Ok(result)
        } else {
            Err(Error::remote(step, describe_failure(&result)))
        }
    }

    fn collect(&self, child: &mut Child) -> Result<ExecutionResult> {
        // Both pipes were requested above; take() cannot fail
        let child_stdout = child.stdout.take();
        let child_stderr = child.stderr.take();

        let stdout_thread = thread::spawn(move || tee(child_stdout, std::io::stdout()));
        let stderr_thread = thread::spawn(move || tee(child_stderr, std::io::stderr()));

        let stdout = stdout_thread
            .join()
            .unwrap_or_default();
        let stderr = stderr_thread
            .join()
            .unwrap_or_default();

        let status = child
            .wait()
            .map_err(|e| Error::remote("ssh", format!("failed to wait for ssh: {}", e)))?;

        Ok(ExecutionResult {
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
            exit_code: status.code(),
            exit_signal: exit_signal(&status),
        })
    }

    // ------------------------------------------------------------------
    // Derived operations
    // ------------------------------------------------------------------

    /// True when `path` exists for `username` (exit code 0 on `test -e`).
    pub fn path_exists(&self, username: &str, path: &str) -> Result<bool> {
        let command = format!("test -e {}", shell::quote_path(path));
        self.execute_with(username, &command, |result| result.success())
    }

    /// Read a remote file. Nonzero exit (typically: absent file) maps to None.
    ///
    /// Contents come back through the result's text fields, so non-UTF-8
    /// bytes are replaced. Fine for the env/config files the procedures
    /// read; not a transport for binary content.
    pub fn read_file(&self, username: &str, path: &str) -> Result<Option<String>> {
        let command = format!("cat {}", shell::quote_path(path));
        self.execute_with(username, &command, |result| {
            if result.success() {
                Some(result.stdout.clone())
            } else {
                None
            }
        })
    }

    /// Overwrite a remote file wholesale, creating its parent directory.
    pub fn write_file(
        &self,
        step: &str,
        username: &str,
        path: &str,
        content: &str,
    ) -> Result<ExecutionResult> {
        let command = format!(
            "mkdir -p $( dirname {path} )\necho {content} > {path}",
            path = shell::quote_path(path),
            content = shell::quote_arg(content),
        );
        self.execute_checked(step, username, &command)
    }

    /// Resolve a named template against `context`, then run it remotely.
    pub fn run_template(
        &self,
        step: &str,
        username: &str,
        template: &str,
        context: &VariableContext,
    ) -> Result<ExecutionResult> {
        let command = TemplateStore::global().render(template, context)?;
        self.execute_checked(step, username, &command)
    }
}

/// Copy everything from a child pipe to a local stream, flushing per chunk so
/// remote progress is visible live, while accumulating the bytes.
fn tee(source: Option<impl Read>, mut sink: impl Write) -> Vec<u8> {
    let mut accumulated = Vec::new();
    let Some(mut source) = source else {
        return accumulated;
    };

    let mut buf = [0u8; 8192];
    loop {
        match source.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let chunk = &buf[..n];
                let _ = sink.write_all(chunk);
                let _ = sink.flush();
                accumulated.extend_from_slice(chunk);
            }
        }
    }

    accumulated
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

fn describe_failure(result: &ExecutionResult) -> String {
    let status = match (result.exit_code, result.exit_signal) {
        (_, Some(signal)) => format!("killed by signal {}", signal),
        (Some(code), None) => format!("exit code {}", code),
        (None, None) => "no exit status".to_string(),
    };

    let diagnostic = result.error_text();
    if diagnostic.is_empty() {
        status
    } else {
        format!("{}: {}", status, diagnostic)
    }
}

/// Collapse template indentation for one-line progress logging.
fn condense(command: &str) -> String {
    command
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(exit_code: Option<i32>, exit_signal: Option<i32>) -> ExecutionResult {
        ExecutionResult {
            stdout: String::new(),
            stderr: String::new(),
            exit_code,
            exit_signal,
        }
    }

    #[test]
    fn success_requires_zero_exit_and_no_signal() {
        assert!(result(Some(0), None).success());
        assert!(!result(Some(1), None).success());
        assert!(!result(Some(0), Some(9)).success());
        assert!(!result(None, Some(15)).success());
        assert!(!result(None, None).success());
    }

    #[test]
    fn error_text_prefers_stderr() {
        let mut r = result(Some(1), None);
        r.stdout = "out\n".to_string();
        r.stderr = "bad thing\n".to_string();
        assert_eq!(r.error_text(), "bad thing");

        r.stderr.clear();
        assert_eq!(r.error_text(), "out");
    }

    #[test]
    fn describe_failure_includes_signal() {
        let r = result(None, Some(9));
        assert_eq!(describe_failure(&r), "killed by signal 9");
    }

    #[test]
    fn condense_flattens_script_indentation() {
        let script = "\n    mkdir -p x\n\n    echo done\n";
        assert_eq!(condense(script), "mkdir -p x; echo done");
    }

    #[test]
    fn open_rejects_unresolved_host() {
        let host = Host::new("example.com");
        let err = RemoteSession::open(&host, SshOptions::default()).unwrap_err();
        assert_eq!(err.code(), "config");
    }

    #[test]
    fn tee_accumulates_and_forwards() {
        let input = b"chunked output".to_vec();
        let mut sink = Vec::new();
        let collected = tee(Some(&input[..]), &mut sink);
        assert_eq!(collected, input);
        assert_eq!(sink, input);
    }

    #[test]
    fn build_args_include_port_identity_and_batch_mode() {
        let mut host = Host::new("localhost");
        host.resolve().unwrap();
        let session = RemoteSession::open(
            &host,
            SshOptions {
                port: 2222,
                identity_file: Some("/tmp/key".to_string()),
            },
        )
        .unwrap();

        let args = session.build_ssh_args("deploy", "uptime");
        assert_eq!(
            args,
            vec![
                "-i",
                "/tmp/key",
                "-p",
                "2222",
                "-o",
                "BatchMode=yes",
                "deploy@localhost",
                "uptime"
            ]
        );
    }
}
