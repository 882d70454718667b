/// Command runner: spawn an external process, drain stdout and stderr
/// line-by-line without blocking on either, log every line, and report
/// success plus captured output.
///
/// By contract this module never returns an error to the caller: launch
/// failures and I/O failures come back as `ok = false` with the failure
/// message as the output, matching the fail-fast phase runners that
/// consume it.
use crate::logfile::LogFile;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

/// How the command text should be interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// Pre-tokenized argument vector: `args[0]` is the program.
    Args(Vec<String>),
    /// A single string, tokenized with shell-word-splitting rules and run
    /// directly (no shell).
    Line(String),
    /// A single string handed to `sh -c` verbatim.
    Shell(String),
}

/// A typed command descriptor: what to run and where.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub command: CommandLine,
    /// Working directory; the caller's current directory when `None`.
    pub cwd: Option<PathBuf>,
    /// Replacement text for log lines, for commands carrying secrets.
    display_override: Option<String>,
}

impl CommandSpec {
    pub fn args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: CommandLine::Args(args.into_iter().map(Into::into).collect()),
            cwd: None,
            display_override: None,
        }
    }

    pub fn line(line: impl Into<String>) -> Self {
        Self {
            command: CommandLine::Line(line.into()),
            cwd: None,
            display_override: None,
        }
    }

    pub fn shell(line: impl Into<String>) -> Self {
        Self {
            command: CommandLine::Shell(line.into()),
            cwd: None,
            display_override: None,
        }
    }

    pub fn in_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Log this command under a different name (e.g. with a secret
    /// argument redacted).
    pub fn logged_as(mut self, label: impl Into<String>) -> Self {
        self.display_override = Some(label.into());
        self
    }

    /// Human-readable form for log lines and failure messages.
    pub fn display(&self) -> String {
        if let Some(label) = &self.display_override {
            return label.clone();
        }
        match &self.command {
            CommandLine::Args(args) => args.join(" "),
            CommandLine::Line(line) | CommandLine::Shell(line) => line.clone(),
        }
    }

    /// Resolve to a (program, args) pair ready to spawn.
    fn tokenize(&self) -> Result<(String, Vec<String>), String> {
        let tokens = match &self.command {
            CommandLine::Args(args) => args.clone(),
            CommandLine::Line(line) => {
                shell_words::split(line).map_err(|e| format!("bad command line: {e}"))?
            }
            CommandLine::Shell(line) => {
                vec!["sh".to_string(), "-c".to_string(), line.clone()]
            }
        };
        match tokens.split_first() {
            Some((program, rest)) => Ok((program.clone(), rest.to_vec())),
            None => Err("empty command".to_string()),
        }
    }
}

/// Outcome of a completed (or failed-to-launch) command.
#[derive(Debug)]
pub struct CommandOutcome {
    /// True iff the process launched and exited with status zero.
    pub ok: bool,
    pub stdout_lines: Vec<String>,
    pub stderr_lines: Vec<String>,
}

impl CommandOutcome {
    /// Joined stdout on success, joined stderr on failure. The other
    /// stream's lines are dropped here but remain in the log file.
    pub fn output(&self) -> String {
        if self.ok {
            self.stdout_lines.join("\n")
        } else {
            self.stderr_lines.join("\n")
        }
    }

    fn launch_failure(message: String) -> Self {
        Self {
            ok: false,
            stdout_lines: Vec::new(),
            stderr_lines: vec![message],
        }
    }
}

/// Read one stream to EOF, logging each non-empty line with its tag and
/// collecting it for the outcome.
async fn drain_stream<R: AsyncRead + Unpin>(
    stream: R,
    tag: &'static str,
    log: LogFile,
) -> Vec<String> {
    let mut lines = BufReader::new(stream).lines();
    let mut collected = Vec::new();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                if tag == "stderr" {
                    log.error(&format!("\t{tag}: {line}"));
                } else {
                    log.info(&format!("\t{tag}: {line}"));
                }
                collected.push(line);
            }
            Ok(None) => break,
            Err(e) => {
                log.error(&format!("\t{tag}: read error: {e}"));
                break;
            }
        }
    }
    collected
}

/// Run a command to completion, capturing output per stream.
pub async fn run_command(spec: &CommandSpec, log: &LogFile) -> CommandOutcome {
    let (program, args) = match spec.tokenize() {
        Ok(pair) => pair,
        Err(msg) => {
            log.error(&format!("Command failed: {msg}"));
            return CommandOutcome::launch_failure(msg);
        }
    };

    let cwd_display = spec
        .cwd
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| {
            std::env::current_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| ".".to_string())
        });
    log.info(&format!(
        "Running command: {} in {cwd_display}",
        spec.display()
    ));
    tracing::debug!(command = %spec.display(), cwd = %cwd_display, "running command");

    let mut cmd = Command::new(&program);
    cmd.args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null());
    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            let msg = format!("failed to spawn '{program}': {e}");
            log.error(&format!("Command failed: {msg}"));
            return CommandOutcome::launch_failure(msg);
        }
    };

    // Stdio::piped() guarantees both handles are present.
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        let _ = child.kill().await;
        let msg = format!("missing output pipes for '{program}'");
        log.error(&format!("Command failed: {msg}"));
        return CommandOutcome::launch_failure(msg);
    };

    let out_task = tokio::spawn(drain_stream(stdout, "stdout", log.clone()));
    let err_task = tokio::spawn(drain_stream(stderr, "stderr", log.clone()));

    let status = match child.wait().await {
        Ok(status) => status,
        Err(e) => {
            let msg = format!("failed waiting for '{program}': {e}");
            log.error(&format!("Command failed: {msg}"));
            return CommandOutcome::launch_failure(msg);
        }
    };

    let stdout_lines = out_task.await.unwrap_or_default();
    let stderr_lines = err_task.await.unwrap_or_default();

    let ok = status.success();
    if !ok {
        tracing::debug!(
            command = %spec.display(),
            code = ?status.code(),
            "command exited non-zero"
        );
    }

    CommandOutcome {
        ok,
        stdout_lines,
        stderr_lines,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_log(dir: &TempDir) -> LogFile {
        LogFile::open(dir.path().join("runner.log")).unwrap()
    }

    #[tokio::test]
    async fn stdout_captured_in_order_on_success() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);

        let spec = CommandSpec::shell("echo one; echo two; echo three");
        let outcome = run_command(&spec, &log).await;

        assert!(outcome.ok);
        assert_eq!(outcome.output(), "one\ntwo\nthree");

        let logged = std::fs::read_to_string(log.path()).unwrap();
        assert!(logged.contains("\tstdout: one"));
        assert!(logged.contains("\tstdout: two"));
        assert!(logged.contains("\tstdout: three"));
    }

    #[tokio::test]
    async fn failure_returns_stderr_only() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);

        let spec = CommandSpec::shell("echo visible-on-stdout; echo boom >&2; exit 3");
        let outcome = run_command(&spec, &log).await;

        assert!(!outcome.ok);
        assert_eq!(outcome.output(), "boom");
        // stdout was still captured and logged, just not returned
        assert_eq!(outcome.stdout_lines, vec!["visible-on-stdout"]);
        let logged = std::fs::read_to_string(log.path()).unwrap();
        assert!(logged.contains("\tstdout: visible-on-stdout"));
        assert!(logged.contains("\tstderr: boom"));
    }

    #[tokio::test]
    async fn spawn_failure_is_reported_not_raised() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);

        let spec = CommandSpec::args(["nonexistent-binary-xyz"]);
        let outcome = run_command(&spec, &log).await;

        assert!(!outcome.ok);
        assert!(outcome.output().contains("failed to spawn"));
    }

    #[tokio::test]
    async fn empty_command_is_reported_not_raised() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);

        let outcome = run_command(&CommandSpec::args(Vec::<String>::new()), &log).await;
        assert!(!outcome.ok);
        assert!(outcome.output().contains("empty command"));
    }

    #[tokio::test]
    async fn line_form_is_tokenized_with_shell_word_rules() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);

        let spec = CommandSpec::line("echo 'hello world'");
        let outcome = run_command(&spec, &log).await;

        assert!(outcome.ok);
        // Quoting kept the two words as one argument
        assert_eq!(outcome.output(), "hello world");
    }

    #[tokio::test]
    async fn unbalanced_quote_is_a_launch_failure() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);

        let outcome = run_command(&CommandSpec::line("echo 'oops"), &log).await;
        assert!(!outcome.ok);
        assert!(outcome.output().contains("bad command line"));
    }

    #[tokio::test]
    async fn cwd_is_respected() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();

        let spec = CommandSpec::shell("ls").in_dir(dir.path());
        let outcome = run_command(&spec, &log).await;

        assert!(outcome.ok);
        assert!(outcome.output().contains("marker.txt"));
    }

    #[test]
    fn display_renders_each_form() {
        assert_eq!(CommandSpec::args(["git", "pull"]).display(), "git pull");
        assert_eq!(CommandSpec::line("git pull").display(), "git pull");
        assert_eq!(CommandSpec::shell("a && b").display(), "a && b");
    }
}
