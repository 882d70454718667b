/// Container log streamer with auto-reconnect.
///
/// Attaches to `docker logs --follow` for one container and appends every
/// line to a persistent log file on a background task. The watch loop
/// tolerates the container not existing yet and lost connections by
/// sleeping a check interval and re-resolving the container; it stops
/// promptly when `stop()` signals it.
use crate::logfile::LogFile;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct LogStreamer {
    container_name: String,
    log_path: PathBuf,
    /// Optional `--since` cursor handed to the container runtime
    /// (e.g. an RFC 3339 timestamp).
    start_time: Option<String>,
    check_interval: Duration,
    docker_bin: String,
    stop_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl LogStreamer {
    pub fn new(
        container_name: impl Into<String>,
        outdir: &Path,
        start_time: Option<String>,
        check_interval: Duration,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            container_name: container_name.into(),
            log_path: outdir.join("docker_log_streamer.log"),
            start_time,
            check_interval,
            docker_bin: "docker".to_string(),
            stop_tx,
            handle: None,
        }
    }

    #[cfg(test)]
    pub fn with_docker_bin(mut self, docker_bin: impl Into<String>) -> Self {
        self.docker_bin = docker_bin.into();
        self
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start streaming on a background task. Calling this while a stream
    /// is already active is a no-op with a warning.
    pub fn start(&mut self) -> std::io::Result<()> {
        if self.is_running() {
            tracing::warn!(
                container = %self.container_name,
                "log streaming is already running"
            );
            return Ok(());
        }

        let log = LogFile::open(&self.log_path)?;
        tracing::info!(log_file = %self.log_path.display(), "log streamer output");

        // A fresh start clears any stop request left over from a previous
        // stop/start cycle.
        let _ = self.stop_tx.send(false);
        let stop_rx = self.stop_tx.subscribe();

        let loop_state = StreamLoop {
            container_name: self.container_name.clone(),
            start_time: self.start_time.clone(),
            check_interval: self.check_interval,
            docker_bin: self.docker_bin.clone(),
            log,
        };
        self.handle = Some(tokio::spawn(loop_state.run(stop_rx)));
        tracing::info!(container = %self.container_name, "started log streaming");
        Ok(())
    }

    /// Signal the watch loop to stop and wait for it to finish.
    /// Idempotent: safe to call when never started or already stopped.
    pub async fn stop(&mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        tracing::info!(container = %self.container_name, "stopped log streaming");
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

struct StreamLoop {
    container_name: String,
    start_time: Option<String>,
    check_interval: Duration,
    docker_bin: String,
    log: LogFile,
}

impl StreamLoop {
    async fn run(self, mut stop: watch::Receiver<bool>) {
        while !*stop.borrow() {
            if !self.container_exists().await {
                self.log.warn("Waiting for container to be available...");
                if sleep_or_stop(self.check_interval, &mut stop).await {
                    return;
                }
                continue;
            }

            match self.follow_logs(&mut stop).await {
                FollowEnd::Stopped => return,
                FollowEnd::Lost(reason) => {
                    self.log.error(&format!(
                        "Lost connection to container: {reason}. Reconnecting..."
                    ));
                    if sleep_or_stop(self.check_interval, &mut stop).await {
                        return;
                    }
                }
            }
        }
    }

    /// Resolve the container by name; absence is the transient
    /// "not up yet" state, not an error.
    async fn container_exists(&self) -> bool {
        let result = Command::new(&self.docker_bin)
            .args(["container", "inspect", "--format", "{{.Id}}"])
            .arg(&self.container_name)
            .stdin(Stdio::null())
            .output()
            .await;
        match result {
            Ok(output) => output.status.success(),
            Err(e) => {
                self.log
                    .error(&format!("Container '{}' lookup failed: {e}", self.container_name));
                false
            }
        }
    }

    /// Follow the container's log stream, appending each line to the log
    /// file, until stop is requested or the stream breaks.
    async fn follow_logs(&self, stop: &mut watch::Receiver<bool>) -> FollowEnd {
        let mut cmd = Command::new(&self.docker_bin);
        cmd.args(["logs", "--follow"]);
        if let Some(since) = &self.start_time {
            cmd.args(["--since", since]);
        }
        cmd.arg(&self.container_name)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return FollowEnd::Lost(e.to_string()),
        };
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.kill().await;
            return FollowEnd::Lost("missing log stream pipes".to_string());
        };
        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let mut out_open = true;
        let mut err_open = true;

        let end = loop {
            if !out_open && !err_open {
                break FollowEnd::Lost("log stream ended".to_string());
            }
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break FollowEnd::Stopped;
                    }
                }
                line = out_lines.next_line(), if out_open => match line {
                    Ok(Some(line)) => self.append(&line),
                    Ok(None) => out_open = false,
                    Err(e) => break FollowEnd::Lost(e.to_string()),
                },
                line = err_lines.next_line(), if err_open => match line {
                    Ok(Some(line)) => self.append(&line),
                    Ok(None) => err_open = false,
                    Err(e) => break FollowEnd::Lost(e.to_string()),
                },
            }
        };

        let _ = child.kill().await;
        end
    }

    fn append(&self, line: &str) {
        let line = line.trim_end();
        if !line.is_empty() {
            self.log.info(line);
        }
    }
}

enum FollowEnd {
    /// Stop was requested; leave the watch loop entirely.
    Stopped,
    /// Stream broke (container removed, runtime error); retry after the
    /// check interval.
    Lost(String),
}

/// Sleep for the check interval, returning early with `true` if stop is
/// requested mid-sleep.
async fn sleep_or_stop(interval: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(interval) => false,
        changed = stop.changed() => changed.is_err() || *stop.borrow(),
    }
}
