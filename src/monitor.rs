/// Startup detection: poll recent container log output for a target
/// message under an overall deadline.
///
/// The monitor runs on its own background task from the moment
/// `start_monitoring()` is called. Detection is published through a
/// one-shot `watch` channel: callers can poll `detected()` at their own
/// cadence or await `wait_detected()` with a timeout. Deadline expiry is
/// a terminal warning state, not an error. A failure *launching* the
/// log-fetch command is fatal to the monitor instance and ends polling
/// early; a non-zero exit from the fetch is not.
use crate::logfile::LogFile;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct StartupMonitor {
    container_name: String,
    target_message: String,
    window: Duration,
    poll_interval: Duration,
    /// Lookback passed to `docker logs --since` on each poll.
    lookback: String,
    docker_bin: String,
    log: LogFile,
    detected_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl StartupMonitor {
    pub fn new(
        container_name: impl Into<String>,
        target_message: impl Into<String>,
        window: Duration,
        poll_interval: Duration,
        outdir: &Path,
    ) -> std::io::Result<Self> {
        let log = LogFile::open(outdir.join("docker_startup_monitor.log"))?;
        let (detected_tx, _) = watch::channel(false);
        Ok(Self {
            container_name: container_name.into(),
            target_message: target_message.into(),
            window,
            poll_interval,
            lookback: "1m".to_string(),
            docker_bin: "docker".to_string(),
            log,
            detected_tx,
            handle: None,
        })
    }

    #[cfg(test)]
    pub fn with_docker_bin(mut self, docker_bin: impl Into<String>) -> Self {
        self.docker_bin = docker_bin.into();
        self
    }

    /// Whether the target message has been observed. Single writer
    /// (the poll task), any number of readers.
    pub fn detected(&self) -> bool {
        *self.detected_tx.subscribe().borrow()
    }

    /// Wait up to `timeout` for detection. Returns the detected state at
    /// the time of return.
    pub async fn wait_detected(&self, timeout: Duration) -> bool {
        let mut rx = self.detected_tx.subscribe();
        let detected = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|d| *d)).await,
            Ok(Ok(_))
        );
        detected
    }

    /// Launch the poll loop on a background task.
    pub fn start_monitoring(&mut self) {
        if self.handle.as_ref().is_some_and(|h| !h.is_finished()) {
            tracing::warn!("startup monitoring is already running");
            return;
        }
        self.log.info("Starting log monitoring in background...");

        let poll = PollLoop {
            container_name: self.container_name.clone(),
            target_message: self.target_message.clone(),
            window: self.window,
            poll_interval: self.poll_interval,
            lookback: self.lookback.clone(),
            docker_bin: self.docker_bin.clone(),
            log: self.log.clone(),
            detected_tx: self.detected_tx.clone(),
        };
        self.handle = Some(tokio::spawn(poll.run()));
    }
}

struct PollLoop {
    container_name: String,
    target_message: String,
    window: Duration,
    poll_interval: Duration,
    lookback: String,
    docker_bin: String,
    log: LogFile,
    detected_tx: watch::Sender<bool>,
}

impl PollLoop {
    async fn run(self) {
        let start = tokio::time::Instant::now();
        let deadline = start + self.window;
        self.log.info(&format!(
            "Monitoring started. Will timeout after {}.",
            fmt_hms(self.window.as_secs())
        ));

        while tokio::time::Instant::now() < deadline {
            let fetch = Command::new(&self.docker_bin)
                .args(["logs", "--since", &self.lookback])
                .arg(&self.container_name)
                .stdin(Stdio::null())
                .output()
                .await;

            let output = match fetch {
                Ok(output) => output,
                Err(e) => {
                    // Fatal to this monitor instance: not retried.
                    self.log
                        .error(&format!("Error running log fetch command: {e}"));
                    return;
                }
            };

            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stdout.contains(&self.target_message) || stderr.contains(&self.target_message) {
                self.log.info(&format!(
                    "Found target message: '{}'",
                    self.target_message
                ));
                let _ = self.detected_tx.send(true);
                return;
            }

            let now = tokio::time::Instant::now();
            let elapsed = now.duration_since(start).as_secs();
            let remaining = deadline.saturating_duration_since(now).as_secs();
            self.log.info(&format!(
                "Target message not found, rechecking in {} seconds... Elapsed: {}, Remaining: {}.",
                self.poll_interval.as_secs(),
                fmt_hms(elapsed),
                fmt_hms(remaining)
            ));

            if !stderr.trim().is_empty() {
                let indented: Vec<String> =
                    stderr.lines().map(|l| format!("    {l}")).collect();
                self.log
                    .error(&format!("stderr output:\n{}", indented.join("\n")));
            }

            tokio::time::sleep(self.poll_interval).await;
        }

        self.log.warn(&format!(
            "{} timeout elapsed. Message not found: '{}'",
            fmt_hms(self.window.as_secs()),
            self.target_message
        ));
    }
}

/// Render a second count as `H:MM:SS` for human-readable elapsed and
/// remaining times.
fn fmt_hms(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours}:{minutes:02}:{seconds:02}")
}
