/// Top-level run orchestration.
///
/// One run: authenticate to the container registry, clear stale
/// artifacts, create a fresh output directory, start the log streamer
/// and startup monitor in the background, run the git/docker reset
/// synchronously, wait out the post-reset grace window for startup
/// detection, then launch the KPI benchmark and surface its exit status
/// as the run's own outcome.
use crate::auth;
use crate::config::RegressConfig;
use crate::kpi;
use crate::monitor::StartupMonitor;
use crate::reset::ResetOrchestrator;
use crate::streamer::LogStreamer;
use crate::workspace;
use std::time::Duration;

/// Execute a full run. Returns the process exit code.
pub async fn run(config: &RegressConfig) -> i32 {
    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            tracing::error!(error = %e, "cannot determine working directory");
            return 1;
        }
    };
    tracing::info!(cwd = %cwd.display(), "run starting");

    if !auth::registry_login(&config.registry.key_file).await {
        return 1;
    }

    if let Err(e) = workspace::delete_stale_artifacts(&cwd) {
        tracing::error!(error = %e, "failed to clear stale artifacts");
        return 1;
    }

    let target_branch = &config.git.target_branch;
    let outdir = workspace::outdir_name(&cwd, target_branch);
    if let Err(e) = std::fs::create_dir_all(&outdir) {
        tracing::error!(outdir = %outdir.display(), error = %e, "failed to create output directory");
        return 1;
    }
    tracing::info!(outdir = %outdir.display(), branch = %target_branch, "created output directory");

    let (build_url, ws_url) = workspace::build_urls(&outdir);
    if !build_url.is_empty() {
        tracing::info!(build_url = %build_url, "build artifacts");
    }
    if !ws_url.is_empty() {
        tracing::info!(
            "check logs for details: {ws_url}git_docker.log, {ws_url}docker_startup_monitor.log"
        );
    }

    let mut streamer = LogStreamer::new(
        &config.container.name,
        &outdir,
        config.watcher.start_time.clone(),
        Duration::from_secs(config.watcher.check_interval_secs),
    );
    if let Err(e) = streamer.start() {
        tracing::error!(error = %e, "failed to start log streamer");
        return 1;
    }

    let mut monitor = match StartupMonitor::new(
        &config.container.name,
        &config.monitor.target_message,
        Duration::from_secs(config.monitor.window_mins * 60),
        Duration::from_secs(config.monitor.poll_secs),
        &outdir,
    ) {
        Ok(monitor) => monitor,
        Err(e) => {
            tracing::error!(error = %e, "failed to start startup monitor");
            streamer.stop().await;
            return 1;
        }
    };
    tracing::info!("starting docker log monitoring and git operations");
    monitor.start_monitoring();

    let reset = match ResetOrchestrator::new(
        &config.paths,
        &config.registry,
        target_branch,
        &outdir,
    ) {
        Ok(reset) => reset,
        Err(e) => {
            tracing::error!(error = %e, "reset orchestrator init failed");
            streamer.stop().await;
            return 1;
        }
    };

    let git_ok = reset.run_git_phase().await;
    if git_ok {
        if !reset.run_docker_phase().await {
            tracing::warn!("docker reset failed; continuing to wait for startup anyway");
        }
    } else {
        tracing::error!("git reset failed; skipping docker reset");
    }
    tracing::info!("git operations and docker reset completed");

    let detected = grace_wait(&monitor, config).await;
    if !detected {
        tracing::error!(
            "startup not detected within the {}-check grace window; aborting",
            config.grace.max_checks
        );
        streamer.stop().await;
        return 1;
    }

    let result = kpi::run_benchmark(&config.kpi, &config.paths, &outdir).await;
    streamer.stop().await;

    match result {
        Ok(result) => {
            tracing::info!(
                log = %result.log_file.display(),
                duration_secs = result.duration.as_secs(),
                "benchmark logs captured"
            );
            if result.success() {
                0
            } else {
                result.exit_code.unwrap_or(1)
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "benchmark run failed");
            1
        }
    }
}

/// Poll the startup monitor at the grace cadence, up to the configured
/// number of checks. Level-triggered: the monitor owns its own deadline;
/// this is a second timeout layered on top.
async fn grace_wait(monitor: &StartupMonitor, config: &RegressConfig) -> bool {
    let tick = Duration::from_secs(config.grace.tick_secs);
    tracing::info!(
        "waiting up to {} seconds for server startup detection",
        config.grace.tick_secs * u64::from(config.grace.max_checks)
    );
    for i in 1..=config.grace.max_checks {
        tokio::time::sleep(tick).await;
        let elapsed = u64::from(i) * config.grace.tick_secs;
        if monitor.detected() {
            tracing::info!("startup detected after {elapsed} seconds");
            return true;
        }
        tracing::info!("{elapsed} seconds elapsed and startup not detected");
    }
    false
}
