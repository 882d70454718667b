/// Container registry authentication via a service-account key file.
///
/// Runs once at the start of a run; the docker reset phase later
/// re-authenticates with a freshly minted access token (see
/// `reset::ResetOrchestrator`). Failure here is fatal to the run.
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Activate the service account used to pull from the container
/// registry. Returns true on success.
pub async fn registry_login(key_file: &Path) -> bool {
    let result = Command::new("gcloud")
        .args(["auth", "activate-service-account"])
        .arg(format!("--key-file={}", key_file.display()))
        .stdin(Stdio::null())
        .output()
        .await;

    match result {
        Ok(output) if output.status.success() => {
            tracing::info!("registry login successful");
            true
        }
        Ok(output) => {
            tracing::error!(
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "registry login failed"
            );
            false
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to run registry login command");
            false
        }
    }
}
