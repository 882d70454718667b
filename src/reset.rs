/// Reset orchestration: bring the target repository and its
/// docker-compose stack back to a known state.
///
/// Two sequential phases, each an ordered list of typed command
/// descriptors consumed by one generic fail-fast runner: the git phase
/// syncs the repository to the target branch, the docker phase
/// re-authenticates the container registry and hard-restarts the stack.
/// A failing command aborts the rest of its phase; the docker phase is
/// never entered if the git phase failed. Nothing is rolled back.
use crate::config::{PathsConfig, RegistryConfig};
use crate::logfile::LogFile;
use crate::runner::{run_command, CommandSpec};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// One step of a reset phase.
#[derive(Debug, Clone)]
pub struct PhaseCommand {
    /// Short name used in failure messages (defaults to the command text).
    pub label: String,
    pub spec: CommandSpec,
}

impl PhaseCommand {
    pub fn new(spec: CommandSpec) -> Self {
        Self {
            label: spec.display(),
            spec,
        }
    }
}

#[derive(Debug)]
pub enum ResetError {
    /// Required base or server directory is missing. Fatal, no retry.
    MissingPath { path: PathBuf },
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for ResetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResetError::MissingPath { path } => {
                write!(f, "required path not found: {}", path.display())
            }
            ResetError::LogFile { path, source } => {
                write!(f, "failed to open log file {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ResetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResetError::MissingPath { .. } => None,
            ResetError::LogFile { source, .. } => Some(source),
        }
    }
}

#[derive(Debug)]
pub struct ResetOrchestrator {
    base_path: PathBuf,
    server_path: PathBuf,
    target_branch: String,
    registry: RegistryConfig,
    log: LogFile,
}

impl ResetOrchestrator {
    /// Validate the working tree paths and open `git_docker.log` under
    /// the run's output directory.
    pub fn new(
        paths: &PathsConfig,
        registry: &RegistryConfig,
        target_branch: impl Into<String>,
        outdir: &Path,
    ) -> Result<Self, ResetError> {
        for path in [&paths.base, &paths.server] {
            if !path.exists() {
                return Err(ResetError::MissingPath { path: path.clone() });
            }
        }
        let log_path = outdir.join("git_docker.log");
        let log = LogFile::open(&log_path).map_err(|e| ResetError::LogFile {
            path: log_path,
            source: e,
        })?;
        log.info(&format!(
            "Initialized with base: {}, server: {}",
            paths.base.display(),
            paths.server.display()
        ));
        Ok(Self {
            base_path: paths.base.clone(),
            server_path: paths.server.clone(),
            target_branch: target_branch.into(),
            registry: registry.clone(),
            log,
        })
    }

    fn git_commands(&self) -> Vec<PhaseCommand> {
        let branch = &self.target_branch;
        [
            vec!["git", "stash", "push", "-m", "Auto-stash before reset"],
            vec!["git", "checkout", "main"],
            vec!["git", "reset", "--hard", "origin/main"],
            vec!["git", "clean", "-fd"],
            vec!["git", "pull"],
            vec!["git", "checkout", branch],
            vec!["git", "pull"],
        ]
        .into_iter()
        .map(|args| PhaseCommand::new(CommandSpec::args(args).in_dir(&self.base_path)))
        .collect()
    }

    fn docker_commands(&self, access_token: &str) -> Vec<PhaseCommand> {
        // Keep the token out of log lines and failure messages.
        let login = CommandSpec::args([
            "docker",
            "login",
            "-u",
            "oauth2accesstoken",
            "--password",
            access_token,
            &self.registry.url,
        ])
        .in_dir(&self.server_path)
        .logged_as(format!("docker login {}", self.registry.url));
        let mut commands = vec![PhaseCommand::new(login)];
        commands.extend(
            [
                vec!["make", "stopdocker"],
                vec!["docker", "system", "prune", "-af"],
                vec!["make", "hardrestartdocker"],
            ]
            .into_iter()
            .map(|args| PhaseCommand::new(CommandSpec::args(args).in_dir(&self.server_path))),
        );
        commands
    }

    /// Git phase: sync the repository to the target branch. Fail-fast.
    pub async fn run_git_phase(&self) -> bool {
        self.log.info(&format!(
            "Starting git operations for branch '{}'",
            self.target_branch
        ));
        if !run_phase(&self.log, &self.git_commands()).await {
            return false;
        }
        self.log.info("Git operations completed");
        true
    }

    /// Docker phase: registry re-authentication, then stop / prune /
    /// hard-restart. Fail-fast.
    pub async fn run_docker_phase(&self) -> bool {
        self.log.info("Starting docker reset");
        let token = match self.fetch_access_token().await {
            Some(token) => token,
            None => return false,
        };
        run_phase(&self.log, &self.docker_commands(&token)).await
    }

    /// Obtain a fresh registry access token. The token itself never
    /// touches the log file.
    async fn fetch_access_token(&self) -> Option<String> {
        let result = Command::new("gcloud")
            .args(["auth", "print-access-token"])
            .stdin(Stdio::null())
            .output()
            .await;
        match result {
            Ok(output) if output.status.success() => {
                Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
            }
            Ok(output) => {
                self.log.error(&format!(
                    "Failed to obtain registry access token: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ));
                None
            }
            Err(e) => {
                self.log
                    .error(&format!("Failed to obtain registry access token: {e}"));
                None
            }
        }
    }
}

/// Run an ordered list of commands, stopping at the first failure.
/// Returns true only if every command succeeded.
pub async fn run_phase(log: &LogFile, commands: &[PhaseCommand]) -> bool {
    for command in commands {
        let outcome = run_command(&command.spec, log).await;
        if !outcome.ok {
            log.error(&format!(
                "Command '{}' failed. Aborting remaining steps.",
                command.label
            ));
            tracing::error!(
                command = %command.label,
                output = %outcome.output(),
                "reset command failed"
            );
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PathsConfig, RegistryConfig};
    use tempfile::TempDir;

    fn test_log(dir: &TempDir) -> LogFile {
        LogFile::open(dir.path().join("phase.log")).unwrap()
    }

    fn touch_cmd(dir: &Path, name: &str) -> PhaseCommand {
        PhaseCommand::new(
            CommandSpec::shell(format!("touch {}", dir.join(name).display())),
        )
    }

    #[tokio::test]
    async fn phase_stops_at_first_failure() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);

        let commands = vec![
            touch_cmd(dir.path(), "a"),
            PhaseCommand::new(CommandSpec::shell("exit 1")),
            touch_cmd(dir.path(), "c"),
        ];

        assert!(!run_phase(&log, &commands).await);
        assert!(dir.path().join("a").exists());
        // C never ran: no partial continuation past a failure.
        assert!(!dir.path().join("c").exists());

        let logged = std::fs::read_to_string(log.path()).unwrap();
        assert!(logged.contains("Aborting remaining steps"));
    }

    #[tokio::test]
    async fn phase_succeeds_when_all_commands_pass() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);

        let commands = vec![touch_cmd(dir.path(), "a"), touch_cmd(dir.path(), "b")];
        assert!(run_phase(&log, &commands).await);
        assert!(dir.path().join("a").exists());
        assert!(dir.path().join("b").exists());
    }

    #[tokio::test]
    async fn empty_phase_is_vacuously_successful() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);
        assert!(run_phase(&log, &[]).await);
    }

    #[test]
    fn missing_paths_are_fatal_at_construction() {
        let dir = TempDir::new().unwrap();
        let paths = PathsConfig {
            base: dir.path().join("does-not-exist"),
            server: dir.path().to_path_buf(),
        };
        let err = ResetOrchestrator::new(
            &paths,
            &RegistryConfig::default(),
            "main",
            dir.path(),
        )
        .unwrap_err();
        assert!(matches!(err, ResetError::MissingPath { .. }));
        assert!(err.to_string().contains("does-not-exist"));
    }

    #[test]
    fn git_commands_follow_the_reset_sequence() {
        let dir = TempDir::new().unwrap();
        let paths = PathsConfig {
            base: dir.path().to_path_buf(),
            server: dir.path().to_path_buf(),
        };
        let orchestrator = ResetOrchestrator::new(
            &paths,
            &RegistryConfig::default(),
            "feature/foo",
            dir.path(),
        )
        .unwrap();

        let labels: Vec<String> = orchestrator
            .git_commands()
            .iter()
            .map(|c| c.label.clone())
            .collect();
        assert_eq!(labels[0], "git stash push -m Auto-stash before reset");
        assert_eq!(labels[1], "git checkout main");
        assert_eq!(labels[2], "git reset --hard origin/main");
        assert_eq!(labels[3], "git clean -fd");
        assert_eq!(labels[4], "git pull");
        assert_eq!(labels[5], "git checkout feature/foo");
        assert_eq!(labels[6], "git pull");
    }

    #[test]
    fn docker_login_label_hides_the_token() {
        let dir = TempDir::new().unwrap();
        let paths = PathsConfig {
            base: dir.path().to_path_buf(),
            server: dir.path().to_path_buf(),
        };
        let orchestrator =
            ResetOrchestrator::new(&paths, &RegistryConfig::default(), "main", dir.path())
                .unwrap();

        let commands = orchestrator.docker_commands("sekrit-token");
        assert!(!commands[0].label.contains("sekrit-token"));
        assert_eq!(commands.len(), 4);
        assert_eq!(commands[1].label, "make stopdocker");
        assert_eq!(commands[2].label, "docker system prune -af");
        assert_eq!(commands[3].label, "make hardrestartdocker");
    }
}
