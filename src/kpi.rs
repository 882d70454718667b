/// Downstream KPI benchmark launcher.
///
/// Builds the fixed benchmark command line from configuration, spawns it
/// with stdout and stderr redirected into one log file inside the run's
/// output directory, and reports the exit status. The benchmark's exit
/// code becomes the run's own outcome.
use crate::config::{KpiConfig, PathsConfig};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

/// Result of a completed benchmark invocation.
#[derive(Debug)]
pub struct KpiResult {
    /// Process exit code (None if killed by signal).
    pub exit_code: Option<i32>,
    /// Wall-clock duration of the run.
    pub duration: std::time::Duration,
    /// Path to the combined output log.
    pub log_file: PathBuf,
}

impl KpiResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug)]
pub enum KpiError {
    /// Failed to create the benchmark log file.
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to spawn the benchmark subprocess.
    Spawn { source: std::io::Error },
    /// Failed waiting for the benchmark to finish.
    Io { source: std::io::Error },
}

impl std::fmt::Display for KpiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KpiError::LogFile { path, source } => {
                write!(
                    f,
                    "failed to create benchmark log file {}: {}",
                    path.display(),
                    source
                )
            }
            KpiError::Spawn { source } => {
                write!(f, "failed to spawn benchmark subprocess: {}", source)
            }
            KpiError::Io { source } => write!(f, "I/O error during benchmark run: {}", source),
        }
    }
}

impl std::error::Error for KpiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KpiError::LogFile { source, .. }
            | KpiError::Spawn { source }
            | KpiError::Io { source } => Some(source),
        }
    }
}

fn bool_flag(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// The benchmark command line: program plus argument vector, run from
/// the project root.
pub fn build_command(kpi: &KpiConfig, paths: &PathsConfig, outdir: &Path) -> (String, Vec<String>) {
    let kpi_root = paths.base.join("kpi");
    let runner_script = kpi_root.join("chipstack_kpi/app/unit_test_kpi_run.py");
    let design_file = kpi_root.join(format!("chipstack_kpi/configs/{}.yaml", kpi.design_set));

    let args = vec![
        runner_script.display().to_string(),
        "--design_file".to_string(),
        design_file.display().to_string(),
        "--server_url".to_string(),
        kpi.server_url.clone(),
        "--eda_url".to_string(),
        kpi.eda_url.clone(),
        "--llm_flow".to_string(),
        kpi.llm_flow.clone(),
        "--syntax_check_provider".to_string(),
        kpi.syntax_check_provider.clone(),
        "--output_dir".to_string(),
        outdir.join("outdir_kpi").display().to_string(),
        "--enable_project_support".to_string(),
        bool_flag(kpi.enable_project_support).to_string(),
        "--use_primitives".to_string(),
        bool_flag(kpi.use_primitives).to_string(),
        "--iterate_simulation_results".to_string(),
        bool_flag(kpi.iterate_simulation_results).to_string(),
        "--num_random_restarts".to_string(),
        kpi.num_random_restarts.to_string(),
        "--run_type".to_string(),
        kpi.run_type.clone(),
    ];
    (kpi.python_bin.clone(), args)
}

/// PYTHONPATH entries the benchmark runner expects, prepended to any
/// inherited value.
pub fn python_path(paths: &PathsConfig) -> String {
    let mut entries = vec![
        paths.base.join("common").display().to_string(),
        paths.base.join("client").display().to_string(),
        paths.base.join("kpi").display().to_string(),
    ];
    if let Ok(existing) = std::env::var("PYTHONPATH") {
        entries.push(existing);
    }
    entries.join(":")
}

/// Run the benchmark to completion, redirecting its combined output to
/// `<outdir>/unit_test_kpi_run.log`.
pub async fn run_benchmark(
    kpi: &KpiConfig,
    paths: &PathsConfig,
    outdir: &Path,
) -> Result<KpiResult, KpiError> {
    let log_path = outdir.join("unit_test_kpi_run.log");
    let log_file = std::fs::File::create(&log_path).map_err(|e| KpiError::LogFile {
        path: log_path.clone(),
        source: e,
    })?;
    let log_file_stderr = log_file.try_clone().map_err(|e| KpiError::LogFile {
        path: log_path.clone(),
        source: e,
    })?;

    let (program, args) = build_command(kpi, paths, outdir);
    tracing::info!(
        command = %program,
        design_set = %kpi.design_set,
        log = %log_path.display(),
        "starting KPI benchmark"
    );

    let start = Instant::now();
    let mut child = Command::new(&program)
        .args(&args)
        .env("PYTHONPATH", python_path(paths))
        .current_dir(&paths.base)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log_file))
        .stderr(Stdio::from(log_file_stderr))
        .spawn()
        .map_err(|e| KpiError::Spawn { source: e })?;

    let status = child.wait().await.map_err(|e| KpiError::Io { source: e })?;
    let duration = start.elapsed();

    let exit_code = status.code();
    tracing::info!(
        exit_code = ?exit_code,
        duration_secs = duration.as_secs(),
        "KPI benchmark completed"
    );

    Ok(KpiResult {
        exit_code,
        duration,
        log_file: log_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_paths(dir: &TempDir) -> PathsConfig {
        PathsConfig {
            base: dir.path().to_path_buf(),
            server: dir.path().to_path_buf(),
        }
    }

    #[test]
    fn command_carries_all_flags_in_order() {
        let dir = TempDir::new().unwrap();
        let kpi = KpiConfig::default();
        let (program, args) = build_command(&kpi, &test_paths(&dir), &dir.path().join("out"));

        assert_eq!(program, kpi.python_bin);
        assert!(args[0].ends_with("chipstack_kpi/app/unit_test_kpi_run.py"));

        let flags: Vec<(&str, &str)> = args[1..]
            .chunks(2)
            .map(|pair| (pair[0].as_str(), pair[1].as_str()))
            .collect();
        assert!(flags
            .iter()
            .any(|(k, v)| *k == "--design_file" && v.ends_with("dev_v3_mini.yaml")));
        assert!(flags.contains(&("--server_url", "http://localhost:8000/")));
        assert!(flags.contains(&("--syntax_check_provider", "verific")));
        assert!(flags.contains(&("--enable_project_support", "true")));
        assert!(flags.contains(&("--use_primitives", "false")));
        assert!(flags.contains(&("--num_random_restarts", "0")));
        assert!(flags.contains(&("--run_type", "Simulation")));
        assert!(flags
            .iter()
            .any(|(k, v)| *k == "--output_dir" && v.ends_with("out/outdir_kpi")));
    }

    #[test]
    fn python_path_prepends_project_trees() {
        let dir = TempDir::new().unwrap();
        let value = python_path(&test_paths(&dir));
        let base = dir.path().display().to_string();
        assert!(value.starts_with(&format!("{base}/common:{base}/client:{base}/kpi")));
    }

    #[tokio::test]
    async fn benchmark_output_lands_in_log_file() {
        let dir = TempDir::new().unwrap();
        let outdir = dir.path().join("out");
        std::fs::create_dir(&outdir).unwrap();

        // `echo` stands in for the python runner: it exits 0 and writes
        // its argument vector to stdout.
        let kpi = KpiConfig {
            python_bin: "echo".to_string(),
            ..KpiConfig::default()
        };
        let result = run_benchmark(&kpi, &test_paths(&dir), &outdir).await.unwrap();

        assert!(result.success());
        let contents = std::fs::read_to_string(&result.log_file).unwrap();
        assert!(contents.contains("--run_type Simulation"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_not_raised() {
        let dir = TempDir::new().unwrap();
        let outdir = dir.path().join("out");
        std::fs::create_dir(&outdir).unwrap();

        let kpi = KpiConfig {
            python_bin: "false".to_string(),
            ..KpiConfig::default()
        };
        let result = run_benchmark(&kpi, &test_paths(&dir), &outdir).await.unwrap();
        assert!(!result.success());
        assert_eq!(result.exit_code, Some(1));
    }

    #[tokio::test]
    async fn spawn_failure_is_an_error() {
        let dir = TempDir::new().unwrap();
        let outdir = dir.path().join("out");
        std::fs::create_dir(&outdir).unwrap();

        let kpi = KpiConfig {
            python_bin: "nonexistent-python-xyz".to_string(),
            ..KpiConfig::default()
        };
        let err = run_benchmark(&kpi, &test_paths(&dir), &outdir)
            .await
            .unwrap_err();
        assert!(matches!(err, KpiError::Spawn { .. }));
    }

    #[tokio::test]
    async fn missing_outdir_is_a_logfile_error() {
        let dir = TempDir::new().unwrap();
        let kpi = KpiConfig::default();
        let err = run_benchmark(&kpi, &test_paths(&dir), &dir.path().join("absent"))
            .await
            .unwrap_err();
        assert!(matches!(err, KpiError::LogFile { .. }));
    }
}
