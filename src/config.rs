use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration loaded from regress.toml.
///
/// Every value has a default carrying the reference literals, so a
/// missing config file means "run with the tuned production settings".
/// `TARGET_BRANCH` and `DESIGN_SET` environment variables override the
/// file (CI passes them per build); CLI flags override both.
#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct RegressConfig {
    pub paths: PathsConfig,
    pub container: ContainerConfig,
    pub git: GitConfig,
    pub monitor: MonitorConfig,
    pub watcher: WatcherConfig,
    pub grace: GraceConfig,
    pub kpi: KpiConfig,
    pub registry: RegistryConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the application checkout the reset phase syncs.
    pub base: PathBuf,
    /// Directory holding the docker-compose Makefile.
    pub server: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub target_branch: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Startup banner the monitored service prints when ready.
    pub target_message: String,
    pub window_mins: u64,
    pub poll_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub check_interval_secs: u64,
    /// Optional `--since` cursor for the log stream (RFC 3339).
    pub start_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraceConfig {
    /// Post-reset polling cadence.
    pub tick_secs: u64,
    /// Number of ticks before giving up on startup detection.
    pub max_checks: u32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct KpiConfig {
    pub python_bin: String,
    pub design_set: String,
    pub server_url: String,
    pub eda_url: String,
    pub llm_flow: String,
    pub syntax_check_provider: String,
    pub enable_project_support: bool,
    pub use_primitives: bool,
    pub iterate_simulation_results: bool,
    pub num_random_restarts: u32,
    pub run_type: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub url: String,
    pub key_file: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub db_path: PathBuf,
}

// --- Default implementations ---

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            base: PathBuf::from("/home/javad/dev/chipstack-ai"),
            server: PathBuf::from("/home/javad/dev/chipstack-ai/server"),
        }
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            name: "server-server-1".to_string(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            target_branch: "main".to_string(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            target_message: "Application startup complete.".to_string(),
            window_mins: 20,
            poll_secs: 5,
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 5,
            start_time: None,
        }
    }
}

impl Default for GraceConfig {
    fn default() -> Self {
        Self {
            tick_secs: 30,
            max_checks: 20,
        }
    }
}

impl Default for KpiConfig {
    fn default() -> Self {
        Self {
            python_bin: "/home/javad/.pyenv/shims/python".to_string(),
            design_set: "dev_v3_mini".to_string(),
            server_url: "http://localhost:8000/".to_string(),
            eda_url: "https://eda.chipstack.ai/".to_string(),
            llm_flow: "default".to_string(),
            syntax_check_provider: "verific".to_string(),
            enable_project_support: true,
            use_primitives: false,
            iterate_simulation_results: false,
            num_random_restarts: 0,
            run_type: "Simulation".to_string(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: "https://us-west1-docker.pkg.dev".to_string(),
            key_file: PathBuf::from("keys/service-account-key-kpi.json"),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("kpi_metrics.db"),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl RegressConfig {
    /// Load configuration from a TOML file. A missing file is not an
    /// error: defaults apply.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Apply the per-build environment overrides CI passes down.
    pub fn apply_env(&mut self) {
        if let Ok(branch) = std::env::var("TARGET_BRANCH") {
            if !branch.trim().is_empty() {
                self.git.target_branch = branch.trim().to_string();
            }
        }
        if let Ok(design_set) = std::env::var("DESIGN_SET") {
            if !design_set.trim().is_empty() {
                self.kpi.design_set = design_set.trim().to_string();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_carry_reference_literals() {
        let config = RegressConfig::default();
        assert_eq!(config.container.name, "server-server-1");
        assert_eq!(
            config.monitor.target_message,
            "Application startup complete."
        );
        assert_eq!(config.monitor.window_mins, 20);
        assert_eq!(config.monitor.poll_secs, 5);
        assert_eq!(config.grace.tick_secs, 30);
        assert_eq!(config.grace.max_checks, 20);
        assert_eq!(config.git.target_branch, "main");
        assert_eq!(config.kpi.design_set, "dev_v3_mini");
        assert_eq!(config.kpi.run_type, "Simulation");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = RegressConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.monitor.window_mins, 20);
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("regress.toml");
        std::fs::write(
            &path,
            "[container]\nname = \"api-1\"\n\n[grace]\ntick_secs = 5\n",
        )
        .unwrap();

        let config = RegressConfig::load(&path).unwrap();
        assert_eq!(config.container.name, "api-1");
        assert_eq!(config.grace.tick_secs, 5);
        // Untouched sections keep their defaults
        assert_eq!(config.grace.max_checks, 20);
        assert_eq!(config.monitor.poll_secs, 5);
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("regress.toml");
        std::fs::write(&path, "[container\nname = ").unwrap();

        let err = RegressConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("failed to parse"));
    }
}
