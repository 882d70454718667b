mod auth;
mod config;
mod csvfile;
mod kpi;
mod logfile;
mod monitor;
mod orchestrate;
mod report;
mod reset;
mod runner;
mod store;
mod streamer;
mod workspace;

use clap::{Parser, Subcommand};
use config::RegressConfig;
use std::path::PathBuf;
use std::time::Duration;

/// CI ops runner for the regression environment: reset the git/docker
/// stack, watch the service come up, run the KPI benchmark, convert the
/// result artifacts to HTML, and record metrics.
#[derive(Parser, Debug)]
#[command(name = "regress-ops", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "regress.toml")]
    config: PathBuf,

    /// Extra logging (poll decisions, subprocess output)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Full run: reset the environment, wait for startup, run the
    /// benchmark, publish logs
    Run {
        /// Branch to check out (overrides config and TARGET_BRANCH)
        #[arg(long)]
        target_branch: Option<String>,

        /// Design set name (overrides config and DESIGN_SET)
        #[arg(long)]
        design_set: Option<String>,

        /// Validate config and print resolved settings, don't run
        #[arg(long)]
        dry_run: bool,
    },

    /// Reset the environment only: git sync plus docker restart
    Reset {
        /// Branch to check out (overrides config and TARGET_BRANCH)
        #[arg(long)]
        target_branch: Option<String>,

        /// Directory for git_docker.log (default: current directory)
        #[arg(long)]
        outdir: Option<PathBuf>,
    },

    /// Stream a container's logs to a file until interrupted
    Watch {
        /// Container name (overrides config)
        #[arg(long)]
        container: Option<String>,

        /// Directory for docker_log_streamer.log (default: current directory)
        #[arg(long)]
        outdir: Option<PathBuf>,

        /// Only stream entries after this RFC 3339 timestamp
        #[arg(long)]
        since: Option<String>,
    },

    /// Convert result artifacts to standalone HTML pages
    Report {
        #[command(subcommand)]
        format: ReportFormat,
    },

    /// Metrics store operations
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
}

#[derive(Subcommand, Debug)]
enum ReportFormat {
    /// CSV to a styled table with a computed summary row
    Csv {
        /// Input CSV file; output lands next to it as <stem>_table.html
        input: PathBuf,
    },

    /// JSON to a highlighted page
    Json {
        /// Input JSON file; output lands next to it as <stem>.html
        input: PathBuf,

        /// Page title (default: the file name)
        #[arg(long)]
        title: Option<String>,

        /// Highlight theme name
        #[arg(long)]
        theme: Option<String>,
    },

    /// Source file (SystemVerilog and friends) to a highlighted page
    Code {
        /// Input source file
        input: PathBuf,

        /// Output path (default: input with an .html extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Highlight theme name
        #[arg(long)]
        theme: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum DbAction {
    /// Load a results CSV into the store with run metadata attached
    Insert {
        /// Results CSV file
        csv: PathBuf,

        /// Branch the run was built from
        #[arg(long)]
        branch: Option<String>,

        /// Run type label (e.g. Simulation)
        #[arg(long)]
        run_type: Option<String>,

        /// Commit id the run was built from
        #[arg(long, default_value = "unknown")]
        commit: String,
    },

    /// Print every stored document as one aligned table
    Dump,

    /// Per-design document counts and mean metrics
    Plot,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let mut config = match RegressConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "could not load configuration");
            std::process::exit(1);
        }
    };
    config.apply_env();

    let code = dispatch(cli.command, config).await;
    std::process::exit(code);
}

async fn dispatch(command: Command, mut config: RegressConfig) -> i32 {
    match command {
        Command::Run {
            target_branch,
            design_set,
            dry_run,
        } => {
            if let Some(branch) = target_branch {
                config.git.target_branch = branch;
            }
            if let Some(design_set) = design_set {
                config.kpi.design_set = design_set;
            }
            if dry_run {
                println!("regress-ops v{}", env!("CARGO_PKG_VERSION"));
                println!("Target branch: {}", config.git.target_branch);
                println!("Design set:    {}", config.kpi.design_set);
                println!("Container:     {}", config.container.name);
                println!("Base path:     {}", config.paths.base.display());
                println!("Server path:   {}", config.paths.server.display());
                println!("Dry run mode — config validated, not running.");
                return 0;
            }
            orchestrate::run(&config).await
        }

        Command::Reset {
            target_branch,
            outdir,
        } => {
            if let Some(branch) = target_branch {
                config.git.target_branch = branch;
            }
            let outdir = outdir.unwrap_or_else(|| PathBuf::from("."));
            run_reset(&config, &outdir).await
        }

        Command::Watch {
            container,
            outdir,
            since,
        } => {
            let container = container.unwrap_or(config.container.name);
            let outdir = outdir.unwrap_or_else(|| PathBuf::from("."));
            let since = since.or(config.watcher.start_time);
            run_watch(&container, &outdir, since, config.watcher.check_interval_secs).await
        }

        Command::Report { format } => run_report(format),

        Command::Db { action } => run_db(action, &config),
    }
}

async fn run_reset(config: &RegressConfig, outdir: &std::path::Path) -> i32 {
    let orchestrator = match reset::ResetOrchestrator::new(
        &config.paths,
        &config.registry,
        config.git.target_branch.clone(),
        outdir,
    ) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            tracing::error!(error = %e, "reset setup failed");
            return 1;
        }
    };

    let git_ok = orchestrator.run_git_phase().await;
    let docker_ok = if git_ok {
        orchestrator.run_docker_phase().await
    } else {
        false
    };

    if git_ok && docker_ok {
        println!("Result: PASS");
        0
    } else {
        println!("Result: FAIL");
        1
    }
}

async fn run_watch(
    container: &str,
    outdir: &std::path::Path,
    since: Option<String>,
    check_interval_secs: u64,
) -> i32 {
    let mut streamer = streamer::LogStreamer::new(
        container,
        outdir,
        since,
        Duration::from_secs(check_interval_secs),
    );
    if let Err(e) = streamer.start() {
        tracing::error!(error = %e, "could not start log streaming");
        return 1;
    }
    println!("Streaming {} to {}", container, streamer.log_path().display());
    println!("Press Ctrl-C to stop.");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "could not wait for interrupt");
    }
    streamer.stop().await;
    0
}

fn run_report(format: ReportFormat) -> i32 {
    let result = match format {
        ReportFormat::Csv { input } => report::csv::convert(&input),
        ReportFormat::Json {
            input,
            title,
            theme,
        } => report::json::convert(&input, title.as_deref(), theme.as_deref()),
        ReportFormat::Code {
            input,
            output,
            theme,
        } => report::code::convert(&input, output.as_deref(), theme.as_deref()),
    };
    match result {
        Ok(output) => {
            println!("Wrote {}", output.display());
            0
        }
        Err(e) => {
            tracing::error!(error = %e, "report conversion failed");
            1
        }
    }
}

fn run_db(action: DbAction, config: &RegressConfig) -> i32 {
    let conn = match store::open_or_create(&config.store.db_path) {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(
                db = %config.store.db_path.display(),
                error = %e,
                "could not open metrics store"
            );
            return 1;
        }
    };

    let result = match action {
        DbAction::Insert {
            csv,
            branch,
            run_type,
            commit,
        } => {
            let branch = branch.unwrap_or_else(|| config.git.target_branch.clone());
            let run_type = run_type.unwrap_or_else(|| config.kpi.run_type.clone());
            store::insert_csv(&conn, &csv, &branch, &run_type, &commit)
                .map(|count| format!("Inserted {count} document(s)."))
        }
        DbAction::Dump => store::dump(&conn),
        DbAction::Plot => store::plot(&conn),
    };

    match result {
        Ok(text) => {
            println!("{text}");
            0
        }
        Err(e) => {
            tracing::error!(error = %e, "metrics store operation failed");
            1
        }
    }
}
