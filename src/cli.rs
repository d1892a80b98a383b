use crate::config::loader::SnekboxConfig;
use crate::exec::dispatcher::{Dispatcher, DEFAULT_WORKERS};
use crate::exec::engine::Snekbox;
use crate::kernel::cgroup::{missing_cgroup_parents, prepare_cgroup_parents};
use crate::kernel::signal::SignalHandler;
use crate::protocol::SnekRequest;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Parser)]
#[command(author, version, about = "Run untrusted Python code inside nsjail", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// nsjail binary (overrides config and SNEKBOX_NSJAIL)
    #[arg(long, global = true, value_name = "PATH")]
    nsjail: Option<PathBuf>,
    /// Python binary inside the sandbox (overrides config and SNEKBOX_PYTHON)
    #[arg(long, global = true, value_name = "PATH")]
    python: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one snippet and print the JSON result
    Execute {
        /// Source code as string
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        code: Option<String>,
        /// Read source code from a file
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Read JSON requests from stdin, write JSON responses to stdout
    Serve {
        /// Concurrent executions
        #[arg(long, default_value_t = DEFAULT_WORKERS)]
        workers: usize,
    },
    /// Create the cgroup parent groups nsjail expects
    InitCgroups,
    /// Check that nsjail, python and the cgroup parents are available
    CheckDeps {
        /// Verbose output showing detailed version information
        #[arg(long)]
        verbose: bool,
    },
}

pub fn run() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Execute { code, file } => {
            let code = match (code, file) {
                (Some(code), _) => code,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (None, None) => anyhow::bail!("either --code or --file is required"),
            };
            execute(config, code)
        }
        Commands::Serve { workers } => serve(config, workers),
        Commands::InitCgroups => {
            let created = prepare_cgroup_parents(&config.profile.cgroup)?;
            if created.is_empty() {
                println!("✅ cgroup parents already present");
            }
            for dir in created {
                println!("✅ created {}", dir.display());
            }
            Ok(())
        }
        Commands::CheckDeps { verbose } => check_dependencies(&config, verbose),
    }
}

fn load_config(cli: &Cli) -> Result<SnekboxConfig> {
    let mut config = SnekboxConfig::load(cli.config.as_deref())?;
    if let Some(nsjail) = &cli.nsjail {
        config.nsjail_binary = nsjail.clone();
    }
    if let Some(python) = &cli.python {
        config.python_binary = python.clone();
    }
    Ok(config)
}

fn execute(config: SnekboxConfig, code: String) -> Result<()> {
    let engine = Snekbox::new(config)?;
    let request = SnekRequest {
        id: uuid::Uuid::new_v4().to_string(),
        code,
    };

    let response = engine.handle(&request);
    println!("{}", response.to_json()?);

    if !response.classification.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn serve(config: SnekboxConfig, workers: usize) -> Result<()> {
    let signals = SignalHandler::init().map_err(anyhow::Error::msg)?;

    // Without the parents every run ends as an unknown error; keep serving.
    if let Err(e) = prepare_cgroup_parents(&config.profile.cgroup) {
        log::warn!("{}", e);
    }

    let engine = Snekbox::new(config)?;
    let profile = engine.profile();
    log::info!(
        "Sandbox limits: {:?} wall time, {} bytes memory, {} processes",
        profile.wall_time_limit(),
        profile.memory_limit,
        profile.process_limit
    );

    let dispatcher = Dispatcher::new(engine, workers)?;
    log::info!("Serving with {} workers", dispatcher.workers());

    let summary = dispatcher.serve(BufReader::new(io::stdin()), io::stdout(), || {
        signals.shutdown_requested()
    })?;

    if let Some(name) = signals.signal_name() {
        log::info!("Shut down after {} ({} requests answered)", name, summary.responded);
    }
    Ok(())
}

/// Run `binary arg` and return the first line it printed.
fn query_version(binary: &Path, arg: &str) -> std::result::Result<String, String> {
    match Command::new(binary).arg(arg).output() {
        Ok(output) => {
            let text = if !output.stdout.is_empty() {
                String::from_utf8_lossy(&output.stdout)
            } else {
                String::from_utf8_lossy(&output.stderr)
            };
            Ok(text.lines().next().unwrap_or("").trim().to_string())
        }
        Err(e) => Err(e.to_string()),
    }
}

fn check_dependencies(config: &SnekboxConfig, verbose: bool) -> Result<()> {
    println!("🔍 Checking snekbox dependencies...");
    println!();

    let mut missing = Vec::new();

    // nsjail prints usage and exits non-zero for --help; being able to
    // start it is what matters.
    let binaries = [
        ("nsjail", &config.nsjail_binary, "--help"),
        ("python", &config.python_binary, "--version"),
    ];
    for (name, binary, arg) in binaries {
        match query_version(binary, arg) {
            Ok(info) => {
                println!("✅ {} - OK", name);
                if verbose {
                    println!("  {} -> {}", binary.display(), info);
                }
            }
            Err(e) => {
                println!("❌ {} - MISSING", name);
                if verbose {
                    println!("  {} -> {}", binary.display(), e);
                }
                missing.push(name.to_string());
            }
        }
    }

    let absent = missing_cgroup_parents(&config.profile.cgroup);
    if absent.is_empty() {
        println!("✅ cgroup parents - OK");
    } else {
        println!("❌ cgroup parents - MISSING");
        missing.push("cgroup parents".to_string());
    }
    if verbose {
        for dir in config.profile.cgroup.parent_dirs() {
            let state = if absent.contains(&dir) { "absent" } else { "present" };
            println!("  {} -> {}", dir.display(), state);
        }
    }

    println!();

    if missing.is_empty() {
        println!("✅ snekbox is ready to use");
        if verbose {
            println!();
            println!("💡 Usage example:");
            println!("  snekbox execute --code='print(\"Hello World\")'");
        }
        Ok(())
    } else {
        println!("❌ Missing dependencies: {}", missing.join(", "));
        if !absent.is_empty() {
            println!("🔧 Create the cgroup parents with: snekbox init-cgroups");
        }
        std::process::exit(1);
    }
}
