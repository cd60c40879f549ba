//! # dexuse CLI
//!
//! Inspect and drive secondary dex usage tracking outside a platform service.
//! Installed packages come from a JSON package database; artifacts are
//! cleaned up on the local file system; compilation runs a configured command.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dexuse_config::logging::{init_logging, LogLevel};
use dexuse_config::{log_cli_info, Config};
use dexuse_index::{UserId, USER_ALL};
use dexuse_manager::{CompileReason, CompilerTarget, PackageAuthority};

mod authority;
mod helper;
mod maintain;
mod optimizer;
mod session;

use session::Session;

/// Secondary dex ownership and usage tracking
#[derive(Parser)]
#[command(name = "dexuse")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Usage ledger file (overrides config)
    #[arg(long, global = true, env = "DEXUSE_LEDGER")]
    ledger: Option<PathBuf>,

    /// Installed package database (overrides config)
    #[arg(long, global = true, env = "DEXUSE_PACKAGES")]
    packages: Option<PathBuf>,

    /// More output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show recorded dex usage
    Show {
        /// Only this package
        #[arg(value_name = "PKG")]
        package: Option<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List packages with secondary dex files
    Packages,

    /// Report that a package loaded dex files
    Load {
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<String>,

        /// Loading package
        #[arg(long)]
        loader: String,

        #[arg(long)]
        isa: String,

        #[arg(long, default_value_t = 0)]
        user: UserId,
    },

    /// Register a dex module for a package and compile it
    Register {
        #[arg(value_name = "PATH")]
        path: String,

        #[arg(long)]
        package: String,

        #[arg(long, default_value_t = 0)]
        user: UserId,

        /// The module is loaded by other packages
        #[arg(long)]
        shared: bool,
    },

    /// Drop records of secondary dex files that no longer exist
    Reconcile {
        #[arg(value_name = "PKG")]
        package: String,
    },

    /// Compile a package's secondary dex files
    Optimize {
        #[arg(value_name = "PKG")]
        package: String,

        /// Compile reason (first-boot, boot, install, bg-dexopt, ab-ota, inactive, shared)
        #[arg(long, conflicts_with = "filter")]
        reason: Option<CompileReason>,

        /// Explicit compiler filter
        #[arg(long)]
        filter: Option<String>,

        #[arg(long)]
        force: bool,

        /// Only files loaded by other packages
        #[arg(long)]
        shared_only: bool,
    },

    /// Forget usage of a package (all users unless --user is given)
    Forget {
        #[arg(value_name = "PKG")]
        package: String,

        #[arg(long)]
        user: Option<UserId>,
    },

    /// Reconcile and compile every package periodically
    Maintain {
        /// Seconds between passes (default from config)
        #[arg(long)]
        interval: Option<u64>,

        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
    },

    /// Configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Print config file locations
    Path,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(LogLevel::from_verbosity(cli.verbose));

    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(ledger) = &cli.ledger {
        config.storage.ledger_path = ledger.clone();
    }
    if let Some(packages) = &cli.packages {
        config.packages.database = packages.clone();
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(async_main(cli.command, config))
}

async fn async_main(command: Commands, config: Config) -> Result<()> {
    if let Commands::Config { command } = command {
        return cmd_config(command, &config);
    }

    let session = Session::open(&config)?;
    let manager = &session.manager;

    match command {
        Commands::Show { package, json } => cmd_show(&session, package.as_deref(), json)?,

        Commands::Packages => {
            for package in manager.packages_with_secondary_dex() {
                println!("{package}");
            }
        }

        Commands::Load {
            paths,
            loader,
            isa,
            user,
        } => {
            let info = session
                .authority
                .installed_package(&loader, user)?
                .with_context(|| format!("{loader} is not installed for user {user}"))?;
            manager.notify_dex_load(&info, &paths, &isa, user);
            manager.flush();
            log_cli_info!("Load recorded", loader = loader.as_str(), paths = paths.len());
        }

        Commands::Register {
            path,
            package,
            user,
            shared,
        } => {
            let info = session
                .authority
                .installed_package(&package, user)?
                .with_context(|| format!("{package} is not installed for user {user}"))?;
            let result = manager.register_dex_module(&info, &path, shared, user);
            manager.flush();
            if !result.success {
                anyhow::bail!("{}", result.message);
            }
            println!("{}", result.message);
        }

        Commands::Reconcile { package } => {
            let report = manager.reconcile_secondary_dex_files(&package);
            manager.flush();
            println!(
                "{package}: examined {}, removed {}",
                report.examined, report.removed
            );
        }

        Commands::Optimize {
            package,
            reason,
            filter,
            force,
            shared_only,
        } => {
            let target = match filter {
                Some(filter) => CompilerTarget::Filter(filter),
                None => CompilerTarget::Reason(reason.unwrap_or(CompileReason::BgDexopt)),
            };
            let ok = manager.dexopt_secondary_dex(&package, &target, force, shared_only);
            manager.flush();
            if !ok {
                anyhow::bail!("Failed to optimize secondary dex files of {package}");
            }
            let filter = manager.settings().resolve_filter(&target);
            println!("{package}: optimized with {filter}");
        }

        Commands::Forget { package, user } => {
            manager.notify_package_data_destroyed(&package, user.unwrap_or(USER_ALL));
            manager.flush();
        }

        Commands::Maintain { interval, once } => {
            let secs = interval.unwrap_or(config.maintenance.interval_secs).max(1);
            maintain::run(&session, Duration::from_secs(secs), once).await?;
        }

        Commands::Config { .. } => unreachable!("handled above"),
    }

    Ok(())
}

fn cmd_show(session: &Session, package: Option<&str>, json: bool) -> Result<()> {
    let snapshot = session.manager.store().ledger().snapshot();

    if let Some(package) = package {
        let usage = snapshot
            .get(package)
            .with_context(|| format!("No usage recorded for {package}"))?;
        if json {
            println!("{}", serde_json::to_string_pretty(usage)?);
            return Ok(());
        }
        println!("{package}");
        for (path, record) in usage.dex_files() {
            let isas: Vec<&str> = record.loader_isas.iter().map(String::as_str).collect();
            let kind = if record.primary_or_split {
                " (primary/split)"
            } else {
                ""
            };
            println!(
                "  {path}  user={} isa={} shared={}{kind}",
                record.owner_user_id,
                isas.join(","),
                record.used_by_other_apps,
            );
        }
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }
    println!(
        "Ledger: {} ({} package(s), {} record(s))",
        session.manager.store().path().display(),
        snapshot.len(),
        snapshot.record_count()
    );
    for (name, usage) in &snapshot.packages {
        let shared = if usage.is_used_by_other_apps() {
            ", used by other apps"
        } else {
            ""
        };
        println!("  {name}: {} dex file(s){shared}", usage.len());
    }
    Ok(())
}

fn cmd_config(command: ConfigCommands, config: &Config) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            print!("{}", toml::to_string_pretty(config)?);
        }
        ConfigCommands::Path => {
            match Config::global_config_path() {
                Some(p) => println!("Global:  {}", p.display()),
                None => println!("Global:  (no home directory)"),
            }
            println!("Project: {}", Config::project_config_path().display());
            println!("Ledger:  {}", config.storage.resolved_ledger_path().display());
        }
    }
    Ok(())
}
