use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use olivetum_supervisor::config::{Backend, ConfigForm, ConfigStore, Mode, WorkerConfig};
use olivetum_supervisor::daemon::Daemon;
use olivetum_supervisor::devices::{list_devices, resolve_backend};
use olivetum_supervisor::pool_url::build_pool_url;
use olivetum_supervisor::supervisor::{allocate_api_port, build_args, SupervisorSettings};
use olivetum_supervisor::tracing::{self as logging, prelude::*};

/// Miner executable looked up next to this binary, then on PATH.
const MINER_NAME: &str = if cfg!(windows) { "ethminer.exe" } else { "ethminer" };

/// Supervise an Olivetumhash GPU miner
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Miner executable
    #[arg(long, env = "OLIVETUM_MINER", global = true)]
    miner: Option<PathBuf>,

    /// Config file (default: <user config dir>/olivetum-miner-gui/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Save the configuration and run the miner until interrupted
    Run(Overrides),

    /// List the GPUs the miner can see
    Devices {
        /// Backend to query
        #[arg(long, default_value = "auto")]
        backend: Backend,
    },

    /// Validate the configuration and print the miner command line
    Check(Overrides),

    /// Show or edit the saved configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the config path and contents
    Show,

    /// Update fields, keeping previous values for unusable input
    Set(Overrides),
}

/// Field overrides on top of the saved configuration.
#[derive(Args, Debug)]
struct Overrides {
    /// stratum, rpc-local or rpc-gateway
    #[arg(long)]
    mode: Option<Mode>,

    /// auto, cuda or opencl
    #[arg(long)]
    backend: Option<Backend>,

    #[arg(long)]
    stratum_host: Option<String>,

    #[arg(long)]
    stratum_port: Option<String>,

    #[arg(long)]
    rpc_url: Option<String>,

    /// 0x-prefixed wallet address
    #[arg(long)]
    wallet: Option<String>,

    /// Worker label (empty for none)
    #[arg(long)]
    worker: Option<String>,

    /// Comma-separated device indices; empty selects all
    #[arg(long, value_delimiter = ',', num_args = 0..)]
    devices: Option<Vec<u32>>,

    /// Report the hash rate to the pool (stratum only)
    #[arg(long)]
    report_hashrate: Option<bool>,

    /// Seconds between the miner's own status lines (1..1800)
    #[arg(long)]
    display_interval: Option<String>,
}

impl Overrides {
    fn form(&self, current: &WorkerConfig) -> ConfigForm {
        let mut form = ConfigForm::from(current);
        if let Some(mode) = self.mode {
            form.mode = mode;
        }
        if let Some(backend) = self.backend {
            form.backend = backend;
        }
        set(&mut form.stratum_host, &self.stratum_host);
        set(&mut form.stratum_port, &self.stratum_port);
        set(&mut form.rpc_url, &self.rpc_url);
        set(&mut form.wallet_address, &self.wallet);
        set(&mut form.worker_name, &self.worker);
        set(&mut form.display_interval, &self.display_interval);
        if let Some(devices) = &self.devices {
            form.selected_devices = devices.clone();
        }
        if let Some(report) = self.report_hashrate {
            form.report_hashrate = report;
        }
        form
    }
}

fn set(field: &mut String, value: &Option<String>) {
    if let Some(value) = value {
        field.clone_from(value);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_journald_or_stdout();

    let store = match &cli.config {
        Some(path) => ConfigStore::new(path),
        None => ConfigStore::open_default()?,
    };

    match cli.command {
        Command::Run(overrides) => {
            let miner = miner_path(cli.miner)?;
            let config = save_strict(&store, &overrides)?;
            Daemon::new(SupervisorSettings::from_env(miner), config).run().await
        }

        Command::Devices { backend } => {
            let miner = miner_path(cli.miner)?;
            let backend = resolve_backend(&miner, backend).await;
            let devices = list_devices(&miner, backend).await?;
            if devices.is_empty() {
                println!("No {} devices found", backend);
            }
            for device in devices {
                println!("{:>3}  {:<10} {}", device.index, device.pci_id, device.name);
            }
            Ok(())
        }

        Command::Check(overrides) => {
            let current = store.load()?;
            let config = overrides.form(&current).apply(&current)?;
            let pool_url = build_pool_url(&config)?;
            let backend = match miner_path(cli.miner) {
                Ok(miner) => resolve_backend(&miner, config.backend).await,
                Err(e) => {
                    warn!("{:#}; assuming OpenCL", e);
                    Backend::OpenCl
                }
            };
            let port = allocate_api_port(IpAddr::V4(Ipv4Addr::LOCALHOST)).await?;
            println!("pool: {}", pool_url);
            println!("args: {}", build_args(&config, backend, &pool_url, port).join(" "));
            Ok(())
        }

        Command::Config(ConfigCommand::Show) => {
            let config = store.load()?;
            println!("# {}", store.path().display());
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }

        Command::Config(ConfigCommand::Set(overrides)) => {
            let current = store.load()?;
            let config = overrides.form(&current).apply_draft(&current);
            store.save(&config)?;
            info!(path = %store.path().display(), "Config saved");
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Validate the overridden config and persist it.
fn save_strict(store: &ConfigStore, overrides: &Overrides) -> Result<WorkerConfig> {
    let current = store.load()?;
    let config = overrides
        .form(&current)
        .apply(&current)
        .context("Refusing to start with an invalid configuration")?;
    store.save(&config)?;
    Ok(config)
}

fn miner_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => find_miner(),
    }
}

fn find_miner() -> Result<PathBuf> {
    let beside_us = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(MINER_NAME)));
    let on_path = env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).map(|dir| dir.join(MINER_NAME)).collect::<Vec<_>>())
        .unwrap_or_default();

    match beside_us.into_iter().chain(on_path).find(|p| is_file(p)) {
        Some(path) => {
            debug!(path = %path.display(), "Found miner");
            Ok(path)
        }
        None => bail!("{} not found; pass --miner or set OLIVETUM_MINER", MINER_NAME),
    }
}

fn is_file(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file()).unwrap_or(false)
}
