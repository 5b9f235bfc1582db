#![deny(unsafe_code)]

//! syncmate CLI: command-line control plane for the sync daemon.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use syncmate_config::AppConfig;
use syncmate_core::rest::Versioning;
use syncmate_core::{
    Dispatcher, NOTIFICATION_RESTART, NotificationCenter, ReadinessProber, ReqwestExecutor,
    RestApi, Section, SupervisorAction, SupervisorHandle,
};
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// syncmate: control plane for a peer-to-peer file synchronization daemon.
#[derive(Parser)]
#[command(name = "syncmate", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "syncmate.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Show daemon version, identity and resource usage.
    Status,

    /// List remote nodes.
    Nodes,

    /// List replicated repositories.
    Repos,

    /// Show per-connection traffic counters.
    Connections,

    /// Read a value from the Options or GUI section.
    Get { section: Section, key: String },

    /// Change a value in the Options or GUI section and push it to the daemon.
    Set {
        section: Section,
        key: String,
        value: String,

        /// Store VALUE as a list of space-separated tokens.
        #[arg(long, conflicts_with_all = ["as_bool", "as_int"])]
        array: bool,

        /// Store VALUE as a boolean.
        #[arg(long = "bool", conflicts_with = "as_int")]
        as_bool: bool,

        /// Store VALUE as an integer.
        #[arg(long = "int")]
        as_int: bool,

        /// Restart the daemon right away to apply the change.
        #[arg(long)]
        restart: bool,
    },

    /// Ask the daemon to restart.
    Restart,

    /// Ask the daemon to shut down.
    Shutdown,

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, from_file) = load_config(&cli.config).await?;

    let filter = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();
    if !from_file {
        info!(path = %cli.config.display(), "Config file not found, using defaults");
    }

    let output = run(cli.command, &config, &cli.config).await?;
    print!("{output}");
    Ok(())
}

/// Execute one subcommand and return what it prints.
async fn run(command: Commands, config: &AppConfig, config_path: &Path) -> Result<String> {
    let mut out = String::new();
    if let Commands::Config { show } = command {
        cmd_config(config, config_path, show, &mut out)?;
        return Ok(out);
    }

    let session = Session::connect(config).await?;
    match command {
        Commands::Status => session.status(&mut out).await?,
        Commands::Nodes => session.nodes(&mut out).await?,
        Commands::Repos => session.repos(&mut out).await?,
        Commands::Connections => session.connections(&mut out).await?,
        Commands::Get { section, key } => session.get(section, key, &mut out).await?,
        Commands::Set {
            section,
            key,
            value,
            array,
            as_bool,
            as_int,
            restart,
        } => {
            let value = parse_value(&value, as_bool, as_int)?;
            session
                .set(section, key, value, array, restart, &mut out)
                .await?
        }
        Commands::Restart => {
            session.on_dispatcher(|api| api.restart()).await?;
            writeln!(out, "Restart requested")?;
        }
        Commands::Shutdown => {
            session.on_dispatcher(|api| api.shutdown()).await?;
            writeln!(out, "Shutdown requested")?;
        }
        Commands::Config { .. } => {}
    }

    session.executor.wait_idle().await;
    Ok(out)
}

/// A bootstrapped connection to the daemon.
struct Session {
    dispatcher: Dispatcher,
    executor: Arc<ReqwestExecutor>,
    notifier: Arc<NotificationCenter>,
    api: Arc<RestApi>,
}

impl Session {
    /// Wait for the daemon, bootstrap, and wait for the API-available drain.
    async fn connect(config: &AppConfig) -> Result<Self> {
        let (dispatcher, dispatch_loop) = Dispatcher::new();
        tokio::spawn(dispatch_loop.run());

        let executor = Arc::new(ReqwestExecutor::from_config(
            dispatcher.clone(),
            &config.client,
        )?);
        let notifier = Arc::new(NotificationCenter::new());
        let api = RestApi::from_config(config, executor.clone(), notifier.clone());

        let prober = ReadinessProber::from_config(executor.clone(), config)
            .with_dispatcher(dispatcher.clone());
        prober.register(api.clone());

        let (ready_tx, ready_rx) = oneshot::channel();
        api.register_on_api_available_listener(move || {
            let _ = ready_tx.send(());
        });

        info!(url = %config.daemon.url, "Waiting for daemon");
        prober.wait_until_available().await?;
        ready_rx
            .await
            .context("REST API never became available")?;

        if let Some(report) = api.bootstrap_report() {
            for (step, reason) in &report.failed {
                warn!(%step, %reason, "Bootstrap step failed");
            }
        }

        Ok(Self {
            dispatcher,
            executor,
            notifier,
            api,
        })
    }

    /// Run `f` against the facade on the dispatcher.
    async fn on_dispatcher<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&RestApi) -> R + Send + 'static,
        R: Send + 'static,
    {
        let api = Arc::clone(&self.api);
        Ok(self.dispatcher.call(move || f(api.as_ref())).await?)
    }

    async fn status(&self, out: &mut String) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.on_dispatcher(move |api| {
            api.get_system_info(move |info| {
                let _ = tx.send(info);
            })
        })
        .await?;
        let info = rx.await?;

        writeln!(out, "URL:       {}", self.api.url())?;
        writeln!(
            out,
            "Version:   {}",
            self.api.version().as_deref().unwrap_or("unknown")
        )?;
        writeln!(
            out,
            "Node ID:   {}",
            self.api.local_node_id().as_deref().unwrap_or("unknown")
        )?;
        match info {
            Some(info) => {
                writeln!(
                    out,
                    "Memory:    {} allocated, {} from OS",
                    self.api.readable_file_size(saturating_i64(info.alloc)),
                    self.api.readable_file_size(saturating_i64(info.sys)),
                )?;
                writeln!(out, "CPU:       {:.2}%", info.cpu_percent)?;
                writeln!(out, "Tasks:     {}", info.goroutines)?;
                writeln!(
                    out,
                    "Announce:  {}",
                    if info.ext_announce_ok { "ok" } else { "failing" }
                )?;
            }
            None => writeln!(out, "System info unavailable")?,
        }
        Ok(())
    }

    async fn nodes(&self, out: &mut String) -> Result<()> {
        let nodes = self
            .on_dispatcher(|api| api.nodes())
            .await?
            .context("node list unavailable")?;
        for node in nodes {
            writeln!(
                out,
                "{}\t{}\t{}",
                node.name,
                node.node_id,
                node.addresses.as_deref().unwrap_or("-")
            )?;
        }
        Ok(())
    }

    async fn repos(&self, out: &mut String) -> Result<()> {
        let repos = self
            .on_dispatcher(|api| api.repositories())
            .await?
            .context("repository list unavailable")?;
        for repo in repos {
            let versioning = match repo.versioning {
                Versioning::None => "off".to_string(),
                Versioning::Simple { keep } => format!("simple, keep {keep}"),
            };
            let mode = if repo.read_only { "ro" } else { "rw" };
            let peers: Vec<_> = repo.nodes.iter().map(|n| n.node_id.as_str()).collect();
            writeln!(
                out,
                "{}\t{}\t{mode}\tversioning: {versioning}\tshared with: {}",
                repo.id,
                repo.directory,
                if peers.is_empty() {
                    "-".to_string()
                } else {
                    peers.join(", ")
                },
            )?;
            if let Some(invalid) = repo.invalid {
                writeln!(out, "\tinvalid: {invalid}")?;
            }
        }
        Ok(())
    }

    async fn connections(&self, out: &mut String) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.on_dispatcher(move |api| {
            api.get_connections(move |connections| {
                let _ = tx.send(connections);
            })
        })
        .await?;
        let connections = rx.await?.context("connections unavailable")?;

        let mut keys: Vec<_> = connections.keys().cloned().collect();
        keys.sort();
        for key in keys {
            let c = &connections[&key];
            writeln!(
                out,
                "{key}\tin {}\tout {}\t{}",
                self.api.readable_file_size(saturating_i64(c.in_bytes_total)),
                self.api.readable_file_size(saturating_i64(c.out_bytes_total)),
                if c.address.is_empty() { "-" } else { c.address.as_str() },
            )?;
        }
        Ok(())
    }

    async fn get(&self, section: Section, key: String, out: &mut String) -> Result<()> {
        let lookup = key.clone();
        let value = self
            .on_dispatcher(move |api| api.get_value(section, &lookup))
            .await?
            .with_context(|| format!("{section}.{key} is unavailable"))?;
        writeln!(out, "{value}")?;
        Ok(())
    }

    async fn set(
        &self,
        section: Section,
        key: String,
        value: Value,
        array: bool,
        restart: bool,
        out: &mut String,
    ) -> Result<()> {
        let target = key.clone();
        self.on_dispatcher(move |api| api.set_value(section, &target, value, array))
            .await??;
        writeln!(out, "Updated {section}.{key}")?;

        if restart {
            let (supervisor, mut actions) = SupervisorHandle::new();
            if self.notifier.activate(NOTIFICATION_RESTART, &supervisor) {
                while let Ok(action) = actions.try_recv() {
                    self.on_dispatcher(move |api| match action {
                        SupervisorAction::Restart => api.restart(),
                        SupervisorAction::Stop => api.shutdown(),
                    })
                    .await?;
                }
                writeln!(out, "Restart requested")?;
            }
        } else if self.notifier.is_pending(NOTIFICATION_RESTART) {
            writeln!(out, "Restart the daemon to apply the change")?;
        }
        Ok(())
    }
}

fn cmd_config(config: &AppConfig, config_path: &Path, show: bool, out: &mut String) -> Result<()> {
    if show {
        let toml_str =
            toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("TOML error: {e}"))?;
        writeln!(out, "{toml_str}")?;
    } else {
        writeln!(
            out,
            "Configuration at '{}' is valid.",
            config_path.display()
        )?;
    }
    Ok(())
}

/// Convert a command-line value into the JSON form stored in the daemon config.
fn parse_value(raw: &str, as_bool: bool, as_int: bool) -> Result<Value> {
    if as_bool {
        let b: bool = raw
            .parse()
            .with_context(|| format!("{raw:?} is not true or false"))?;
        return Ok(Value::Bool(b));
    }
    if as_int {
        let n: i64 = raw
            .parse()
            .with_context(|| format!("{raw:?} is not an integer"))?;
        return Ok(Value::from(n));
    }
    if raw.is_empty() {
        bail!("value must not be empty");
    }
    Ok(Value::String(raw.to_string()))
}

fn saturating_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Load the config file, falling back to defaults if it does not exist.
///
/// The flag is `true` when the file was read.
async fn load_config(path: &Path) -> Result<(AppConfig, bool)> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        let config = AppConfig::load(path)
            .await
            .with_context(|| format!("invalid config at {}", path.display()))?;
        Ok((config, true))
    } else {
        Ok((AppConfig::default(), false))
    }
}
