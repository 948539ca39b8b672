//! alertengine CLI
//!
//! Inspect notifier types, validate channel settings and send test notifications.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use alertengine::alerting::{AlertService, HttpWebhookSender, NotifierRegistry, WebhookSender};
use alertengine::config::LoggingConfig;
use alertengine::db::MemoryStore;
use alertengine::models::{AlertNotification, ChannelInput};
use alertengine::Config;

/// alertengine - alert state tracking and notification dispatch
#[derive(Parser)]
#[command(name = "alertengine")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "ALERTENGINE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (for commands that support it)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Channel definition shared by `validate` and `test-notification`
#[derive(clap::Args)]
struct ChannelArgs {
    /// Notifier type id (see `alertengine notifiers`)
    #[arg(long = "type")]
    kind: String,

    /// Channel settings as a JSON object
    #[arg(long, default_value = "{}")]
    settings: String,

    /// Channel name
    #[arg(long, default_value = "cli")]
    name: String,

    /// Announce recoveries
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    send_on_ok: bool,
}

impl ChannelArgs {
    fn input(&self) -> anyhow::Result<ChannelInput> {
        let settings: serde_json::Value = serde_json::from_str(&self.settings)
            .with_context(|| format!("--settings is not valid JSON: {}", self.settings))?;
        let mut input = ChannelInput::new(self.kind.clone(), self.name.clone(), settings);
        input.send_on_ok = self.send_on_ok;
        Ok(input)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the registered notifier types
    Notifiers,

    /// Check a channel configuration without sending anything
    Validate {
        #[command(flatten)]
        channel: ChannelArgs,
    },

    /// Send a synthetic alerting notification through a channel
    TestNotification {
        #[command(flatten)]
        channel: ChannelArgs,

        /// Give up after this long (e.g. "10s"), defaults to the configured notification timeout
        #[arg(long, value_parser = humantime::parse_duration)]
        timeout: Option<Duration>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.logging, cli.verbose);
    debug!(path = ?cli.config, "Configuration loaded");

    let result = match cli.command {
        Commands::Notifiers => run_notifiers(&config, cli.format),
        Commands::Validate { channel } => run_validate(&config, &channel, cli.format),
        Commands::TestNotification { channel, timeout } => {
            run_test_notification(&config, &channel, timeout).await
        }
        Commands::Config => run_config(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn registry(config: &Config) -> anyhow::Result<NotifierRegistry> {
    let sender: Arc<dyn WebhookSender> =
        Arc::new(HttpWebhookSender::new(config.alerting.notification_timeout)?);
    Ok(NotifierRegistry::with_builtin(sender))
}

fn run_notifiers(config: &Config, format: OutputFormat) -> anyhow::Result<()> {
    let registry = registry(config)?;

    if format == OutputFormat::Json {
        let plugins: Vec<_> = registry.plugins().collect();
        println!("{}", serde_json::to_string_pretty(&plugins)?);
        return Ok(());
    }

    for plugin in registry.plugins() {
        println!("{:<12} {:<18} {}", plugin.kind, plugin.name, plugin.description);
        for option in plugin.options {
            let required = if option.required { " (required)" } else { "" };
            println!("    {:<14} {}{required}", option.key, option.label);
        }
    }
    Ok(())
}

fn run_validate(config: &Config, channel: &ChannelArgs, format: OutputFormat) -> anyhow::Result<()> {
    let registry = registry(config)?;
    let model = AlertNotification::from_input(0, channel.input()?, chrono::Utc::now());
    let outcome = registry.build(&model).map(|_| ());

    if format == OutputFormat::Json {
        let report = serde_json::json!({
            "type": model.kind,
            "valid": outcome.is_ok(),
            "error": outcome.as_ref().err().map(ToString::to_string),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if outcome.is_ok() {
        println!("{} channel '{}' is valid", model.kind, model.name);
    }

    outcome.map_err(Into::into)
}

async fn run_test_notification(
    config: &Config,
    channel: &ChannelArgs,
    timeout: Option<Duration>,
) -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new().with_min_read_role(config.alerting.min_read_role));
    let service = AlertService::new(config, store.clone(), store, Arc::new(registry(config)?));

    let cancel = CancellationToken::new();
    let timeout = timeout.unwrap_or(config.alerting.notification_timeout);
    let input = channel.input()?;
    info!(kind = %input.kind, "Sending test notification");

    let send = service.test_notification(0, input, cancel.clone());
    tokio::select! {
        result = tokio::time::timeout(timeout, send) => {
            result
                .map_err(|_| anyhow::anyhow!("test notification timed out after {timeout:?}"))?
                .context("test notification failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            anyhow::bail!("interrupted");
        }
    }

    println!("Test notification sent");
    Ok(())
}

fn run_config(config: &Config) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    if let Some(path) = alertengine::config::default_config_path() {
        eprintln!("default config file: {}", path.display());
    }
    Ok(())
}
