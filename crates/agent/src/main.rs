//! Origin Certificate Agent - Main entry point
//!
//! Rotates a Cloudflare origin certificate on a schedule and revokes the
//! certificates it issued when they are superseded or the agent exits.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use origin_cert_agent::{
    signals, AgentError, EngineConfig, FilesystemSink, HookError, OriginCaClient, PostHook,
    RotationEngine, RotationHandle, RsaCsrGenerator,
};
use origin_cert_config::{parse_duration, AgentConfig, ConfigError, Validity, DEFAULT_API_URL};

/// Origin certificate agent - keeps a Cloudflare origin certificate fresh
#[derive(Parser, Debug)]
#[command(name = "origin-cert-agent")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    agent: AgentArgs,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Args, Debug)]
struct AgentArgs {
    /// Origin CA service key
    #[arg(short = 'p', long = "origin-api-key", env = "CF_ORIGIN_API_KEY", hide_env_values = true)]
    origin_api_key: String,

    /// Time between certificate rotations (e.g. 168h, 1h30m)
    #[arg(
        short = 'f',
        long = "rotation-frequency",
        env = "CF_ORIGIN_ROTATION_FREQUENCY",
        default_value = "168h",
        value_parser = parse_duration
    )]
    rotation_frequency: Duration,

    /// Requested certificate validity in days (7, 30 or 90)
    #[arg(short = 'l', long = "ttl", env = "CF_ORIGIN_CERT_TTL", default_value_t = 30)]
    ttl: u32,

    /// Domain to issue certificates for; the wildcard is included
    #[arg(short = 'n', long = "domain", env = "CF_ORIGIN_TLD")]
    domain: String,

    /// Certificate output path
    #[arg(short = 'c', long = "certout", env = "CF_ORIGIN_CERT_OUT_FILE", default_value = "./cert.pem")]
    certout: PathBuf,

    /// Private key output path
    #[arg(short = 'k', long = "keyout", env = "CF_ORIGIN_KEY_OUT_FILE", default_value = "./key.pem")]
    keyout: PathBuf,

    /// Shell command to run after each new certificate
    #[arg(long = "post-hook", env = "CF_ORIGIN_POST_HOOK")]
    post_hook: Option<String>,

    /// Deadline for each Origin CA API call
    #[arg(
        long = "api-timeout",
        env = "CF_ORIGIN_API_TIMEOUT",
        default_value = "30s",
        value_parser = parse_duration
    )]
    api_timeout: Duration,

    /// Upper bound on final revocation at shutdown
    #[arg(
        long = "shutdown-timeout",
        env = "CF_ORIGIN_SHUTDOWN_TIMEOUT",
        default_value = "30s",
        value_parser = parse_duration
    )]
    shutdown_timeout: Duration,

    /// Origin CA API base URL
    #[arg(long = "api-url", env = "CF_ORIGIN_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,
}

impl AgentArgs {
    fn into_config(self) -> Result<AgentConfig, ConfigError> {
        let mut config = AgentConfig::new(self.origin_api_key, self.domain);
        config.rotation_period = self.rotation_frequency;
        config.validity = Validity::try_from(self.ttl)?;
        config.cert_out = self.certout;
        config.key_out = self.keyout;
        config.post_hook = self.post_hook;
        config.api_timeout = self.api_timeout;
        config.shutdown_timeout = self.shutdown_timeout;
        config.api_url = self.api_url;
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate configuration and exit without contacting the API
    Check,
    /// Run the agent (default)
    Run,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let config = cli
        .agent
        .into_config()
        .context("Invalid configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    match cli.command {
        Some(Commands::Check) => check_config(&config),
        Some(Commands::Run) | None => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to build async runtime")?;
            runtime.block_on(run_agent(config))
        }
    }
}

fn init_logging(verbose: bool, format: LogFormat) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

/// Print the effective configuration and exit
fn check_config(config: &AgentConfig) -> Result<()> {
    info!("Configuration test successful:");
    info!("  - domain: {} (hostnames {:?})", config.domain, config.hostnames());
    info!("  - validity: {}", config.validity);
    info!("  - rotation every {:?}", config.rotation_period);
    info!(
        "  - output: {} / {}",
        config.cert_out.display(),
        config.key_out.display()
    );
    if let Some(hook) = &config.post_hook {
        info!("  - post hook: {}", hook);
    }

    println!("origin-cert-agent: configuration test is successful");
    Ok(())
}

/// Run rotation until a shutdown signal or a fatal error
async fn run_agent(config: AgentConfig) -> Result<()> {
    let authority = OriginCaClient::new(
        config.api_key.clone(),
        config.api_url.clone(),
        config.api_timeout,
    )
    .map_err(AgentError::AuthorityClient)?;

    let sink = Arc::new(FilesystemSink::new(&config.cert_out, &config.key_out));
    let engine = RotationEngine::new(
        EngineConfig::from(&config),
        Arc::new(authority),
        sink.clone(),
        Arc::new(RsaCsrGenerator::default()),
    );

    let mut hook_task = config
        .post_hook
        .clone()
        .map(|command| PostHook::new(command).spawn(engine.bus()));

    let mut rotation = engine.run(CancellationToken::new());
    info!(domain = %config.domain, "Origin certificate agent started");

    let mut failure: Option<anyhow::Error> = None;
    let mut engine_stopped = false;

    tokio::select! {
        signal = signals::shutdown_signal() => {
            if let Err(e) = signal {
                failure = Some(anyhow!(e).context("Failed to install signal handlers"));
            }
        }
        result = rotation.join() => {
            engine_stopped = true;
            match result {
                Ok(()) => warn!("Rotation engine stopped unexpectedly"),
                Err(e) => failure = Some(e.into()),
            }
        }
        result = wait_for_hook(&mut hook_task) => {
            if let Err(e) = result {
                error!(error = %e, "Post hook failed, shutting down");
                failure = Some(AgentError::from(e).into());
            }
        }
    }

    info!("Shutting down");
    let stopped = teardown(&mut rotation, &sink, config.shutdown_timeout, engine_stopped).await;
    if let Err(e) = stopped {
        if failure.is_none() {
            failure = Some(e.into());
        }
    }

    if let Some(task) = hook_task {
        task.abort();
    }

    match failure {
        Some(e) => Err(e),
        None => {
            info!("Origin certificate agent stopped");
            Ok(())
        }
    }
}

/// Stop the engine, then remove the output files
///
/// The files go last: a rotation in flight when shutdown starts still
/// writes its pair before the engine revokes it.
async fn teardown(
    rotation: &mut RotationHandle,
    sink: &FilesystemSink,
    shutdown_timeout: Duration,
    engine_stopped: bool,
) -> Result<(), AgentError> {
    let mut result = Ok(());
    if !engine_stopped {
        rotation.shutdown();
        result = rotation.join_with_timeout(shutdown_timeout).await;
        match &result {
            Ok(()) => info!("All issued certificates revoked"),
            Err(e) => error!(error = %e, "Rotation engine did not shut down cleanly"),
        }
    }
    sink.remove_files().await;
    result
}

/// Resolve when the post hook task ends; pending forever without a hook
async fn wait_for_hook(
    task: &mut Option<JoinHandle<Result<(), HookError>>>,
) -> Result<(), HookError> {
    let Some(handle) = task.as_mut() else {
        return std::future::pending().await;
    };
    match handle.await {
        Ok(result) => result,
        Err(e) => Err(HookError::Failed {
            command: "post hook task".to_string(),
            status: e.to_string(),
        }),
    }
}
