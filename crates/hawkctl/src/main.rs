//! hawkctl: CostHawk operator CLI
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use clap::{Parser, Subcommand};
use hawk_proto::{AwsCredentials, MonitorAction};
use hawkctl::{App, HawkConfig, cloud_provider};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "hawkctl")]
#[command(about = "CostHawk: AWS cost analysis, savings advice and CPU-limit guard")]
#[command(version)]
struct Cli {
    /// Path to config file (default: ~/.costhawk/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use a JSON fixture account instead of live AWS
    #[arg(long, global = true)]
    fixture: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze the account, advise, and record the result in history
    Analyze {
        #[arg(long)]
        user: String,

        /// AWS access key id (default: the user's stored credentials)
        #[arg(long, requires = "secret_key")]
        access_key: Option<String>,

        #[arg(long, requires = "access_key")]
        secret_key: Option<String>,

        #[arg(long)]
        session_token: Option<String>,
    },

    /// Show past analyses, newest first
    History {
        #[arg(long)]
        user: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Manage per-instance CPU limits
    Limits {
        #[command(subcommand)]
        action: LimitsAction,
    },

    /// Feed CPU samples to the limit monitor
    ///
    /// With --cpu the given samples are replayed; otherwise the current CPU is
    /// polled from CloudWatch until the instance is stopped or the sample
    /// budget runs out.
    Monitor {
        #[arg(long)]
        user: String,

        #[arg(long)]
        instance: String,

        /// Scripted CPU samples (repeatable)
        #[arg(long = "cpu")]
        samples: Vec<f64>,

        /// Live samples to take when no --cpu is given
        #[arg(long, default_value_t = 12)]
        max_samples: u32,

        /// Seconds between samples (default: monitor.poll_interval_secs)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Ask a free-form cost question
    Ask {
        #[arg(long)]
        user: String,

        question: String,

        /// Ground the answer on the latest analysis
        #[arg(long)]
        with_context: bool,
    },

    /// Inspect or forget stored AWS credentials
    Credentials {
        #[command(subcommand)]
        action: CredentialsAction,
    },

    /// Write a config file with defaults
    InitConfig {
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum LimitsAction {
    /// Create or replace a limit
    Set {
        #[arg(long)]
        user: String,

        #[arg(long)]
        instance: String,

        /// CPU ceiling in percent (0 < cpu <= 100)
        #[arg(long)]
        cpu: f64,

        /// Alert only; never stop the instance
        #[arg(long)]
        no_auto_shutdown: bool,
    },

    /// List limits and active alerts
    List {
        #[arg(long)]
        user: String,
    },

    /// Remove a limit
    Rm {
        #[arg(long)]
        user: String,

        #[arg(long)]
        instance: String,
    },
}

#[derive(Subcommand)]
enum CredentialsAction {
    Show {
        #[arg(long)]
        user: String,
    },
    Clear {
        #[arg(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("hawkctl=info".parse()?))
        .init();

    let config_path = cli.config.clone().unwrap_or_else(HawkConfig::default_path);

    let command = match cli.command {
        Commands::InitConfig { output, force } => {
            return init_config(output.unwrap_or(config_path), force);
        }
        command => command,
    };

    let mut config = HawkConfig::load_or_default(&config_path)?;
    config.apply_env(|key| std::env::var(key).ok());
    info!(
        config = %config_path.display(),
        region = %config.primary_region,
        state = %config.state_path.display(),
        llm = config.llm.has_api_key(),
        "loaded config"
    );

    let cloud = cloud_provider(cli.fixture.as_deref())?;
    let app = App::open(config, cloud)?;

    match command {
        Commands::Analyze {
            user,
            access_key,
            secret_key,
            session_token,
        } => {
            let explicit = match (access_key, secret_key) {
                (Some(key), Some(secret)) => Some(AwsCredentials {
                    session_token,
                    ..AwsCredentials::new(key, secret)
                }),
                _ => None,
            };
            print_json(&app.analyze(&user, explicit).await?)?;
        }
        Commands::History { user, limit } => {
            print_json(&app.history(&user, limit).await?)?;
        }
        Commands::Limits { action } => limits(&app, action).await?,
        Commands::Monitor {
            user,
            instance,
            samples,
            max_samples,
            interval,
        } => {
            let interval = interval.unwrap_or(app.config().monitor.poll_interval_secs);
            monitor(&app, &user, &instance, samples, max_samples, interval).await?;
        }
        Commands::Ask {
            user,
            question,
            with_context,
        } => {
            print_json(&app.ask(&user, &question, with_context).await?)?;
        }
        Commands::Credentials { action } => match action {
            CredentialsAction::Show { user } => {
                print_json(&app.credentials_show(&user).await?)?;
            }
            CredentialsAction::Clear { user } => {
                let removed = app.credentials_clear(&user).await?;
                print_json(&serde_json::json!({ "user": user, "removed": removed }))?;
            }
        },
        Commands::InitConfig { .. } => {}
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ─── Limits ───────────────────────────────────────────────────────────────────

async fn limits(app: &App, action: LimitsAction) -> anyhow::Result<()> {
    let monitor = app.monitor();
    match action {
        LimitsAction::Set {
            user,
            instance,
            cpu,
            no_auto_shutdown,
        } => {
            let limit = monitor
                .set_limit(&user, &instance, cpu, !no_auto_shutdown)
                .await?;
            print_json(&limit)?;
        }
        LimitsAction::List { user } => {
            let limits = monitor.list_limits(&user).await?;
            let alerts = monitor.active_alerts(&user).await?;
            print_json(&serde_json::json!({ "limits": limits, "active_alerts": alerts }))?;
        }
        LimitsAction::Rm { user, instance } => {
            let removed = monitor.remove_limit(&user, &instance).await?;
            print_json(&serde_json::json!({ "instance": instance, "removed": removed }))?;
        }
    }
    Ok(())
}

// ─── Monitor ──────────────────────────────────────────────────────────────────

async fn monitor(
    app: &App,
    user: &str,
    instance: &str,
    samples: Vec<f64>,
    max_samples: u32,
    interval_secs: u64,
) -> anyhow::Result<()> {
    let scripted = !samples.is_empty();
    let rounds = if scripted {
        samples.len()
    } else {
        max_samples as usize
    };
    info!(user, instance, rounds, scripted, interval_secs, "monitoring");

    for round in 0..rounds {
        if round > 0 {
            tokio::time::sleep(Duration::from_secs(interval_secs)).await;
        }

        let cpu = if scripted {
            samples[round]
        } else {
            match app.sample_cpu(user, instance).await? {
                Some(cpu) => cpu,
                None => {
                    warn!(instance, "no recent CPU datapoint, skipping sample");
                    continue;
                }
            }
        };

        let outcome = app.observe(user, instance, cpu).await?;
        println!("{}", serde_json::to_string(&outcome)?);
        if outcome.action == MonitorAction::Stopped {
            break;
        }
    }
    Ok(())
}

// ─── InitConfig ───────────────────────────────────────────────────────────────

fn init_config(output: PathBuf, force: bool) -> anyhow::Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
    }
    HawkConfig::default().save(&output)?;

    println!("Config written to {}", output.display());
    println!();
    println!("Set llm.api_key (or GEMINI_API_KEY) for AI advice, then run:");
    println!("  hawkctl analyze --user <id> --access-key <KEY> --secret-key <SECRET>");
    Ok(())
}
