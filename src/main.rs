//! Group Broadcaster - Main Entry Point
//!
//! A Telegram userbot that sends every row of a CSV file to every group
//! the account belongs to.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use dialoguer::{Input, Password};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use group_broadcaster::broadcast::{Dispatcher, FloodWaitPolicy, TerminalSink};
use group_broadcaster::config::{RowReader, RunConfig, TelegramConfig};
use group_broadcaster::telegram::{TelegramBot, TelegramError};

/// Broadcast CSV messages to every Telegram group you are a member of.
#[derive(Parser, Debug)]
#[command(name = "broadcaster")]
#[command(about = "Send each CSV row to every Telegram group you belong to")]
#[command(version)]
struct Args {
    /// CSV file with `message` and `image` columns.
    csv: PathBuf,

    /// Path to the persisted configuration file.
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Path to the Telegram session file.
    #[arg(long, default_value = "session.db")]
    session: PathBuf,

    /// Telegram API ID.
    #[arg(long)]
    api_id: Option<String>,

    /// Telegram API hash.
    #[arg(long)]
    api_hash: Option<String>,

    /// Phone number with country code.
    #[arg(long)]
    phone: Option<String>,

    /// Seconds to wait between CSV lines.
    #[arg(short, long)]
    delay: Option<u64>,

    /// Give up on a group after this many flood waits for the same row.
    #[arg(long)]
    max_flood_retries: Option<u32>,

    /// Give up on a group when Telegram asks to wait longer than this many seconds.
    #[arg(long)]
    max_flood_wait: Option<u64>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Values given on the command line, as a config layer.
    fn overrides(&self) -> RunConfig {
        RunConfig {
            api_id: self.api_id.clone(),
            api_hash: self.api_hash.clone(),
            phone: self.phone.clone(),
            delay: self.delay,
        }
    }

    fn flood_policy(&self) -> FloodWaitPolicy {
        let mut policy = FloodWaitPolicy::unbounded();
        if let Some(retries) = self.max_flood_retries {
            policy = policy.with_max_retries(retries);
        }
        if let Some(secs) = self.max_flood_wait {
            policy = policy.with_max_wait(Duration::from_secs(secs));
        }
        policy
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level);

    // Load environment variables
    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    // Resolve configuration: file < environment < command line
    let run_config = RunConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?
        .merged_with(RunConfig::from_env().context("Invalid environment configuration")?)
        .merged_with(args.overrides());

    let tg_config = run_config
        .telegram()
        .context("Please provide api_id, api_hash and phone")?
        .with_session_path(&args.session);

    if !args.csv.is_file() {
        bail!("CSV file not found: {}", args.csv.display());
    }

    let mut rows = RowReader::open(&args.csv)
        .with_context(|| format!("Failed to open {}", args.csv.display()))?;
    if !rows.has_image_column() {
        info!("CSV has no image column, all rows will be sent as text");
    }

    run_config
        .save(&args.config)
        .with_context(|| format!("Failed to save {}", args.config.display()))?;

    let delay = run_config.delay_secs();
    info!(
        "Broadcasting {} with {}s between lines",
        args.csv.display(),
        delay
    );

    // Connect to Telegram
    let bot = TelegramBot::connect(&tg_config)
        .await
        .context("Failed to connect to Telegram")?;

    // Handle authentication if needed
    if !bot.is_authorized().await.context("Failed to check authorization")? {
        authenticate(&bot, &tg_config).await?;
    }

    let dispatcher = Dispatcher::new(Arc::new(bot), Arc::new(TerminalSink::new()))
        .with_delay(Duration::from_secs(delay))
        .with_policy(args.flood_policy());

    let report = dispatcher
        .run(&mut rows)
        .await
        .context("Broadcast aborted")?;

    info!(
        "Done: {} rows to {} groups, {} sent, {} failed, {} flood waits, {} blank rows skipped, {} unreadable",
        report.rows,
        report.groups,
        report.sent,
        report.failed,
        report.flood_waits,
        rows.skipped(),
        report.bad_rows
    );

    Ok(())
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Handles Telegram authentication.
async fn authenticate(bot: &TelegramBot, config: &TelegramConfig) -> Result<()> {
    info!("Authentication required");

    let token = bot
        .request_login_code(&config.phone, &config.api_hash)
        .await
        .context("Failed to request login code")?;

    info!("Login code sent to your Telegram app or SMS");

    let code: String = Input::new()
        .with_prompt("Enter the login code")
        .interact_text()?;

    match bot.sign_in(&token, code.trim()).await {
        Ok(()) => Ok(()),
        Err(TelegramError::PasswordRequired(password_token)) => {
            info!("Two-factor authentication is enabled");

            let hint = password_token.hint().unwrap_or("no hint");
            info!("Password hint: {}", hint);

            let password: String = Password::new()
                .with_prompt("Enter your 2FA password")
                .interact()?;

            bot.check_password(password_token, &password)
                .await
                .context("2FA authentication failed")?;

            Ok(())
        }
        Err(e) => Err(e).context("Authentication failed"),
    }
}
