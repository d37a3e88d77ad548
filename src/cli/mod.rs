//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod chat;
pub mod metrics;
pub mod repl_command;
pub mod say;
pub mod settings;

use std::error::Error;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::core::config::defaults::{API_URL_ENV, ENVIRONMENT_ENV};
use crate::core::config::{Config, Environment};
use crate::core::engine::ChatEngine;
use crate::core::session::{FileSessionStore, SessionManager};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_GIT_DESCRIBE"),
    ", built ",
    env!("VERGEN_BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "askliam")]
#[command(version = VERSION)]
#[command(about = "A terminal chat client for a streaming text/image generation service")]
#[command(
    long_about = "askliam talks to a streaming generation service: type a message, attach \
images, and watch the answer arrive as it is generated. One session id is kept per \
machine so the service can follow the conversation.\n\n\
Environment Variables:\n\
  ASKLIAM_API_URL   Base URL of the service (overrides --env and the config file)\n\
  ASKLIAM_ENV       'production' or 'local'\n\
  RUST_LOG          Diagnostic log filter (default: warn)\n\n\
Chat commands:\n\
  /attach <path>    Attach an image or file to the next message\n\
  /paste            Attach the images on the clipboard\n\
  /help             List every command"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Service deployment to use (production or local)
    #[arg(long, global = true, value_name = "ENV")]
    pub env: Option<Environment>,

    /// Base URL of the service; overrides --env
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// System prompt sent with every message
    #[arg(short = 's', long, global = true, value_name = "TEXT")]
    pub system_prompt: Option<String>,

    /// Write diagnostic logs to this file instead of stderr
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Append the conversation to this file
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub transcript: Option<String>,

    /// Start a new session instead of continuing the stored one
    #[arg(long, global = true)]
    pub new_session: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the interactive chat (default)
    Chat,
    /// Send one message and print the streamed answer
    Say {
        /// Message text
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
        /// Attach an image or file (repeatable)
        #[arg(short = 'i', long = "image", value_name = "PATH")]
        images: Vec<PathBuf>,
    },
    /// Show the service's resource usage
    Metrics {
        /// Keep printing a sample every polling interval
        #[arg(short, long)]
        watch: bool,
    },
    /// Show the configuration and every inference setting
    Settings,
    /// Store an inference setting override in the config file
    Set {
        /// Setting name, e.g. temperature or top_k
        field: String,
        /// New value
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
    /// Remove an inference setting override from the config file
    Unset {
        /// Setting name
        field: String,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(&args)?;

    tokio::runtime::Runtime::new()?.block_on(async_main(args))
}

fn init_tracing(args: &Args) -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    match &args.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let config_path = Config::default_path().ok_or("Could not determine the config directory")?;
    let config = Config::load_from_path(&config_path)?;

    match &args.command {
        None | Some(Commands::Chat) => {
            let engine = build_engine(&args, &config)?;
            chat::run_chat(engine, &config, args.transcript.clone()).await
        }
        Some(Commands::Say { prompt, images }) => {
            let engine = build_engine(&args, &config)?;
            say::run_say(engine, prompt, images).await
        }
        Some(Commands::Metrics { watch }) => {
            let base_url = resolve_base_url(&args, &config);
            metrics::run_metrics(&base_url, config.metrics_interval(), *watch).await
        }
        Some(Commands::Settings) => settings::show_settings(&config, &config_path),
        Some(Commands::Set { field, value }) => {
            settings::set_setting(config, &config_path, field, value)
        }
        Some(Commands::Unset { field }) => settings::unset_setting(config, &config_path, field),
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

pub fn resolve_base_url(args: &Args, config: &Config) -> String {
    let environment = config.resolve_environment(args.env, env_var(ENVIRONMENT_ENV).as_deref());
    let base_url = config.resolve_base_url(
        args.base_url.as_deref(),
        env_var(API_URL_ENV).as_deref(),
        environment,
    );
    debug!(%environment, %base_url, "resolved service endpoint");
    base_url
}

pub fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(concat!("askliam/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Everything a conversation needs, resolved from flags, environment and
/// the config file.
pub fn build_engine(args: &Args, config: &Config) -> Result<ChatEngine, Box<dyn Error>> {
    let base_url = resolve_base_url(args, config);
    let settings = config.settings_validator()?;

    let mut sessions = match FileSessionStore::in_data_dir() {
        Some(store) => SessionManager::new(Box::new(store)),
        None => {
            warn!("no data directory available; the session id will not be kept");
            SessionManager::in_memory()
        }
    };
    let session_id = if args.new_session {
        sessions.rotate()
    } else {
        sessions.get_or_create_session_id()
    };

    let system_prompt = args
        .system_prompt
        .clone()
        .or_else(|| config.system_prompt.clone())
        .unwrap_or_default();

    Ok(ChatEngine::new(http_client()?, base_url, session_id, settings)
        .with_system_prompt(system_prompt)
        .with_idle_timeout(config.stream_idle_timeout()))
}
