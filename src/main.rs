//! alarmd - remote-triggered alarm and location agent
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;

use clap::Parser;

use alarm_app::config::{default_config_path, init_config_file, load_settings, Settings};

/// Remote-triggered alarm and location agent
#[derive(Parser, Debug)]
#[command(name = "alarmd")]
#[command(about = "Keeps a connection to the alarm controller and rings on request", long_about = None)]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Controller WebSocket URL (overrides [server] url)
    #[arg(long, value_name = "URL")]
    url: Option<String>,

    /// Serve the HTTP control routes
    #[arg(long)]
    http: bool,

    /// Write events to stdout as NDJSON
    #[arg(long)]
    headless: bool,

    /// Do not connect until 'start' is received
    #[arg(long)]
    no_auto_start: bool,

    /// Write a default config file and exit
    #[arg(long)]
    init_config: bool,
}

impl Args {
    fn apply(&self, settings: &mut Settings) {
        if let Some(url) = &self.url {
            settings.server.url = url.clone();
        }
        if self.http {
            settings.http.enabled = true;
        }
        if self.headless {
            settings.behavior.headless = true;
        }
        if self.no_auto_start {
            settings.behavior.auto_start = false;
        }
    }
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    if args.init_config {
        init_config_file(&config_path)?;
        eprintln!("Config written to {}", config_path.display());
        return Ok(());
    }

    alarm_core::logging::init()?;

    let mut settings = load_settings(&config_path);
    args.apply(&mut settings);
    settings.validate()?;

    sound_alarm::run(settings).await?;
    Ok(())
}
