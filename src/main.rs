//! lemonlock - manage this machine's license from the command line

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lemonlock::{Config, FileStore, LicenseHandle, PremiumFeature, StateStore};

const APP_NAME: &str = "lemonlock";

#[derive(Parser, Debug)]
#[command(name = "lemonlock")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Activate a license key on this machine
    Activate {
        /// License key (XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX)
        key: String,
    },

    /// Release this machine's activation
    Deactivate,

    /// Re-validate the active license now
    Validate,

    /// Show license status
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Keep validating in the background and print license events
    Watch,
}

fn open_store(config: &Config) -> Result<Arc<dyn StateStore>> {
    let store = match &config.data_dir {
        Some(dir) => FileStore::open(dir.join("license.json")),
        None => FileStore::for_app(APP_NAME),
    }
    .context("Failed to open license store")?;
    tracing::debug!(path = %store.path().display(), "Using license store");
    Ok(Arc::new(store))
}

fn print_status(handle: &LicenseHandle) {
    let status = handle.license_state();
    println!("State:          {}", status.state);
    if let Some(key) = &status.license_key {
        println!("License key:    {}", lemonlock::key::mask(key));
    }
    if let Some(id) = &status.instance_id {
        println!("Instance:       {}", id);
    }
    if let Some(email) = &status.customer_email {
        println!("Customer:       {}", email);
    }
    if let Some(at) = status.last_validated {
        println!("Last validated: {}", at.format("%b %d, %Y %H:%M UTC"));
    }
    if let Some(until) = status.valid_until {
        println!("Valid until:    {}", until.format("%b %d, %Y"));
    }
    println!("Online:         {}", if status.is_online { "yes" } else { "no" });
    if status.grace_remaining_secs > 0 {
        println!("Offline grace:  {}h", status.grace_remaining_secs / 3600);
    }
    let features: Vec<String> = PremiumFeature::all()
        .map(|f| f.as_ref().to_string())
        .collect();
    println!(
        "Features:       {} ({})",
        if status.feature_available { "unlocked" } else { "locked" },
        features.join(", ")
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lemonlock=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let store = open_store(&config)?;
    let handle = lemonlock::init(config, store).context("Failed to start license manager")?;

    match cli.command {
        Commands::Activate { key } => {
            handle.activate(&key).await?;
            println!("License activated.");
            print_status(&handle);
        }
        Commands::Deactivate => {
            let report = handle.deactivate().await?;
            if report.remote_confirmed() {
                println!("License deactivated.");
            } else {
                println!(
                    "License removed from this machine; the licensing service did not confirm the release."
                );
            }
        }
        Commands::Validate => {
            let licensed = handle.refresh().await?;
            println!("{}", if licensed { "License is valid." } else { "No valid license." });
            for error in handle.error_history() {
                eprintln!("  [{}] {}", error.code, error.message);
            }
        }
        Commands::Status { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&handle.license_state())?);
            } else {
                print_status(&handle);
            }
        }
        Commands::Watch => {
            let mut events = handle.subscribe();
            handle.start_background();
            handle.on_startup().await?;
            print_status(&handle);

            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => println!("{}", serde_json::to_string(&event)?),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "Dropped license events");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
    }

    lemonlock::dispose(handle);
    Ok(())
}
