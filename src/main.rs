use clap::{Parser, Subcommand};
use evmap::compose::compose;
use evmap::config::AppConfig;
use evmap::types::{FeatureRef, ViewState};
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the datasets and write the composed map layers as JSON
    Compose {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Output file; when omitted the JSON alone is written to stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        zoom: Option<f64>,
        /// Selected feature, e.g. `station:3` or `region:0`
        #[arg(long)]
        select: Option<FeatureRef>,
    },
    /// Print the national totals snapshot
    Totals {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the layer and pick API alongside the dataset files
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries only command output.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compose {
            config,
            output,
            year,
            zoom,
            select,
        } => {
            let app_config = AppConfig::load_from_file(&config)?;
            let datasets = evmap::datasets_from_config(&app_config)?;

            let mut view = ViewState {
                camera: app_config.view.camera,
                year: year.or(app_config.view.year),
                selection: select,
            };
            if let Some(zoom) = zoom {
                view.camera.zoom = zoom;
            }

            let data = datasets.map_data().await?;
            let layers = compose(&data, &view);
            let json = serde_json::to_string_pretty(&layers)?;

            match output {
                Some(path) => {
                    fs::write(&path, json)?;
                    info!(path = ?path, layers = layers.len(), "Wrote composed layers");
                }
                None => println!("{json}"),
            }
        }
        Commands::Totals { config } => {
            let app_config = AppConfig::load_from_file(&config)?;
            let datasets = evmap::datasets_from_config(&app_config)?;
            let totals = datasets.totals.read().await?;
            println!("{}", serde_json::to_string_pretty(&*totals)?);
        }
        Commands::Serve { config } => {
            let app_config = AppConfig::load_from_file(&config)?;
            let datasets = evmap::datasets_from_config(&app_config)?;
            evmap::server::start_server(app_config, datasets).await?;
        }
    }

    Ok(())
}
