mod cli;

use clap::Parser;
use ossatrisk::config::{load_config, ConfigError, HarvestConfig};
use ossatrisk::harvest::{load_annotator, HarvestPipeline, PipelineError};
use ossatrisk::sources::{JsonFileSink, JsonSuggestions, PackagistClient};
use ossatrisk::SourceError;
use std::time::Instant;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const RUNTIME_FAILURE: i32 = 3;
}

#[derive(Error, Debug)]
enum HarvestError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to create registry client: {0}")]
    Client(#[from] SourceError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default_level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn apply_overrides(config: &mut HarvestConfig, cmd: &cli::HarvestCommand) {
    if let Some(output) = &cmd.output {
        config.output.path = output.clone();
    }
    if let Some(max_pages) = cmd.max_pages {
        config.harvest.max_pages = max_pages;
    }
    if let Some(suggestions) = &cmd.suggestions {
        config.suggestions.path = suggestions.clone();
    }
}

async fn run(cli: cli::Cli) -> Result<i32, HarvestError> {
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        cli::Commands::Harvest(cmd) => {
            let start = Instant::now();
            apply_overrides(&mut config, &cmd);

            match cmd.ecosystem {
                cli::Ecosystem::Php => println!("Launching PHP runner..."),
            }

            let client = PackagistClient::new(config.registry.clone())?;
            let annotator = load_annotator(
                &JsonSuggestions::new(&config.suggestions.path),
                &config.suggestions.url_template,
            )
            .await?;
            let sink = JsonFileSink::new(&config.output.path);

            let result = HarvestPipeline::from_config(client.clone(), client, &config)
                .with_suggestions(annotator)
                .execute_into(&sink)
                .await?;

            println!(
                "Saved {} packages to {}",
                result.packages.len(),
                sink.path().display()
            );
            println!(
                "\nTotal execution time: {:.2} seconds",
                start.elapsed().as_secs_f64()
            );
            Ok(exit_code::SUCCESS)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => {
            if code != exit_code::SUCCESS {
                std::process::exit(code);
            }
        }
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(exit_code::RUNTIME_FAILURE);
        }
    }
}
