//! ForgeBundle CLI - Task runner front-end
//!
//! Commands: build, platforms, fingerprint
//! Outputs JSON to stdout, logs to stderr
//! Returns 2 when any platform failed, 1 on fatal errors

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use forgebundle_core::{
    config::DEFAULT_CONFIG_FILE,
    BuildConfig, BuildPipeline, Environment, FingerprintService, PipelineError,
};

#[derive(Parser)]
#[command(name = "forgebundle-cli")]
#[command(about = "ForgeBundle CLI - Platform Asset Compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the build configuration
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Override the configured environment
    #[arg(short, long)]
    env: Option<Environment>,

    /// Force minification on
    #[arg(long, conflicts_with = "no_minify")]
    minify: bool,

    /// Force minification off
    #[arg(long)]
    no_minify: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile templates, scripts and stylesheets
    Build {
        /// Only build this platform
        #[arg(short, long)]
        platform: Option<String>,
    },

    /// List configured platforms
    Platforms,

    /// Print the content hash and public URL of a built file
    Fingerprint {
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match BuildConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            print_error(&format!("Failed to load configuration: {}", e));
            return ExitCode::FAILURE;
        }
    };
    if let Some(env) = cli.env {
        config.environment = env;
    }
    if cli.minify {
        config.minify = Some(true);
    } else if cli.no_minify {
        config.minify = Some(false);
    }

    match cli.command {
        Commands::Platforms => {
            print_json(&serde_json::json!({ "platforms": config.platforms }));
            ExitCode::SUCCESS
        }

        Commands::Fingerprint { path } => {
            let service = FingerprintService::from_config(&config);
            match service.fingerprint(&path).await {
                Ok(fingerprint) => {
                    print_json(&fingerprint);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    print_error(&e.to_string());
                    ExitCode::FAILURE
                }
            }
        }

        Commands::Build { platform } => {
            let pipeline = BuildPipeline::new(config);
            match pipeline.build(platform.as_deref()).await {
                Ok(report) => {
                    print_json(&serde_json::json!({ "success": true, "report": report }));
                    ExitCode::SUCCESS
                }
                Err(PipelineError::Aggregate(aggregate)) => {
                    print_json(&serde_json::json!({
                        "success": false,
                        "allFailed": aggregate.all_failed(),
                        "error": aggregate.to_string(),
                        "report": aggregate.report,
                    }));
                    ExitCode::from(2)
                }
                Err(e) => {
                    print_error(&e.to_string());
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => print_error(&format!("Failed to serialize output: {}", e)),
    }
}

fn print_error(message: &str) {
    let output = serde_json::json!({ "success": false, "error": message });
    println!("{}", output);
}
