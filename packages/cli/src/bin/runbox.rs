// ABOUTME: Entry point for the runbox CLI
// ABOUTME: Parses commands, installs logging, and reports failures

use clap::{Parser, Subcommand};
use colored::*;
use runbox_config::constants;
use std::process;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::image::ImageCommands;
use cli::run::RunArgs;

#[derive(Parser)]
#[command(name = "runbox")]
#[command(about = "Run code bundles in throwaway sandbox containers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a code bundle and print its output
    Run(RunArgs),
    /// Manage the runner image
    #[command(subcommand)]
    Image(ImageCommands),
}

fn init_tracing() {
    // Logs go to stderr so the bundle's output stays clean on stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(constants::RUST_LOG).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Commands::Run(args) => cli::run::handle_run(args).await,
        Commands::Image(command) => cli::image::handle_image_command(command).await,
    };

    match result {
        Ok(0) => {}
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            process::exit(1);
        }
    }
}
