// ABOUTME: CLI commands for the runner image
// ABOUTME: Provisions the image on demand and prints its id

use super::utils::{connect, load_config, ImageArgs};
use anyhow::Result;
use clap::Subcommand;
use colored::*;
use runbox_sandbox::ImageProvisioner;

#[derive(Subcommand)]
pub enum ImageCommands {
    /// Build the runner image if it does not exist yet and print its id
    Ensure(ImageArgs),
}

pub async fn handle_image_command(command: ImageCommands) -> Result<i32> {
    match command {
        ImageCommands::Ensure(args) => ensure_image(args).await,
    }
}

async fn ensure_image(args: ImageArgs) -> Result<i32> {
    let config = load_config(|config| args.apply(config))?;
    let provisioner = ImageProvisioner::new(connect().await?);

    let id = provisioner
        .ensure(&config.image_reference, &config.build_context)
        .await?;

    eprintln!(
        "{} {}",
        "Image ready:".green().bold(),
        config.image_reference
    );
    println!("{}", id);
    Ok(0)
}
