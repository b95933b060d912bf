mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("asl_mlp=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config: asl_mlp::TrainConfig = Cli::parse().into();
    let summary = asl_mlp::run(&config).with_context(|| {
        format!("training on {} failed", config.dataset.display())
    })?;

    println!("{}", summary);
    Ok(())
}
