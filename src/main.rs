use anyhow::Context;
use chunk_classifier::{TrainingConfig, run};
use log::info;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = TrainingConfig::from_env().context("cannot load the training config")?;
    info!("training with {config:?}");

    run(&config)?;
    Ok(())
}
