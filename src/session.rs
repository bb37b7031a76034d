use anyhow::Context;
use log::info;
use machine_learning::{
    MlErr,
    arch::{ClassifierSpec, Model, loss::CrossEntropy},
    checkpoint,
    data::{DataLoader, NUM_CLASSES, SAMPLE_DIM, SyntheticDataset},
    optimization::{Adam, GradientDescent, Optimizer},
    training::{Trainer, TrainingState},
};
use rand::{SeedableRng, rngs::StdRng};

use crate::config::{OptimizerKind, TrainingConfig};

/// Trains the chunk classifier as described by `config`, printing one report line per epoch
/// to stdout.
///
/// If the configured checkpoint exists the run resumes from it, and once every epoch is done
/// a new checkpoint replaces it.
///
/// # Returns
/// The final training state.
pub fn run(config: &TrainingConfig) -> anyhow::Result<TrainingState> {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let train = SyntheticDataset::new(config.train_len, &mut rng)?;
    let test = SyntheticDataset::new(config.test_len, &mut rng)?;
    info!(
        "generated {} training and {} test samples",
        config.train_len, config.test_len
    );

    let train_loader = DataLoader::new(train, config.batch_size)
        .shuffle(true)
        .drop_last(true)
        .workers(config.num_workers)?;
    let test_loader = DataLoader::new(test, config.batch_size).workers(config.num_workers)?;

    let mut model = ClassifierSpec::new(SAMPLE_DIM, NUM_CLASSES).build(&mut rng)?;
    let mut optimizer = build_optimizer(config, model.size());

    let state = match checkpoint::load(&config.checkpoint) {
        Ok(checkpoint) => {
            let state = checkpoint
                .restore(&mut model, &mut optimizer)
                .context("checkpoint does not fit the configured model")?;
            info!(
                "resuming from {} at epoch {}",
                config.checkpoint.display(),
                state.epoch
            );
            state
        }
        Err(MlErr::CheckpointNotFound(_)) => TrainingState::default(),
        Err(e) => return Err(e).context("cannot load checkpoint"),
    };

    let mut trainer = Trainer::new(
        model,
        optimizer,
        CrossEntropy::new(),
        train_loader,
        test_loader,
        rng,
    )
    .with_state(state);

    let state = trainer.fit(config.epochs.get(), |report| println!("{report}"))?;

    trainer
        .save_checkpoint(&config.checkpoint)
        .with_context(|| format!("cannot save checkpoint {}", config.checkpoint.display()))?;

    info!(
        "done after {} epochs, best test accuracy {:.4}",
        state.epoch, state.best_accuracy
    );

    Ok(state)
}

fn build_optimizer(config: &TrainingConfig, size: usize) -> Box<dyn Optimizer> {
    match config.optimizer {
        OptimizerKind::Adam => Box::new(Adam::with_defaults(size, config.learning_rate)),
        OptimizerKind::GradientDescent => Box::new(GradientDescent::new(config.learning_rate)),
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::*;

    fn small_config(name: &str) -> TrainingConfig {
        TrainingConfig {
            epochs: NonZeroUsize::new(2).unwrap(),
            batch_size: NonZeroUsize::new(32).unwrap(),
            train_len: 96,
            test_len: 40,
            num_workers: 1,
            seed: Some(11),
            checkpoint: std::env::temp_dir().join(format!(
                "chunk-classifier-session-{}-{name}.safetensors",
                std::process::id()
            )),
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn run_trains_saves_and_resumes() {
        let mut config = small_config("resume");

        let state = run(&config).unwrap();
        assert_eq!(state.epoch, 2);

        let saved = checkpoint::load(&config.checkpoint).unwrap();
        assert_eq!(saved.epoch, 2);
        assert_eq!(saved.best_accuracy, state.best_accuracy);

        config.epochs = NonZeroUsize::new(3).unwrap();
        let resumed = run(&config).unwrap();
        std::fs::remove_file(&config.checkpoint).unwrap();

        assert_eq!(resumed.epoch, 3);
        assert!(resumed.best_accuracy >= state.best_accuracy);
    }

    #[test]
    fn mismatched_checkpoint_is_fatal() {
        let adam = small_config("mismatch");
        run(&adam).unwrap();

        let descent = TrainingConfig {
            optimizer: OptimizerKind::GradientDescent,
            ..adam.clone()
        };
        let res = run(&descent);
        std::fs::remove_file(&adam.checkpoint).unwrap();

        assert!(res.is_err());
    }
}
