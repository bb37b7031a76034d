use std::{fs, path::PathBuf};

use machine_learning::{
    MlErr,
    arch::{ClassifierSpec, Model, Sequential},
    checkpoint,
    optimization::{Adam, GradientDescent, Optimizer},
};
use ndarray::Array2;
use rand::{SeedableRng, rngs::StdRng};

fn scratch(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "chunk-classifier-{}-{name}.safetensors",
        std::process::id()
    ))
}

/// A model and an optimizer that have gone through a few updates.
fn trained(seed: u64) -> (Sequential, Adam) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut model = ClassifierSpec::new(16, 4).build(&mut rng).unwrap();
    let mut optimizer = Adam::with_defaults(model.size(), 1e-2);

    for _ in 0..3 {
        let scores = model
            .forward(Array2::from_elem((2, 16), 0.7).view())
            .unwrap();
        model.zero_grad();
        model.backward(scores).unwrap();
        model.step(&mut optimizer).unwrap();
    }

    (model, optimizer)
}

#[test]
fn round_trip_is_bit_exact() {
    let path = scratch("round-trip");
    let (model, optimizer) = trained(1);

    checkpoint::save(&path, 5, &model, &optimizer, 0.97).unwrap();
    let loaded = checkpoint::load(&path).unwrap();
    fs::remove_file(&path).unwrap();

    assert_eq!(loaded.epoch, 5);
    assert_eq!(loaded.best_accuracy.to_bits(), 0.97f64.to_bits());
    assert_eq!(loaded.model_state, model.state_dict().unwrap());
    assert_eq!(loaded.optimizer_state, optimizer.state_dict().unwrap());

    let (mut fresh_model, mut fresh_optimizer) = trained(2);
    let state = loaded
        .restore(&mut fresh_model, &mut fresh_optimizer)
        .unwrap();

    assert_eq!(state.epoch, 5);
    assert_eq!(state.best_accuracy, 0.97);

    let bits = |params: &[f32]| params.iter().map(|p| p.to_bits()).collect::<Vec<_>>();
    assert_eq!(bits(fresh_model.params()), bits(model.params()));
    assert_eq!(
        fresh_optimizer.state_dict().unwrap(),
        optimizer.state_dict().unwrap()
    );
}

#[test]
fn restored_runs_continue_identically() {
    let path = scratch("continue");
    let (model, mut optimizer) = trained(3);

    checkpoint::save(&path, 1, &model, &optimizer, 0.5).unwrap();

    let (mut resumed_model, mut resumed_optimizer) = trained(4);
    checkpoint::load(&path)
        .unwrap()
        .restore(&mut resumed_model, &mut resumed_optimizer)
        .unwrap();
    fs::remove_file(&path).unwrap();

    let grad = vec![0.1; model.size()];
    let mut a = model.params().to_vec();
    let mut b = resumed_model.params().to_vec();
    optimizer.update_params(&grad, &mut a).unwrap();
    resumed_optimizer.update_params(&grad, &mut b).unwrap();

    assert_eq!(a, b);
}

#[test]
fn missing_file_is_reported() {
    let path = scratch("missing");

    assert!(matches!(
        checkpoint::load(&path),
        Err(MlErr::CheckpointNotFound(p)) if p == path
    ));
}

#[test]
fn corrupt_file_is_reported() {
    let path = scratch("corrupt");
    fs::write(&path, b"definitely not a checkpoint").unwrap();

    let res = checkpoint::load(&path);
    fs::remove_file(&path).unwrap();

    assert!(matches!(res, Err(MlErr::CorruptCheckpoint(_))));
}

#[test]
fn shape_mismatch_is_rejected() {
    let path = scratch("shape");
    let (model, optimizer) = trained(5);
    checkpoint::save(&path, 2, &model, &optimizer, 0.25).unwrap();

    let loaded = checkpoint::load(&path).unwrap();
    fs::remove_file(&path).unwrap();

    let mut rng = StdRng::seed_from_u64(6);
    let mut wider = ClassifierSpec::new(32, 4).build(&mut rng).unwrap();
    let mut wider_optimizer = Adam::with_defaults(wider.size(), 1e-2);
    let before = wider.params().to_vec();

    assert!(matches!(
        loaded.restore(&mut wider, &mut wider_optimizer),
        Err(MlErr::StateMismatch(_))
    ));
    assert_eq!(wider.params(), before.as_slice());
}

#[test]
fn optimizer_kind_mismatch_is_rejected() {
    let path = scratch("optimizer-kind");
    let (model, optimizer) = trained(7);
    checkpoint::save(&path, 2, &model, &optimizer, 0.25).unwrap();

    let loaded = checkpoint::load(&path).unwrap();
    fs::remove_file(&path).unwrap();

    let (mut other, _) = trained(8);
    let mut descent: Box<dyn Optimizer> = Box::new(GradientDescent::new(0.1));
    let before = other.params().to_vec();

    assert!(matches!(
        loaded.restore(&mut other, &mut descent),
        Err(MlErr::StateMismatch(_))
    ));
    assert_eq!(other.params(), before.as_slice());
    assert_ne!(other.params(), model.params());
}
