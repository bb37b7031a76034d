use std::num::NonZeroUsize;

use machine_learning::{
    arch::{ClassifierSpec, Mode, Model, loss::{CrossEntropy, LossFn}},
    data::{DataLoader, Dataset, NUM_CLASSES, SAMPLE_DIM, SyntheticDataset, chunk_argmax},
    optimization::{Adam, GradientDescent, Optimizer},
    training::{Trainer, run_epoch},
};
use rand::{SeedableRng, rngs::StdRng};

fn eval_loss<M: Model>(model: &mut M, dataset: &SyntheticDataset) -> f32 {
    model.set_mode(Mode::Eval);
    let scores = model.forward(dataset.samples().view()).unwrap();
    CrossEntropy::new()
        .loss(scores.view(), dataset.labels().view())
        .unwrap()
}

#[test]
fn generated_labels_match_their_samples() {
    let mut rng = StdRng::seed_from_u64(0);

    for len in [0, 1, 7, 300] {
        let dataset = SyntheticDataset::new(len, &mut rng).unwrap();
        assert_eq!(dataset.len(), len);

        for i in 0..len {
            let (x, y) = dataset.get(i).unwrap();
            assert_eq!(x.len(), SAMPLE_DIM);
            assert!(x.iter().all(|v| (0.0..1.0).contains(v)));
            assert!(y < NUM_CLASSES);
            assert_eq!(y, chunk_argmax(x, NUM_CLASSES));
        }
    }
}

#[test]
fn one_gradient_descent_step_reduces_the_loss() {
    let mut rng = StdRng::seed_from_u64(4);
    let dataset = SyntheticDataset::new(4, &mut rng).unwrap();
    let mut model = ClassifierSpec::new(SAMPLE_DIM, NUM_CLASSES)
        .build(&mut StdRng::seed_from_u64(5))
        .unwrap();

    let before_loss = eval_loss(&mut model, &dataset);
    let before = model.params().to_vec();

    let scores = model.forward(dataset.samples().view()).unwrap();
    let d = CrossEntropy::new()
        .loss_prime(scores.view(), dataset.labels().view())
        .unwrap();
    model.zero_grad();
    model.backward(d).unwrap();
    let grad = model.grad().to_vec();
    model.step(&mut GradientDescent::new(0.01)).unwrap();

    for ((b, a), g) in before.iter().zip(model.params()).zip(&grad) {
        let delta = a - b;

        assert!(delta * g <= 0., "delta {delta} has the sign of gradient {g}");
        if *g == 0. {
            assert_eq!(delta, 0.);
        }
    }

    assert!(grad.iter().any(|&g| g != 0.));
    assert!(eval_loss(&mut model, &dataset) < before_loss);
}

#[test]
fn worker_count_does_not_change_the_batches() {
    let mut rng = StdRng::seed_from_u64(8);
    let dataset = SyntheticDataset::new(103, &mut rng).unwrap();
    let batch_size = NonZeroUsize::new(10).unwrap();

    let sequential = DataLoader::new(dataset.clone(), batch_size).shuffle(true);
    let parallel = DataLoader::new(dataset, batch_size)
        .shuffle(true)
        .workers(3)
        .unwrap();

    let a: Vec<_> = sequential
        .iter(&mut StdRng::seed_from_u64(1))
        .map(Result::unwrap)
        .collect();
    let b: Vec<_> = parallel
        .iter(&mut StdRng::seed_from_u64(1))
        .map(Result::unwrap)
        .collect();

    assert_eq!(a.len(), 11);
    assert_eq!(a, b);
}

#[test]
fn evaluation_passes_are_deterministic() {
    let mut rng = StdRng::seed_from_u64(2);
    let dataset = SyntheticDataset::new(50, &mut rng).unwrap();
    let loader = DataLoader::new(dataset, NonZeroUsize::new(16).unwrap());
    let mut model = ClassifierSpec::new(SAMPLE_DIM, NUM_CLASSES)
        .build(&mut rng)
        .unwrap();

    let mut pass = || {
        run_epoch(
            &mut model,
            loader.iter(&mut rng),
            &CrossEntropy::new(),
            None::<&mut GradientDescent>,
            Mode::Eval,
        )
        .unwrap()
    };

    let first = pass();
    let second = pass();

    assert_eq!(first, second);
    assert_eq!(first.samples, 50);
    assert!((0.0..=1.0).contains(&first.accuracy));
}

#[test]
fn boxed_optimizers_drive_a_trainer() {
    let mut rng = StdRng::seed_from_u64(6);
    let batch_size = NonZeroUsize::new(32).unwrap();
    let train = SyntheticDataset::new(128, &mut rng).unwrap();
    let test = SyntheticDataset::new(40, &mut rng).unwrap();
    let model = ClassifierSpec::new(SAMPLE_DIM, NUM_CLASSES)
        .build(&mut rng)
        .unwrap();

    let optimizers: [Box<dyn Optimizer>; 2] = [
        Box::new(Adam::with_defaults(model.size(), 1e-3)),
        Box::new(GradientDescent::new(1e-2)),
    ];

    for optimizer in optimizers {
        let mut trainer = Trainer::new(
            model.clone(),
            optimizer,
            CrossEntropy::new(),
            DataLoader::new(train.clone(), batch_size)
                .shuffle(true)
                .drop_last(true),
            DataLoader::new(test.clone(), batch_size),
            StdRng::seed_from_u64(7),
        );

        let mut lines = Vec::new();
        let state = trainer.fit(2, |report| lines.push(report.to_string())).unwrap();

        assert_eq!(state.epoch, 2);
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|line| line.split_whitespace().count() == 5));
        assert_ne!(trainer.model().params(), model.params());
    }
}
