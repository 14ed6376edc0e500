//! End-to-end training scenarios: XOR, linear regression recovery, early
//! stopping, cancellation, numerical failure and optimizer sanity checks.

use skein::{CancelToken, Device, Float, Rng};
use skein_data::{DataSet, Partition, SampleUse};
use skein_nn::{ModelType, NeuralNetwork};
use skein_tensor::{Shape, Tensor};
use skein_train::{
    classification_accuracy, confusion_matrix, AdaptiveMomentEstimation, ConjugateGradient,
    EvolutionaryAlgorithm, GradientDescent, LevenbergMarquardt, LossMethod,
    OptimizationAlgorithm, StochasticGradientDescent, StoppingCondition, TrainingStrategy,
};

const DEV: Device = Device::SingleThreaded;

/// XOR truth table duplicated so training and selection both hold the full
/// table.
fn xor_data() -> DataSet {
    let mut rows = Vec::new();
    for _ in 0..2 {
        rows.extend_from_slice(&[
            0.0, 0.0, 0.0, //
            0.0, 1.0, 1.0, //
            1.0, 0.0, 1.0, //
            1.0, 1.0, 0.0,
        ]);
    }
    let mut data = DataSet::from_matrix(Tensor::new(rows, Shape::matrix(8, 3)), 2, 1).unwrap();
    for i in 0..8 {
        data.set_sample_use(
            i,
            if i < 4 {
                SampleUse::Training
            } else {
                SampleUse::Selection
            },
        );
    }
    data
}

fn configure_from_data(network: &mut NeuralNetwork, data: &DataSet) {
    network
        .set_input_descriptives(data.input_descriptives().unwrap())
        .unwrap();
    if network.unscaling_layer_mut().is_some() {
        network
            .set_target_descriptives(data.target_descriptives().unwrap())
            .unwrap();
    }
}

#[test]
fn xor_with_levenberg_marquardt() {
    let data = xor_data();

    // A handful of restarts guards against an unlucky initialization.
    let mut best_loss = Float::INFINITY;
    for seed in 1..=5 {
        let mut network = NeuralNetwork::new(ModelType::Classification, &[2, 2, 1], seed).unwrap();
        configure_from_data(&mut network, &data);

        let mut optimizer = LevenbergMarquardt::new();
        optimizer.criteria.max_epochs = 200;
        optimizer.criteria.loss_goal = 1e-3;
        let mut strategy = TrainingStrategy::with_optimizer(
            LossMethod::SumSquaredError,
            OptimizationAlgorithm::LevenbergMarquardt(optimizer),
        );

        let results = strategy.perform_training(&mut network, &data, &DEV).unwrap();
        assert!(results.epochs <= 200);
        best_loss = best_loss.min(results.final_training_loss());
        if best_loss < 1e-3 {
            return;
        }
    }
    panic!("xor did not reach 1e-3 in 200 epochs from any start, best {best_loss}");
}

#[test]
fn conjugate_gradient_recovers_linear_coefficients() {
    // y = 3*x1 - 2*x2 + 1 over 1000 uniform samples.
    let mut rng = Rng::new(99);
    let samples = 1000;
    let mut rows = Vec::with_capacity(samples * 3);
    for _ in 0..samples {
        let x1 = rng.uniform(-1.0, 1.0) as Float;
        let x2 = rng.uniform(-1.0, 1.0) as Float;
        rows.extend_from_slice(&[x1, x2, 3.0 * x1 - 2.0 * x2 + 1.0]);
    }
    let mut data =
        DataSet::from_matrix(Tensor::new(rows, Shape::matrix(samples, 3)), 2, 1).unwrap();
    data.split_samples_random(0.6, 0.2, 0.2, 4).unwrap();

    let mut network = NeuralNetwork::new(ModelType::Approximation, &[2, 1], 11).unwrap();
    configure_from_data(&mut network, &data);

    let mut optimizer = ConjugateGradient::new();
    optimizer.criteria.max_epochs = 200;
    optimizer.criteria.loss_goal = 1e-10;
    let mut strategy = TrainingStrategy::with_optimizer(
        LossMethod::MeanSquaredError,
        OptimizationAlgorithm::ConjugateGradient(optimizer),
    );
    let results = strategy.perform_training(&mut network, &data, &DEV).unwrap();
    assert!(
        results.final_training_loss() < 1e-3,
        "loss {}",
        results.final_training_loss()
    );

    // Recover the affine coefficients from the trained mapping.
    let at = |x1: Float, x2: Float| {
        let input = Tensor::new(vec![x1, x2], Shape::matrix(1, 2));
        network.calculate_outputs(&input, &DEV).unwrap().get(&[0, 0])
    };
    let intercept = at(0.0, 0.0);
    let a1 = at(1.0, 0.0) - intercept;
    let a2 = at(0.0, 1.0) - intercept;
    assert!((a1 - 3.0).abs() < 0.05, "a1 {a1}");
    assert!((a2 + 2.0).abs() < 0.05, "a2 {a2}");
    assert!((intercept - 1.0).abs() < 0.05, "intercept {intercept}");
}

#[test]
fn early_stopping_fires_when_selection_rises() {
    // Training rows pull toward y = 2x while selection rows want y = -2x,
    // so every training improvement raises the selection loss. The inputs
    // are symmetric around zero, which keeps the bias pinned at zero and
    // the selection loss exactly monotone.
    let mut rows = Vec::new();
    for i in 0..10 {
        let x = (2 * i as i32 - 9) as Float / 9.0;
        rows.extend_from_slice(&[x, 2.0 * x]);
    }
    for i in 0..10 {
        let x = (2 * i as i32 - 9) as Float / 9.0;
        rows.extend_from_slice(&[x, -2.0 * x]);
    }
    let mut data = DataSet::from_matrix(Tensor::new(rows, Shape::matrix(20, 2)), 1, 1).unwrap();
    for i in 0..20 {
        data.set_sample_use(
            i,
            if i < 10 {
                SampleUse::Training
            } else {
                SampleUse::Selection
            },
        );
    }

    let mut network = NeuralNetwork::new(ModelType::Approximation, &[1, 1], 2).unwrap();
    // Start exactly at zero so the first epochs descend smoothly.
    let zeros = skein_la::DVec::zeros(network.parameters_number());
    network.set_parameters(&zeros).unwrap();

    let mut optimizer = GradientDescent::with_fixed_rate(0.01);
    optimizer.criteria.max_epochs = 500;
    optimizer.criteria.max_selection_failures = 5;
    let mut strategy = TrainingStrategy::with_optimizer(
        LossMethod::MeanSquaredError,
        OptimizationAlgorithm::GradientDescent(optimizer),
    );
    let results = strategy.perform_training(&mut network, &data, &DEV).unwrap();

    assert_eq!(
        results.stopping_condition,
        StoppingCondition::SelectionLossIncreases
    );
    assert!(results.epochs < 500, "epochs {}", results.epochs);
    // The counter reached five consecutive rises and not more.
    let n = results.selection_history.len();
    assert!(n >= 6);
    for k in (n - 5)..n {
        assert!(
            results.selection_history[k] > results.selection_history[k - 1],
            "selection loss did not rise at epoch {k}"
        );
    }
}

#[test]
fn precancelled_training_returns_immediately() {
    let data = xor_data();
    let mut network = NeuralNetwork::new(ModelType::Classification, &[2, 2, 1], 1).unwrap();
    let token = CancelToken::new();
    token.cancel();

    let mut strategy = TrainingStrategy::new(LossMethod::MeanSquaredError);
    strategy.set_cancel_token(token);
    let results = strategy.perform_training(&mut network, &data, &DEV).unwrap();
    assert_eq!(results.stopping_condition, StoppingCondition::Cancelled);
    assert_eq!(results.epochs, 0);
}

#[test]
fn cancellation_stops_a_long_run() {
    // A run sized to take far longer than the cancellation delay.
    let mut rng = Rng::new(5);
    let samples = 400;
    let mut rows = Vec::with_capacity(samples * 4);
    for _ in 0..samples {
        let x1 = rng.uniform(-1.0, 1.0) as Float;
        let x2 = rng.uniform(-1.0, 1.0) as Float;
        let x3 = rng.uniform(-1.0, 1.0) as Float;
        rows.extend_from_slice(&[x1, x2, x3, (x1 * x2 + x3).tanh()]);
    }
    let mut data =
        DataSet::from_matrix(Tensor::new(rows, Shape::matrix(samples, 4)), 3, 1).unwrap();
    data.split_samples_random(0.7, 0.2, 0.1, 1).unwrap();

    let mut network = NeuralNetwork::new(ModelType::Approximation, &[3, 16, 1], 8).unwrap();
    configure_from_data(&mut network, &data);

    let mut optimizer = GradientDescent::with_fixed_rate(1e-4);
    optimizer.criteria.max_epochs = 1_000_000;
    let mut strategy = TrainingStrategy::with_optimizer(
        LossMethod::MeanSquaredError,
        OptimizationAlgorithm::GradientDescent(optimizer),
    );

    let token = CancelToken::new();
    strategy.set_cancel_token(token.clone());
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(100));
        token.cancel();
    });

    let results = strategy.perform_training(&mut network, &data, &DEV).unwrap();
    canceller.join().unwrap();

    assert_eq!(results.stopping_condition, StoppingCondition::Cancelled);
    assert!(results.epochs < 1_000_000);
    // The partially-trained parameters stay installed on the network.
    assert_eq!(network.get_parameters(), results.final_parameters);
}

#[test]
fn nan_targets_terminate_with_numerical_failure() {
    let mut rows = vec![0.0; 40];
    rows[3] = Float::NAN;
    let mut data = DataSet::from_matrix(Tensor::new(rows, Shape::matrix(20, 2)), 1, 1).unwrap();
    for i in 0..20 {
        data.set_sample_use(
            i,
            if i < 15 {
                SampleUse::Training
            } else {
                SampleUse::Selection
            },
        );
    }

    let mut network = NeuralNetwork::new(ModelType::Approximation, &[1, 2, 1], 3).unwrap();
    let mut strategy = TrainingStrategy::with_optimizer(
        LossMethod::MeanSquaredError,
        OptimizationAlgorithm::GradientDescent(GradientDescent::with_fixed_rate(0.01)),
    );
    let results = strategy.perform_training(&mut network, &data, &DEV).unwrap();
    assert_eq!(
        results.stopping_condition,
        StoppingCondition::NumericalFailure
    );
}

#[test]
fn gradient_descent_monotone_on_quadratic() {
    // A linear network under sum-squared error is exactly quadratic in its
    // parameters, so a small fixed step must never increase the loss.
    let mut rng = Rng::new(17);
    let mut rows = Vec::new();
    for _ in 0..50 {
        let x = rng.uniform(-1.0, 1.0) as Float;
        rows.extend_from_slice(&[x, 0.5 * x - 0.25]);
    }
    let mut data = DataSet::from_matrix(Tensor::new(rows, Shape::matrix(50, 2)), 1, 1).unwrap();
    data.split_samples_random(0.8, 0.2, 0.0, 2).unwrap();

    let mut network = NeuralNetwork::new(ModelType::Approximation, &[1, 1], 6).unwrap();
    let mut optimizer = GradientDescent::with_fixed_rate(0.005);
    optimizer.criteria.max_epochs = 100;
    let mut strategy = TrainingStrategy::with_optimizer(
        LossMethod::SumSquaredError,
        OptimizationAlgorithm::GradientDescent(optimizer),
    );
    let results = strategy.perform_training(&mut network, &data, &DEV).unwrap();

    for k in 1..results.training_history.len() {
        assert!(
            results.training_history[k] <= results.training_history[k - 1] + 1e-12,
            "loss rose at epoch {k}: {} -> {}",
            results.training_history[k - 1],
            results.training_history[k]
        );
    }
}

fn blob_classification_data(rng: &mut Rng, features: usize, samples: usize) -> DataSet {
    let mut rows = Vec::with_capacity(samples * (features + 1));
    for i in 0..samples {
        let class = i % 2;
        let shift: Float = if class == 1 { 0.8 } else { -0.8 };
        for f in 0..features {
            let center = if f < 5 { shift } else { 0.0 };
            rows.push(center + 0.4 * rng.normal() as Float);
        }
        rows.push(class as Float);
    }
    let mut data = DataSet::from_matrix(
        Tensor::new(rows, Shape::matrix(samples, features + 1)),
        features,
        1,
    )
    .unwrap();
    data.split_samples_random(0.6, 0.2, 0.2, 13).unwrap();
    data
}

#[test]
fn binary_classification_end_to_end() {
    // Thirty features, two Gaussian classes separated along the first five.
    let mut rng = Rng::new(41);
    let data = blob_classification_data(&mut rng, 30, 250);

    let mut network = NeuralNetwork::new(ModelType::Classification, &[30, 7, 1], 3).unwrap();
    configure_from_data(&mut network, &data);

    let mut strategy = TrainingStrategy::new(LossMethod::NormalizedSquaredError);
    strategy.optimizer.criteria_mut().loss_goal = 0.01;
    strategy.optimizer.criteria_mut().max_epochs = 100;
    let results = strategy.perform_training(&mut network, &data, &DEV).unwrap();
    assert!(results.final_training_loss().is_finite());

    let accuracy = classification_accuracy(&network, &data, &DEV).unwrap();
    assert!(accuracy >= 0.9, "accuracy {accuracy}");

    // Confusion rows sum to the per-class counts of the testing partition.
    let matrix = confusion_matrix(&network, &data, &DEV).unwrap();
    let targets = data.target_matrix(Partition::Testing).unwrap();
    let positives = targets.data().iter().filter(|&&v| v > 0.5).count();
    let negatives = targets.dims()[0] - positives;
    assert_eq!(matrix[0].iter().sum::<usize>(), negatives);
    assert_eq!(matrix[1].iter().sum::<usize>(), positives);
}

#[test]
fn sgd_and_adam_reduce_loss() {
    let mut rng = Rng::new(23);
    let data = blob_classification_data(&mut rng, 5, 120);

    for optimizer in [
        OptimizationAlgorithm::StochasticGradientDescent({
            let mut o = StochasticGradientDescent::new();
            o.learning_rate = 0.05;
            o.momentum = 0.9;
            o.batch_size = 16;
            o.criteria.max_epochs = 60;
            o
        }),
        OptimizationAlgorithm::AdaptiveMomentEstimation({
            let mut o = AdaptiveMomentEstimation::new();
            o.learning_rate = 0.01;
            o.batch_size = 16;
            o.criteria.max_epochs = 60;
            o
        }),
    ] {
        let name = optimizer.kind_name();
        let mut network = NeuralNetwork::new(ModelType::Classification, &[5, 4, 1], 9).unwrap();
        configure_from_data(&mut network, &data);
        let mut strategy =
            TrainingStrategy::with_optimizer(LossMethod::CrossEntropyError, optimizer);
        let results = strategy.perform_training(&mut network, &data, &DEV).unwrap();
        let first = results.training_history.first().copied().unwrap();
        let last = results.final_training_loss();
        assert!(
            last < first * 0.5,
            "{name}: loss went from {first} to {last}"
        );
    }
}

#[test]
fn evolutionary_algorithm_improves_fitness_without_gradients() {
    let data = xor_data();
    let mut network = NeuralNetwork::new(ModelType::Classification, &[2, 3, 1], 14).unwrap();
    configure_from_data(&mut network, &data);

    let mut optimizer = EvolutionaryAlgorithm::new();
    optimizer.population_size = 24;
    optimizer.seed = 7;
    optimizer.criteria.max_epochs = 40;
    let mut strategy = TrainingStrategy::with_optimizer(
        LossMethod::SumSquaredError,
        OptimizationAlgorithm::EvolutionaryAlgorithm(optimizer),
    );
    let results = strategy.perform_training(&mut network, &data, &DEV).unwrap();

    assert!(results.gradient_norm_history.is_empty());
    let first = results.training_history.first().copied().unwrap();
    let last = results.final_training_loss();
    assert!(last <= first, "best loss rose from {first} to {last}");
    // Elitism means the per-generation best never gets worse.
    for k in 1..results.training_history.len() {
        assert!(results.training_history[k] <= results.training_history[k - 1] + 1e-12);
    }
}

#[test]
fn weighted_squared_error_defaults_to_class_ratio() {
    let mut rng = Rng::new(77);
    // Imbalanced: 1 positive in 4.
    let samples = 80;
    let mut rows = Vec::new();
    for i in 0..samples {
        let class = usize::from(i % 4 == 0);
        let shift: Float = if class == 1 { 1.0 } else { -1.0 };
        rows.push(shift + 0.3 * rng.normal() as Float);
        rows.push(class as Float);
    }
    let mut data =
        DataSet::from_matrix(Tensor::new(rows, Shape::matrix(samples, 2)), 1, 1).unwrap();
    data.split_samples_random(0.7, 0.3, 0.0, 3).unwrap();

    let mut network = NeuralNetwork::new(ModelType::Classification, &[1, 3, 1], 2).unwrap();
    configure_from_data(&mut network, &data);
    let mut strategy = TrainingStrategy::new(LossMethod::WeightedSquaredError);
    strategy.optimizer.criteria_mut().max_epochs = 30;
    let results = strategy.perform_training(&mut network, &data, &DEV).unwrap();
    assert!(results.final_training_loss().is_finite());
    let positives_weight = strategy.loss_index.positives_weight().unwrap();
    assert!(
        positives_weight > 1.0,
        "minority class should weigh more, got {positives_weight}"
    );
}
