//! Model-selection scenarios: growing inputs recovering a known relevant
//! subset, pruning noise features, incremental neurons, and the genetic
//! driver.

use skein::{Device, Float, Rng};
use skein_data::{DataSet, VariableUse};
use skein_nn::{ModelType, NeuralNetwork};
use skein_tensor::{Shape, Tensor};
use skein_train::{LossMethod, TrainingStrategy};
use skein_select::{
    GeneticInputs, GrowingInputs, IncrementalNeurons, InputsSelectionMethod, ModelSelection,
    PruningInputs,
};

const DEV: Device = Device::SingleThreaded;

/// `features` Gaussian inputs; the target depends only on the columns in
/// `relevant` through fixed coefficients, plus a little noise.
fn subset_regression_data(
    features: usize,
    relevant: &[(usize, Float)],
    samples: usize,
    noise: Float,
    seed: u64,
) -> DataSet {
    let mut rng = Rng::new(seed);
    let mut rows = Vec::with_capacity(samples * (features + 1));
    for _ in 0..samples {
        let xs: Vec<Float> = (0..features).map(|_| rng.normal() as Float).collect();
        let mut y = 0.0;
        for &(column, coefficient) in relevant {
            y += coefficient * xs[column];
        }
        y += noise * rng.normal() as Float;
        rows.extend_from_slice(&xs);
        rows.push(y);
    }
    let mut data = DataSet::from_matrix(
        Tensor::new(rows, Shape::matrix(samples, features + 1)),
        features,
        1,
    )
    .unwrap();
    data.split_samples_random(0.4, 0.3, 0.3, seed ^ 1).unwrap();
    data
}

fn quick_strategy() -> TrainingStrategy {
    let mut strategy = TrainingStrategy::new(LossMethod::MeanSquaredError);
    strategy.optimizer.criteria_mut().max_epochs = 40;
    strategy.optimizer.criteria_mut().loss_goal = 1e-8;
    strategy
}

#[test]
fn growing_inputs_recovers_relevant_subset() {
    // Ten features, truth depends on {2, 5, 7}.
    let relevant = [(2usize, 1.0), (5usize, -2.0), (7usize, 1.5)];
    let mut data = subset_regression_data(10, &relevant, 100, 0.2, 31);

    // Full-feature baseline for the comparison below.
    let mut baseline_strategy = quick_strategy();
    let mut baseline_network = NeuralNetwork::new(ModelType::Approximation, &[10, 1], 5).unwrap();
    baseline_network
        .set_input_descriptives(data.input_descriptives().unwrap())
        .unwrap();
    baseline_network
        .set_target_descriptives(data.target_descriptives().unwrap())
        .unwrap();
    let baseline = baseline_strategy
        .perform_training(&mut baseline_network, &data, &DEV)
        .unwrap();
    let baseline_selection = baseline.final_selection_loss();

    let mut network = NeuralNetwork::new(ModelType::Approximation, &[10, 1], 5).unwrap();
    let mut strategy = quick_strategy();
    let mut driver = GrowingInputs::new();
    driver.max_selection_failures = 2;
    driver.seed = 9;
    let results = driver
        .perform(&mut network, &mut strategy, &mut data, &DEV)
        .unwrap();

    let best = results.best();
    for (column, _) in relevant {
        assert!(
            best.inputs.contains(&column),
            "relevant input {column} missing from {:?}",
            best.inputs
        );
    }
    assert!(
        best.selection_loss < baseline_selection,
        "subset {:?} selection loss {} did not beat the full-feature baseline {}",
        best.inputs,
        best.selection_loss,
        baseline_selection
    );

    // The winning subset is applied to the data set and the network.
    assert_eq!(data.input_indices(), best.inputs);
    assert_eq!(network.inputs_number(), best.inputs.len());
}

#[test]
fn pruning_inputs_drops_noise_features() {
    // Four features, truth depends on {0, 1}.
    let relevant = [(0usize, 2.0), (1usize, -1.0)];
    let mut data = subset_regression_data(4, &relevant, 90, 0.2, 13);

    let mut network = NeuralNetwork::new(ModelType::Approximation, &[4, 1], 2).unwrap();
    let mut strategy = quick_strategy();
    let mut driver = PruningInputs::new();
    driver.max_selection_failures = 2;
    driver.seed = 4;
    let results = driver
        .perform(&mut network, &mut strategy, &mut data, &DEV)
        .unwrap();

    let best = results.best();
    for (column, _) in relevant {
        assert!(
            best.inputs.contains(&column),
            "relevant input {column} pruned away: {:?}",
            best.inputs
        );
    }
    assert_eq!(data.input_indices(), best.inputs);
    // The first candidate is the full-set baseline.
    assert_eq!(results.candidates[0].inputs, vec![0, 1, 2, 3]);
}

#[test]
fn incremental_neurons_picks_a_width_and_applies_it() {
    // A target with curvature, so width matters.
    let mut rng = Rng::new(8);
    let samples = 120;
    let mut rows = Vec::with_capacity(samples * 2);
    for _ in 0..samples {
        let x = rng.uniform(-2.0, 2.0) as Float;
        rows.extend_from_slice(&[x, (1.5 * x).tanh()]);
    }
    let mut data =
        DataSet::from_matrix(Tensor::new(rows, Shape::matrix(samples, 2)), 1, 1).unwrap();
    data.split_samples_random(0.5, 0.25, 0.25, 21).unwrap();

    let mut network = NeuralNetwork::new(ModelType::Approximation, &[1, 1, 1], 3).unwrap();
    network
        .set_input_descriptives(data.input_descriptives().unwrap())
        .unwrap();
    network
        .set_target_descriptives(data.target_descriptives().unwrap())
        .unwrap();

    let mut strategy = quick_strategy();
    let mut driver = IncrementalNeurons::new();
    driver.maximum_neurons = 5;
    driver.max_selection_failures = 3;
    driver.seed = 17;
    let results = driver
        .perform(&mut network, &mut strategy, &data, &DEV)
        .unwrap();

    assert!(!results.candidates.is_empty());
    let best = results.best();
    for candidate in &results.candidates {
        assert!(best.selection_loss <= candidate.selection_loss);
    }
    // The winner is installed: architecture and parameters match.
    assert_eq!(network.architecture(), vec![1, best.neurons, 1]);
    assert_eq!(network.get_parameters(), best.parameters);
}

#[test]
fn genetic_inputs_keeps_the_signal_columns() {
    let relevant = [(1usize, 2.0), (3usize, -1.5)];
    let mut data = subset_regression_data(5, &relevant, 80, 0.1, 3);

    let mut network = NeuralNetwork::new(ModelType::Approximation, &[5, 1], 1).unwrap();
    let mut strategy = quick_strategy();
    let mut driver = GeneticInputs::new();
    driver.population_size = 8;
    driver.max_generations = 4;
    driver.mutation_rate = 0.15;
    driver.seed = 6;
    let results = driver
        .perform(&mut network, &mut strategy, &mut data, &DEV)
        .unwrap();

    let best = results.best();
    for (column, _) in relevant {
        assert!(
            best.inputs.contains(&column),
            "relevant input {column} missing from {:?}",
            best.inputs
        );
    }
    // The first evaluated mask is the full set; the optimum can only be at
    // least as good.
    assert!(best.selection_loss <= results.candidates[0].selection_loss);
    assert_eq!(data.input_indices(), best.inputs);
}

#[test]
fn unused_columns_are_restored_on_driver_failure() {
    // An empty selection partition makes every candidate training fail
    // fatally; the driver must restore the variable uses it touched.
    let relevant = [(0usize, 1.0)];
    let mut data = subset_regression_data(3, &relevant, 30, 0.1, 2);
    for i in 0..30 {
        data.set_sample_use(i, skein_data::SampleUse::Training);
    }

    let mut network = NeuralNetwork::new(ModelType::Approximation, &[3, 1], 1).unwrap();
    let mut strategy = quick_strategy();
    let driver = GrowingInputs::new();
    let outcome = driver.perform(&mut network, &mut strategy, &mut data, &DEV);
    assert!(outcome.is_err());
    assert_eq!(
        data.input_indices(),
        vec![0, 1, 2],
        "variable uses were not restored"
    );
    assert!(data
        .input_indices()
        .iter()
        .all(|&c| data.variable_use(c) == VariableUse::Input));
}

#[test]
fn model_selection_facade_runs_both_loops() {
    let relevant = [(1usize, 1.0), (2usize, -1.0)];
    let mut data = subset_regression_data(4, &relevant, 80, 0.15, 19);

    let mut network = NeuralNetwork::new(ModelType::Approximation, &[4, 2, 1], 7).unwrap();
    let mut strategy = quick_strategy();

    let mut selection = ModelSelection::new();
    selection.neurons_selection.maximum_neurons = 3;
    selection.neurons_selection.max_selection_failures = 2;
    selection.inputs_selection = InputsSelectionMethod::GrowingInputs({
        let mut driver = GrowingInputs::new();
        driver.max_selection_failures = 2;
        driver
    });

    let (inputs, neurons) = selection
        .perform_model_selection(&mut network, &mut strategy, &mut data, &DEV)
        .unwrap();
    assert!(!inputs.candidates.is_empty());
    assert!(!neurons.candidates.is_empty());
    assert_eq!(network.inputs_number(), inputs.best().inputs.len());
    assert_eq!(
        network.architecture()[1],
        neurons.best().neurons,
        "the neurons optimum is installed"
    );
}
