//! XOR smoke run: Levenberg-Marquardt on a 2-2-1 classification stack.
//!
//! ```sh
//! cargo run --example xor -p skein-train
//! ```

use skein::{Device, Float};
use skein_data::{DataSet, SampleUse};
use skein_nn::{ModelType, NeuralNetwork};
use skein_tensor::{Shape, Tensor};
use skein_train::{
    LevenbergMarquardt, LossMethod, OptimizationAlgorithm, TrainingStrategy,
};

fn main() {
    tracing_subscriber::fmt().init();

    // XOR truth table, duplicated so the selection partition is non-empty.
    let mut rows: Vec<Float> = Vec::new();
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

    let mut network = NeuralNetwork::new(ModelType::Classification, &[2, 2, 1], 1).unwrap();
    network
        .set_input_descriptives(data.input_descriptives().unwrap())
        .unwrap();

    let mut optimizer = LevenbergMarquardt::new();
    optimizer.criteria.loss_goal = 1e-3;
    optimizer.criteria.max_epochs = 200;
    let mut strategy = TrainingStrategy::with_optimizer(
        LossMethod::SumSquaredError,
        OptimizationAlgorithm::LevenbergMarquardt(optimizer),
    );
    strategy.set_display(true);

    let device = Device::thread_pool();
    let results = strategy
        .perform_training(&mut network, &data, &device)
        .unwrap();

    println!(
        "stopped: {} after {} epochs, training loss {:.3e}",
        results.stopping_condition.name(),
        results.epochs,
        results.final_training_loss()
    );

    let inputs = Tensor::new(
        vec![0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0],
        Shape::matrix(4, 2),
    );
    let outputs = network.calculate_outputs(&inputs, &device).unwrap();
    for i in 0..4 {
        println!(
            "{} xor {} -> {:.3}",
            inputs.get(&[i, 0]),
            inputs.get(&[i, 1]),
            outputs.get(&[i, 0])
        );
    }
}
