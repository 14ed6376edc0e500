//! Growing-inputs demo: ten Gaussian features, three of which carry the
//! signal, and a forward-selection loop that finds them.
//!
//! ```sh
//! cargo run --example growing_inputs -p skein-select
//! ```

use skein::{Device, Float, Rng};
use skein_data::DataSet;
use skein_nn::{ModelType, NeuralNetwork};
use skein_select::GrowingInputs;
use skein_tensor::{Shape, Tensor};
use skein_train::{LossMethod, TrainingStrategy};

fn main() {
    tracing_subscriber::fmt().init();

    let features = 10;
    let samples = 200;
    let mut rng = Rng::new(2024);
    let mut rows = Vec::with_capacity(samples * (features + 1));
    for _ in 0..samples {
        let xs: Vec<Float> = (0..features).map(|_| rng.normal() as Float).collect();
        let y = xs[2] - 2.0 * xs[5] + 1.5 * xs[7] + 0.2 * rng.normal() as Float;
        rows.extend_from_slice(&xs);
        rows.push(y);
    }
    let mut data = DataSet::from_matrix(
        Tensor::new(rows, Shape::matrix(samples, features + 1)),
        features,
        1,
    )
    .unwrap();
    data.split_samples_random(0.5, 0.25, 0.25, 1).unwrap();

    let mut network = NeuralNetwork::new(ModelType::Approximation, &[features, 1], 7).unwrap();
    let mut strategy = TrainingStrategy::new(LossMethod::MeanSquaredError);
    strategy.optimizer.criteria_mut().max_epochs = 50;

    let mut driver = GrowingInputs::new();
    driver.max_selection_failures = 2;
    driver.display = true;

    let device = Device::thread_pool();
    let results = driver
        .perform(&mut network, &mut strategy, &mut data, &device)
        .unwrap();

    let best = results.best();
    println!(
        "selected inputs {:?} with selection loss {:.4e} ({} candidates tried)",
        best.inputs,
        best.selection_loss,
        results.candidates.len()
    );
    println!("deployment expression:\n{}", network.write_expression().unwrap());
}
