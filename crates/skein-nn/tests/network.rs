//! Whole-network integration: manually assembled image and recurrent
//! stacks, flat-parameter round trips, determinism across devices, and
//! persistence of mixed stacks.

use skein::{Device, Float, Rng, TreeNode};
use skein_nn::{
    Activation, BoundingLayer, ConvolutionalLayer, Layer, ModelType, NeuralNetwork,
    PerceptronLayer, PoolingLayer, PoolingMethod, PrincipalComponentsLayer, RecurrentLayer,
    ScalingLayer,
};
use skein_tensor::{Shape, Tensor};

const DEV: Device = Device::SingleThreaded;

fn image_network() -> NeuralNetwork {
    let mut rng = Rng::new(55);
    let mut network = NeuralNetwork::empty(ModelType::ImageClassification);
    // 1-channel 6x6 images: conv -> pool -> dense -> dense.
    let conv = ConvolutionalLayer::new(
        (1, 6, 6),
        2,
        (3, 3),
        (1, 1),
        Activation::HyperbolicTangent,
        &mut rng,
    )
    .unwrap();
    let conv_out = conv.output_shape(); // (2, 4, 4)
    let pool = PoolingLayer::new(conv_out, (2, 2), (2, 2), PoolingMethod::MaxPooling).unwrap();
    let pooled: usize = {
        let (c, h, w) = pool.output_shape();
        c * h * w
    };
    network.add_layer(Layer::Convolutional(conv)).unwrap();
    network.add_layer(Layer::Pooling(pool)).unwrap();
    network
        .add_layer(Layer::Perceptron(PerceptronLayer::new(
            pooled,
            5,
            Activation::HyperbolicTangent,
            &mut rng,
        )))
        .unwrap();
    network
        .add_layer(Layer::Perceptron(PerceptronLayer::new(
            5,
            2,
            Activation::Linear,
            &mut rng,
        )))
        .unwrap();
    network
}

#[test]
fn image_stack_forward_shapes() {
    let network = image_network();
    let images = Tensor::new(
        (0..3 * 36).map(|v| (v % 9) as Float * 0.1).collect(),
        Shape::new(vec![3, 1, 6, 6]),
    );
    let outputs = network.calculate_outputs(&images, &DEV).unwrap();
    assert_eq!(outputs.dims(), &[3, 2]);
}

#[test]
fn image_stack_parameter_roundtrip() {
    let mut network = image_network();
    let params = network.get_parameters();
    // conv: 2 biases + 2*1*3*3 filters; dense: (8*5 + 5) + (5*2 + 2).
    assert_eq!(params.len(), 20 + 45 + 12);
    network.set_parameters(&params).unwrap();
    assert_eq!(network.get_parameters(), params);
}

#[test]
fn image_stack_gradient_matches_central_differences() {
    let mut network = image_network();
    let images = Tensor::new(
        (0..36).map(|v| ((v % 7) as Float - 3.0) * 0.15).collect(),
        Shape::new(vec![1, 1, 6, 6]),
    );

    let state = network.forward_propagate(&images, &DEV).unwrap();
    let delta = Tensor::new(vec![1.0, 1.0], Shape::matrix(1, 2));
    let (gradient, _) = network.backward(&state, &delta, &DEV).unwrap();

    let objective = |network: &NeuralNetwork| -> Float {
        network
            .calculate_outputs(&images, &DEV)
            .unwrap()
            .data()
            .iter()
            .sum()
    };

    let eps = 1e-6;
    let params = network.get_parameters();
    // Spot-check a spread of parameters; the full sweep lives in the layer
    // unit tests.
    for k in (0..params.len()).step_by(17) {
        let mut plus = params.clone();
        plus[k] += eps;
        network.set_parameters(&plus).unwrap();
        let fp = objective(&network);
        let mut minus = params.clone();
        minus[k] -= eps;
        network.set_parameters(&minus).unwrap();
        let fm = objective(&network);
        let numerical = (fp - fm) / (2.0 * eps);
        assert!(
            (numerical - gradient[k]).abs() < 1e-4,
            "parameter {k}: numerical {numerical} vs analytical {}",
            gradient[k]
        );
    }
    network.set_parameters(&params).unwrap();
}

#[test]
fn recurrent_stack_is_deterministic_across_devices() {
    let mut rng = Rng::new(3);
    let mut network = NeuralNetwork::empty(ModelType::Forecasting);
    network.add_layer(Layer::Scaling(ScalingLayer::new(2))).unwrap();
    let mut recurrent = RecurrentLayer::new(2, 4, Activation::HyperbolicTangent, &mut rng);
    recurrent.set_timesteps(3).unwrap();
    network.add_layer(Layer::Recurrent(recurrent)).unwrap();
    network
        .add_layer(Layer::Perceptron(PerceptronLayer::new(
            4,
            1,
            Activation::Linear,
            &mut rng,
        )))
        .unwrap();

    let inputs = Tensor::new(
        (0..12).map(|v| (v as Float * 0.7).sin()).collect(),
        Shape::matrix(6, 2),
    );
    let single = network.calculate_outputs(&inputs, &Device::SingleThreaded).unwrap();
    let pooled = network
        .calculate_outputs(&inputs, &Device::ThreadPool(4))
        .unwrap();
    assert_eq!(single, pooled);
}

#[test]
fn pca_stack_persistence_roundtrip() {
    let mut rng = Rng::new(9);
    let mut network = NeuralNetwork::empty(ModelType::Approximation);
    network.add_layer(Layer::Scaling(ScalingLayer::new(3))).unwrap();
    let basis = Tensor::new(
        vec![0.6, 0.0, 0.8, 0.0, 0.0, 1.0],
        Shape::matrix(3, 2),
    );
    network
        .add_layer(Layer::PrincipalComponents(
            PrincipalComponentsLayer::new(vec![0.5, -0.5, 0.0], basis).unwrap(),
        ))
        .unwrap();
    network
        .add_layer(Layer::Perceptron(PerceptronLayer::new(
            2,
            1,
            Activation::Linear,
            &mut rng,
        )))
        .unwrap();
    let mut bounding = BoundingLayer::new(1);
    bounding.set_bounds(vec![-2.0], vec![2.0]).unwrap();
    network.add_layer(Layer::Bounding(bounding)).unwrap();

    let text = network.to_tree().write();
    let parsed = NeuralNetwork::from_tree(&TreeNode::parse(&text).unwrap()).unwrap();
    assert_eq!(parsed.get_parameters(), network.get_parameters());

    let inputs = Tensor::new(vec![0.3, -0.9, 1.4], Shape::matrix(1, 3));
    assert_eq!(
        parsed.calculate_outputs(&inputs, &DEV).unwrap(),
        network.calculate_outputs(&inputs, &DEV).unwrap()
    );
}

#[test]
fn image_stack_persistence_roundtrip() {
    let network = image_network();
    let text = network.to_tree().write();
    let parsed = NeuralNetwork::from_tree(&TreeNode::parse(&text).unwrap()).unwrap();
    assert_eq!(parsed.get_parameters(), network.get_parameters());

    let images = Tensor::new(
        (0..36).map(|v| (v as Float).cos()).collect(),
        Shape::new(vec![1, 1, 6, 6]),
    );
    assert_eq!(
        parsed.calculate_outputs(&images, &DEV).unwrap(),
        network.calculate_outputs(&images, &DEV).unwrap()
    );
}
