//! Tree persistence for networks: `<NeuralNetwork>` with one element per
//! layer, scalar/enum fields by name and a flat `Parameters` leaf per
//! trainable layer. Round-trips are exact.

use crate::scaling::ScalingMethod;
use crate::{
    Activation, BoundingLayer, ConvolutionalLayer, Layer, LongShortTermMemoryLayer, ModelType,
    NeuralNetwork, PerceptronLayer, PoolingLayer, PoolingMethod, PrincipalComponentsLayer,
    ProbabilisticLayer, ProbabilisticMethod, RecurrentLayer, ScalingLayer, UnscalingLayer,
};
use skein::{Error, Float, Result, Rng, TreeNode};
use skein_tensor::{Descriptives, Shape, Tensor};

fn floats(values: &[Float]) -> Vec<f64> {
    values.iter().map(|&v| v as f64).collect()
}

fn parameters_leaf(layer: &Layer) -> TreeNode {
    let mut packed = vec![0.0 as Float; layer.parameter_count()];
    layer.pack_parameters(&mut packed);
    TreeNode::float_list_leaf("Parameters", &floats(&packed))
}

fn unpack_from(node: &TreeNode, layer: &mut Layer) -> Result<()> {
    let params = node.parse_float_list("Parameters")?;
    if params.len() != layer.parameter_count() {
        return Err(Error::shape(
            "layer Parameters",
            layer.parameter_count(),
            params.len(),
        ));
    }
    let packed: Vec<Float> = params.iter().map(|&v| v as Float).collect();
    layer.unpack_parameters(&packed);
    Ok(())
}

fn descriptives_into(node: &mut TreeNode, stats: &[Descriptives<Float>]) {
    let column = |f: fn(&Descriptives<Float>) -> Float| -> Vec<f64> {
        stats.iter().map(|d| f(d) as f64).collect()
    };
    node.push(TreeNode::float_list_leaf("Minimums", &column(|d| d.minimum)));
    node.push(TreeNode::float_list_leaf("Maximums", &column(|d| d.maximum)));
    node.push(TreeNode::float_list_leaf("Means", &column(|d| d.mean)));
    node.push(TreeNode::float_list_leaf(
        "StandardDeviations",
        &column(|d| d.standard_deviation),
    ));
}

fn descriptives_from(node: &TreeNode) -> Result<Vec<Descriptives<Float>>> {
    let minimums = node.parse_float_list("Minimums")?;
    let maximums = node.parse_float_list("Maximums")?;
    let means = node.parse_float_list("Means")?;
    let deviations = node.parse_float_list("StandardDeviations")?;
    if maximums.len() != minimums.len()
        || means.len() != minimums.len()
        || deviations.len() != minimums.len()
    {
        return Err(Error::InvalidConfiguration(
            "descriptives lists have mismatched lengths".into(),
        ));
    }
    Ok((0..minimums.len())
        .map(|j| Descriptives {
            minimum: minimums[j] as Float,
            maximum: maximums[j] as Float,
            mean: means[j] as Float,
            standard_deviation: deviations[j] as Float,
        })
        .collect())
}

fn names_into(tag: &str, names: &[String]) -> TreeNode {
    let mut node = TreeNode::new(tag);
    for name in names {
        node.push(TreeNode::leaf("Name", name));
    }
    node
}

fn names_from(node: &TreeNode) -> Vec<String> {
    node.children()
        .iter()
        .filter(|c| c.name() == "Name")
        .map(|c| c.value().unwrap_or("").to_string())
        .collect()
}

fn layer_to_tree(layer: &Layer) -> TreeNode {
    let mut node = TreeNode::new(layer.kind_name());
    match layer {
        Layer::Scaling(l) => {
            node.push(TreeNode::leaf("Neurons", l.neurons_number()));
            node.push(TreeNode::leaf("Method", l.method().name()));
            descriptives_into(&mut node, l.descriptives());
        }
        Layer::Unscaling(l) => {
            node.push(TreeNode::leaf("Neurons", l.neurons_number()));
            node.push(TreeNode::leaf("Method", l.method().name()));
            descriptives_into(&mut node, l.descriptives());
        }
        Layer::Bounding(l) => {
            node.push(TreeNode::leaf("Neurons", l.neurons_number()));
            node.push(TreeNode::float_list_leaf(
                "LowerBounds",
                &floats(l.lower_bounds()),
            ));
            node.push(TreeNode::float_list_leaf(
                "UpperBounds",
                &floats(l.upper_bounds()),
            ));
        }
        Layer::Perceptron(l) => {
            node.push(TreeNode::leaf("Inputs", l.inputs_number()));
            node.push(TreeNode::leaf("Neurons", l.outputs_number()));
            node.push(TreeNode::leaf("Activation", l.activation().name()));
            node.push(parameters_leaf(layer));
        }
        Layer::Probabilistic(l) => {
            node.push(TreeNode::leaf("Inputs", l.inputs_number()));
            node.push(TreeNode::leaf("Neurons", l.outputs_number()));
            node.push(TreeNode::leaf("Method", l.method().name()));
            node.push(TreeNode::float_leaf(
                "DecisionThreshold",
                l.decision_threshold() as f64,
            ));
            node.push(parameters_leaf(layer));
        }
        Layer::Recurrent(l) => {
            node.push(TreeNode::leaf("Inputs", l.inputs_number()));
            node.push(TreeNode::leaf("Neurons", l.outputs_number()));
            node.push(TreeNode::leaf("Timesteps", l.timesteps()));
            node.push(TreeNode::leaf("Activation", l.activation().name()));
            node.push(parameters_leaf(layer));
        }
        Layer::LongShortTermMemory(l) => {
            node.push(TreeNode::leaf("Inputs", l.inputs_number()));
            node.push(TreeNode::leaf("Neurons", l.outputs_number()));
            node.push(TreeNode::leaf("Timesteps", l.timesteps()));
            node.push(TreeNode::leaf("Activation", l.activation().name()));
            node.push(parameters_leaf(layer));
        }
        Layer::Convolutional(l) => {
            let (c, h, w) = l.input_shape();
            node.push(TreeNode::leaf("InputShape", format!("{c} {h} {w}")));
            node.push(TreeNode::leaf("Filters", l.filters_number()));
            let (kh, kw) = l.kernel();
            node.push(TreeNode::leaf("Kernel", format!("{kh} {kw}")));
            let (sh, sw) = l.stride();
            node.push(TreeNode::leaf("Stride", format!("{sh} {sw}")));
            node.push(TreeNode::leaf("Activation", l.activation().name()));
            node.push(parameters_leaf(layer));
        }
        Layer::Pooling(l) => {
            let (c, h, w) = l.input_shape();
            node.push(TreeNode::leaf("InputShape", format!("{c} {h} {w}")));
            let (ph, pw) = l.pool_size();
            node.push(TreeNode::leaf("Pool", format!("{ph} {pw}")));
            let (sh, sw) = l.stride();
            node.push(TreeNode::leaf("Stride", format!("{sh} {sw}")));
            node.push(TreeNode::leaf("Method", l.method().name()));
        }
        Layer::PrincipalComponents(l) => {
            node.push(TreeNode::leaf("Inputs", l.inputs_number()));
            node.push(TreeNode::leaf("Components", l.outputs_number()));
            node.push(TreeNode::float_list_leaf(
                "Means",
                &floats(l.means().as_slice()),
            ));
            node.push(TreeNode::float_list_leaf("Basis", &floats(l.basis().data())));
        }
    }
    node
}

fn parse_pair(node: &TreeNode, tag: &str) -> Result<(usize, usize)> {
    let raw = node.require(tag)?.value().unwrap_or("");
    let parts: Vec<usize> = raw
        .split_whitespace()
        .map(|t| {
            t.parse()
                .map_err(|_| Error::InvalidConfiguration(format!("{tag}: bad value {t:?}")))
        })
        .collect::<Result<_>>()?;
    if parts.len() != 2 {
        return Err(Error::InvalidConfiguration(format!(
            "{tag}: expected two values"
        )));
    }
    Ok((parts[0], parts[1]))
}

fn parse_triple(node: &TreeNode, tag: &str) -> Result<(usize, usize, usize)> {
    let raw = node.require(tag)?.value().unwrap_or("");
    let parts: Vec<usize> = raw
        .split_whitespace()
        .map(|t| {
            t.parse()
                .map_err(|_| Error::InvalidConfiguration(format!("{tag}: bad value {t:?}")))
        })
        .collect::<Result<_>>()?;
    if parts.len() != 3 {
        return Err(Error::InvalidConfiguration(format!(
            "{tag}: expected three values"
        )));
    }
    Ok((parts[0], parts[1], parts[2]))
}

fn layer_from_tree(node: &TreeNode) -> Result<Layer> {
    let mut rng = Rng::new(0);
    match node.name() {
        "Scaling" => {
            let neurons: usize = node.parse_child("Neurons")?;
            let mut layer = ScalingLayer::new(neurons);
            layer.set_method(ScalingMethod::from_name(
                node.require("Method")?.value().unwrap_or(""),
            )?);
            layer.set_descriptives(descriptives_from(node)?)?;
            Ok(Layer::Scaling(layer))
        }
        "Unscaling" => {
            let neurons: usize = node.parse_child("Neurons")?;
            let mut layer = UnscalingLayer::new(neurons);
            layer.set_method(ScalingMethod::from_name(
                node.require("Method")?.value().unwrap_or(""),
            )?);
            layer.set_descriptives(descriptives_from(node)?)?;
            Ok(Layer::Unscaling(layer))
        }
        "Bounding" => {
            let neurons: usize = node.parse_child("Neurons")?;
            let mut layer = BoundingLayer::new(neurons);
            let lower: Vec<Float> = node
                .parse_float_list("LowerBounds")?
                .iter()
                .map(|&v| v as Float)
                .collect();
            let upper: Vec<Float> = node
                .parse_float_list("UpperBounds")?
                .iter()
                .map(|&v| v as Float)
                .collect();
            layer.set_bounds(lower, upper)?;
            Ok(Layer::Bounding(layer))
        }
        "Perceptron" => {
            let inputs: usize = node.parse_child("Inputs")?;
            let neurons: usize = node.parse_child("Neurons")?;
            let activation =
                Activation::from_name(node.require("Activation")?.value().unwrap_or(""))?;
            let mut layer =
                Layer::Perceptron(PerceptronLayer::new(inputs, neurons, activation, &mut rng));
            unpack_from(node, &mut layer)?;
            Ok(layer)
        }
        "Probabilistic" => {
            let inputs: usize = node.parse_child("Inputs")?;
            let neurons: usize = node.parse_child("Neurons")?;
            let mut inner = ProbabilisticLayer::new(inputs, neurons, &mut rng);
            inner.set_method(ProbabilisticMethod::from_name(
                node.require("Method")?.value().unwrap_or(""),
            )?);
            inner.set_decision_threshold(node.parse_child::<f64>("DecisionThreshold")? as Float)?;
            let mut layer = Layer::Probabilistic(inner);
            unpack_from(node, &mut layer)?;
            Ok(layer)
        }
        "Recurrent" => {
            let inputs: usize = node.parse_child("Inputs")?;
            let neurons: usize = node.parse_child("Neurons")?;
            let activation =
                Activation::from_name(node.require("Activation")?.value().unwrap_or(""))?;
            let mut inner = RecurrentLayer::new(inputs, neurons, activation, &mut rng);
            inner.set_timesteps(node.parse_child("Timesteps")?)?;
            let mut layer = Layer::Recurrent(inner);
            unpack_from(node, &mut layer)?;
            Ok(layer)
        }
        "LongShortTermMemory" => {
            let inputs: usize = node.parse_child("Inputs")?;
            let neurons: usize = node.parse_child("Neurons")?;
            let mut inner = LongShortTermMemoryLayer::new(inputs, neurons, &mut rng);
            inner.set_timesteps(node.parse_child("Timesteps")?)?;
            inner.set_activation(Activation::from_name(
                node.require("Activation")?.value().unwrap_or(""),
            )?);
            let mut layer = Layer::LongShortTermMemory(inner);
            unpack_from(node, &mut layer)?;
            Ok(layer)
        }
        "Convolutional" => {
            let input_shape = parse_triple(node, "InputShape")?;
            let filters: usize = node.parse_child("Filters")?;
            let kernel = parse_pair(node, "Kernel")?;
            let stride = parse_pair(node, "Stride")?;
            let activation =
                Activation::from_name(node.require("Activation")?.value().unwrap_or(""))?;
            let mut layer = Layer::Convolutional(ConvolutionalLayer::new(
                input_shape,
                filters,
                kernel,
                stride,
                activation,
                &mut rng,
            )?);
            unpack_from(node, &mut layer)?;
            Ok(layer)
        }
        "Pooling" => {
            let input_shape = parse_triple(node, "InputShape")?;
            let pool = parse_pair(node, "Pool")?;
            let stride = parse_pair(node, "Stride")?;
            let method = PoolingMethod::from_name(node.require("Method")?.value().unwrap_or(""))?;
            Ok(Layer::Pooling(PoolingLayer::new(
                input_shape,
                pool,
                stride,
                method,
            )?))
        }
        "PrincipalComponents" => {
            let inputs: usize = node.parse_child("Inputs")?;
            let components: usize = node.parse_child("Components")?;
            let means: Vec<Float> = node
                .parse_float_list("Means")?
                .iter()
                .map(|&v| v as Float)
                .collect();
            let basis_values: Vec<Float> = node
                .parse_float_list("Basis")?
                .iter()
                .map(|&v| v as Float)
                .collect();
            if basis_values.len() != inputs * components {
                return Err(Error::shape(
                    "PrincipalComponents Basis",
                    inputs * components,
                    basis_values.len(),
                ));
            }
            let basis = Tensor::new(basis_values, Shape::matrix(inputs, components));
            Ok(Layer::PrincipalComponents(PrincipalComponentsLayer::new(
                means, basis,
            )?))
        }
        other => Err(Error::InvalidConfiguration(format!(
            "unknown layer kind {other:?}"
        ))),
    }
}

impl NeuralNetwork {
    /// Serialize under a `NeuralNetwork` root element.
    pub fn to_tree(&self) -> TreeNode {
        let mut root = TreeNode::new("NeuralNetwork");
        root.push(TreeNode::leaf("ModelType", self.model_type().name()));
        root.push(names_into("InputsNames", self.inputs_names()));
        root.push(names_into("OutputsNames", self.outputs_names()));
        let mut layers = TreeNode::new("Layers");
        for layer in self.layers() {
            layers.push(layer_to_tree(layer));
        }
        root.push(layers);
        root
    }

    /// Inverse of [`to_tree`](Self::to_tree).
    pub fn from_tree(root: &TreeNode) -> Result<Self> {
        if root.name() != "NeuralNetwork" {
            return Err(Error::InvalidConfiguration(format!(
                "expected NeuralNetwork element, found {}",
                root.name()
            )));
        }
        let model_type = ModelType::from_name(root.require("ModelType")?.value().unwrap_or(""))?;
        let mut network = NeuralNetwork::empty(model_type);
        for layer_node in root.require("Layers")?.children() {
            network.add_layer(layer_from_tree(layer_node)?)?;
        }
        if let Some(names) = root.child("InputsNames") {
            let names = names_from(names);
            if !names.is_empty() {
                network.set_inputs_names(names)?;
            }
        }
        if let Some(names) = root.child("OutputsNames") {
            let names = names_from(names);
            if !names.is_empty() {
                network.set_outputs_names(names)?;
            }
        }
        Ok(network)
    }
}
