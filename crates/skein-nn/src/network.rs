use crate::{
    Activation, BoundingLayer, Layer, LayerForward, LongShortTermMemoryLayer, PerceptronLayer,
    ProbabilisticLayer, RecurrentLayer, ScalingLayer, UnscalingLayer,
};
use skein::{Device, Error, Float, Result, Rng};
use skein_la::DVec;
use skein_tensor::{Descriptives, Tensor};

/// Hint that selects the default layer stack the convenience constructor
/// builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    Approximation,
    Classification,
    Forecasting,
    ImageApproximation,
    ImageClassification,
}

impl ModelType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Approximation => "Approximation",
            Self::Classification => "Classification",
            Self::Forecasting => "Forecasting",
            Self::ImageApproximation => "ImageApproximation",
            Self::ImageClassification => "ImageClassification",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "Approximation" => Self::Approximation,
            "Classification" => Self::Classification,
            "Forecasting" => Self::Forecasting,
            "ImageApproximation" => Self::ImageApproximation,
            "ImageClassification" => Self::ImageClassification,
            other => {
                return Err(Error::InvalidConfiguration(format!(
                    "unknown model type {other:?}"
                )))
            }
        })
    }

    fn is_regression(self) -> bool {
        matches!(
            self,
            Self::Approximation | Self::Forecasting | Self::ImageApproximation
        )
    }
}

/// Everything one whole-network forward pass produced, retained for
/// back-propagation: the batch inputs and every layer's combinations and
/// activations in layer order.
#[derive(Debug, Clone)]
pub struct ForwardState {
    pub inputs: Tensor<Float>,
    pub layers: Vec<LayerForward>,
}

impl ForwardState {
    /// Activations of the last layer.
    pub fn outputs(&self) -> &Tensor<Float> {
        &self
            .layers
            .last()
            .expect("forward state of an empty network")
            .activations
    }
}

/// Ordered composition of layers with input/output names and a model-type
/// hint. Owns every parameter; the flat parameter vector is a view
/// concatenating the trainable layers' blocks in layer order.
#[derive(Debug, Clone)]
pub struct NeuralNetwork {
    layers: Vec<Layer>,
    inputs_names: Vec<String>,
    outputs_names: Vec<String>,
    model_type: ModelType,
    display: bool,
}

impl NeuralNetwork {
    /// Empty network; layers are appended with [`add_layer`](Self::add_layer).
    pub fn empty(model_type: ModelType) -> Self {
        Self {
            layers: Vec::new(),
            inputs_names: Vec::new(),
            outputs_names: Vec::new(),
            model_type,
            display: false,
        }
    }

    /// Build the default stack for a model type from an architecture
    /// [inputs, hidden..., outputs]:
    ///
    /// - Approximation / ImageApproximation: Scaling, tanh perceptrons,
    ///   linear perceptron, Unscaling, Bounding.
    /// - Classification / ImageClassification: Scaling, tanh perceptrons,
    ///   Probabilistic.
    /// - Forecasting: Scaling, LSTM on the first hidden width, tanh
    ///   perceptrons on the rest, linear perceptron, Unscaling, Bounding.
    pub fn new(model_type: ModelType, architecture: &[usize], seed: u64) -> Result<Self> {
        if architecture.len() < 2 || architecture.contains(&0) {
            return Err(Error::InvalidConfiguration(format!(
                "architecture must list positive [inputs, ..., outputs], got {architecture:?}"
            )));
        }
        let inputs = architecture[0];
        let outputs = *architecture.last().unwrap();
        let hidden = &architecture[1..architecture.len() - 1];
        let mut rng = Rng::new(seed);

        let mut network = Self::empty(model_type);
        network.add_layer(Layer::Scaling(ScalingLayer::new(inputs)))?;

        let mut width = inputs;
        match model_type {
            ModelType::Approximation | ModelType::ImageApproximation => {
                for &h in hidden {
                    network.add_layer(Layer::Perceptron(PerceptronLayer::new(
                        width,
                        h,
                        Activation::HyperbolicTangent,
                        &mut rng,
                    )))?;
                    width = h;
                }
                network.add_layer(Layer::Perceptron(PerceptronLayer::new(
                    width,
                    outputs,
                    Activation::Linear,
                    &mut rng,
                )))?;
                network.add_layer(Layer::Unscaling(UnscalingLayer::new(outputs)))?;
                network.add_layer(Layer::Bounding(BoundingLayer::new(outputs)))?;
            }
            ModelType::Classification | ModelType::ImageClassification => {
                for &h in hidden {
                    network.add_layer(Layer::Perceptron(PerceptronLayer::new(
                        width,
                        h,
                        Activation::HyperbolicTangent,
                        &mut rng,
                    )))?;
                    width = h;
                }
                network.add_layer(Layer::Probabilistic(ProbabilisticLayer::new(
                    width, outputs, &mut rng,
                )))?;
            }
            ModelType::Forecasting => {
                if hidden.is_empty() {
                    return Err(Error::InvalidConfiguration(
                        "forecasting networks need at least one hidden width".into(),
                    ));
                }
                network.add_layer(Layer::LongShortTermMemory(LongShortTermMemoryLayer::new(
                    width, hidden[0], &mut rng,
                )))?;
                width = hidden[0];
                for &h in &hidden[1..] {
                    network.add_layer(Layer::Perceptron(PerceptronLayer::new(
                        width,
                        h,
                        Activation::HyperbolicTangent,
                        &mut rng,
                    )))?;
                    width = h;
                }
                network.add_layer(Layer::Perceptron(PerceptronLayer::new(
                    width,
                    outputs,
                    Activation::Linear,
                    &mut rng,
                )))?;
                network.add_layer(Layer::Unscaling(UnscalingLayer::new(outputs)))?;
                network.add_layer(Layer::Bounding(BoundingLayer::new(outputs)))?;
            }
        }

        network.inputs_names = (0..inputs).map(|i| format!("input_{i}")).collect();
        network.outputs_names = (0..outputs).map(|i| format!("output_{i}")).collect();
        Ok(network)
    }

    /// Append a layer, maintaining the structural invariants: shapes chain,
    /// Scaling appears only at position 0, and nothing follows a Bounding
    /// or Probabilistic layer.
    pub fn add_layer(&mut self, layer: Layer) -> Result<()> {
        if let Some(last) = self.layers.last() {
            if matches!(last, Layer::Bounding(_) | Layer::Probabilistic(_)) {
                return Err(Error::InvalidConfiguration(format!(
                    "cannot add a layer after a terminal {} layer",
                    last.kind_name()
                )));
            }
            if matches!(layer, Layer::Scaling(_)) {
                return Err(Error::InvalidConfiguration(
                    "scaling must be the first layer".into(),
                ));
            }
            if last.outputs_number() != layer.inputs_number() {
                return Err(Error::shape(
                    "NeuralNetwork::add_layer",
                    last.outputs_number(),
                    layer.inputs_number(),
                ));
            }
        }
        self.layers.push(layer);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> &Layer {
        &self.layers[index]
    }

    pub fn layer_mut(&mut self, index: usize) -> &mut Layer {
        &mut self.layers[index]
    }

    pub fn model_type(&self) -> ModelType {
        self.model_type
    }

    pub fn inputs_number(&self) -> usize {
        self.layers.first().map_or(0, Layer::inputs_number)
    }

    pub fn outputs_number(&self) -> usize {
        self.layers.last().map_or(0, Layer::outputs_number)
    }

    /// [inputs, width of each trainable layer...]; the shape the model-type
    /// constructor would need to rebuild this stack.
    pub fn architecture(&self) -> Vec<usize> {
        let mut arch = vec![self.inputs_number()];
        for layer in &self.layers {
            if layer.is_trainable() {
                arch.push(layer.outputs_number());
            }
        }
        arch
    }

    // --- Names ---

    pub fn inputs_names(&self) -> &[String] {
        &self.inputs_names
    }

    pub fn outputs_names(&self) -> &[String] {
        &self.outputs_names
    }

    pub fn set_inputs_names(&mut self, names: Vec<String>) -> Result<()> {
        if names.len() != self.inputs_number() {
            return Err(Error::shape(
                "set_inputs_names",
                self.inputs_number(),
                names.len(),
            ));
        }
        self.inputs_names = names;
        Ok(())
    }

    pub fn set_outputs_names(&mut self, names: Vec<String>) -> Result<()> {
        if names.len() != self.outputs_number() {
            return Err(Error::shape(
                "set_outputs_names",
                self.outputs_number(),
                names.len(),
            ));
        }
        self.outputs_names = names;
        Ok(())
    }

    // --- Display ---

    pub fn display(&self) -> bool {
        self.display
    }

    pub fn set_display(&mut self, display: bool) {
        self.display = display;
    }

    // --- Typed layer accessors used when wiring descriptives ---

    pub fn scaling_layer_mut(&mut self) -> Option<&mut ScalingLayer> {
        self.layers.iter_mut().find_map(|l| match l {
            Layer::Scaling(s) => Some(s),
            _ => None,
        })
    }

    pub fn unscaling_layer_mut(&mut self) -> Option<&mut UnscalingLayer> {
        self.layers.iter_mut().find_map(|l| match l {
            Layer::Unscaling(u) => Some(u),
            _ => None,
        })
    }

    pub fn bounding_layer_mut(&mut self) -> Option<&mut BoundingLayer> {
        self.layers.iter_mut().find_map(|l| match l {
            Layer::Bounding(b) => Some(b),
            _ => None,
        })
    }

    pub fn probabilistic_layer(&self) -> Option<&ProbabilisticLayer> {
        self.layers.iter().find_map(|l| match l {
            Layer::Probabilistic(p) => Some(p),
            _ => None,
        })
    }

    /// Configure the scaling layer from input statistics.
    pub fn set_input_descriptives(&mut self, stats: Vec<Descriptives<Float>>) -> Result<()> {
        match self.scaling_layer_mut() {
            Some(s) => s.set_descriptives(stats),
            None => Err(Error::UnboundReference("scaling layer")),
        }
    }

    /// Configure the unscaling layer from target statistics.
    pub fn set_target_descriptives(&mut self, stats: Vec<Descriptives<Float>>) -> Result<()> {
        match self.unscaling_layer_mut() {
            Some(u) => u.set_descriptives(stats),
            None => Err(Error::UnboundReference("unscaling layer")),
        }
    }

    // --- Flat parameter view ---

    pub fn parameters_number(&self) -> usize {
        self.layers.iter().map(Layer::parameter_count).sum()
    }

    /// Flat parameter vector: every trainable layer's block in layer order.
    pub fn get_parameters(&self) -> DVec<Float> {
        let mut params = DVec::zeros(self.parameters_number());
        let mut offset = 0;
        for layer in &self.layers {
            let count = layer.parameter_count();
            if count > 0 {
                layer.pack_parameters(&mut params.as_mut_slice()[offset..offset + count]);
                offset += count;
            }
        }
        params
    }

    /// Install a flat parameter vector. Exact inverse of
    /// [`get_parameters`](Self::get_parameters).
    pub fn set_parameters(&mut self, params: &DVec<Float>) -> Result<()> {
        if params.len() != self.parameters_number() {
            return Err(Error::shape(
                "NeuralNetwork::set_parameters",
                self.parameters_number(),
                params.len(),
            ));
        }
        let mut offset = 0;
        for layer in &mut self.layers {
            let count = layer.parameter_count();
            if count > 0 {
                layer.unpack_parameters(&params.as_slice()[offset..offset + count]);
                offset += count;
            }
        }
        Ok(())
    }

    /// Rebuild the last hidden layer (and the output layer consuming it)
    /// with a different width and fresh weights. Model selection grows
    /// networks through this.
    pub fn set_hidden_neurons(&mut self, width: usize, seed: u64) -> Result<()> {
        if width == 0 {
            return Err(Error::InvalidConfiguration(
                "hidden width must be positive".into(),
            ));
        }
        let trainable: Vec<usize> = self
            .layers
            .iter()
            .enumerate()
            .filter(|(_, l)| l.is_trainable())
            .map(|(i, _)| i)
            .collect();
        if trainable.len() < 2 {
            return Err(Error::InvalidConfiguration(
                "no hidden layer to resize".into(),
            ));
        }
        let hidden_idx = trainable[trainable.len() - 2];
        let output_idx = trainable[trainable.len() - 1];
        let mut rng = Rng::new(seed);

        let new_hidden = match &self.layers[hidden_idx] {
            Layer::Perceptron(p) => Layer::Perceptron(PerceptronLayer::new(
                p.inputs_number(),
                width,
                p.activation(),
                &mut rng,
            )),
            Layer::Recurrent(r) => Layer::Recurrent(RecurrentLayer::new(
                r.inputs_number(),
                width,
                r.activation(),
                &mut rng,
            )),
            Layer::LongShortTermMemory(l) => Layer::LongShortTermMemory(
                LongShortTermMemoryLayer::new(l.inputs_number(), width, &mut rng),
            ),
            other => {
                return Err(Error::InvalidConfiguration(format!(
                    "cannot resize a {} hidden layer",
                    other.kind_name()
                )))
            }
        };
        let new_output = match &self.layers[output_idx] {
            Layer::Perceptron(p) => Layer::Perceptron(PerceptronLayer::new(
                width,
                p.outputs_number(),
                p.activation(),
                &mut rng,
            )),
            Layer::Probabilistic(p) => {
                let mut layer = ProbabilisticLayer::new(width, p.outputs_number(), &mut rng);
                layer.set_method(p.method());
                layer.set_decision_threshold(p.decision_threshold())?;
                Layer::Probabilistic(layer)
            }
            other => {
                return Err(Error::InvalidConfiguration(format!(
                    "cannot rewire a {} output layer",
                    other.kind_name()
                )))
            }
        };

        self.layers[hidden_idx] = new_hidden;
        self.layers[output_idx] = new_output;
        Ok(())
    }

    // --- Propagation ---

    fn check_non_empty(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::UnboundReference("neural network layers"));
        }
        Ok(())
    }

    /// Whole-network forward pass retaining per-layer state for
    /// back-propagation.
    pub fn forward_propagate(
        &self,
        inputs: &Tensor<Float>,
        device: &Device,
    ) -> Result<ForwardState> {
        self.check_non_empty()?;
        let mut layers: Vec<LayerForward> = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let forward = match layers.last() {
                Some(previous) => layer.forward(&previous.activations, device)?,
                None => layer.forward(inputs, device)?,
            };
            layers.push(forward);
        }
        Ok(ForwardState {
            inputs: inputs.clone(),
            layers,
        })
    }

    /// Inference path; intermediate state is discarded.
    pub fn calculate_outputs(&self, inputs: &Tensor<Float>, device: &Device) -> Result<Tensor<Float>> {
        self.check_non_empty()?;
        let mut current = inputs.clone();
        for layer in &self.layers {
            current = layer.forward(&current, device)?.activations;
        }
        Ok(current)
    }

    /// Whole-network backward pass. `output_delta` is the loss gradient
    /// with respect to the last layer's activations; returns the flat
    /// parameter gradient (pack order) and the delta at the network inputs.
    pub fn backward(
        &self,
        state: &ForwardState,
        output_delta: &Tensor<Float>,
        device: &Device,
    ) -> Result<(DVec<Float>, Tensor<Float>)> {
        self.check_non_empty()?;
        let mut gradient = DVec::zeros(self.parameters_number());
        let mut delta = output_delta.clone();

        // Offsets of each layer's block in the flat gradient.
        let mut offsets = Vec::with_capacity(self.layers.len());
        let mut offset = 0;
        for layer in &self.layers {
            offsets.push(offset);
            offset += layer.parameter_count();
        }

        for i in (0..self.layers.len()).rev() {
            let layer = &self.layers[i];
            let layer_inputs = if i == 0 {
                &state.inputs
            } else {
                &state.layers[i - 1].activations
            };
            let back = layer.backward(layer_inputs, &state.layers[i], &delta, device)?;
            let count = layer.parameter_count();
            if count > 0 {
                gradient.as_mut_slice()[offsets[i]..offsets[i] + count]
                    .copy_from_slice(back.gradient.as_slice());
            }
            delta = back.input_delta;
        }

        Ok((gradient, delta))
    }
}
