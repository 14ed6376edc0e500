use crate::{
    BoundingLayer, ConvolutionalLayer, LongShortTermMemoryLayer, PerceptronLayer, PoolingLayer,
    PrincipalComponentsLayer, ProbabilisticLayer, RecurrentLayer, ScalingLayer, UnscalingLayer,
};
use skein::{Device, Float, Result};
use skein_la::DVec;
use skein_tensor::Tensor;

/// What a layer's forward pass produced for one batch: pre-activation
/// combinations, post-activation activations, and whatever per-kind
/// auxiliary buffers its backward pass needs (recurrent states, gate
/// activations, pooling argmax positions).
#[derive(Debug, Clone)]
pub struct LayerForward {
    pub combinations: Tensor<Float>,
    pub activations: Tensor<Float>,
    pub aux: Vec<Tensor<Float>>,
}

/// What a layer's backward pass produced: the delta handed to the previous
/// layer and this layer's parameter gradient in pack order (empty for
/// non-trainable kinds).
#[derive(Debug, Clone)]
pub struct LayerBackward {
    pub input_delta: Tensor<Float>,
    pub gradient: DVec<Float>,
}

/// Tagged layer variant. The network is a flat ordered vector of these;
/// every operation the network needs dispatches through here.
#[derive(Debug, Clone)]
pub enum Layer {
    Scaling(ScalingLayer),
    Unscaling(UnscalingLayer),
    Bounding(BoundingLayer),
    Perceptron(PerceptronLayer),
    Probabilistic(ProbabilisticLayer),
    Recurrent(RecurrentLayer),
    LongShortTermMemory(LongShortTermMemoryLayer),
    Convolutional(ConvolutionalLayer),
    Pooling(PoolingLayer),
    PrincipalComponents(PrincipalComponentsLayer),
}

impl Layer {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Scaling(_) => "Scaling",
            Self::Unscaling(_) => "Unscaling",
            Self::Bounding(_) => "Bounding",
            Self::Perceptron(_) => "Perceptron",
            Self::Probabilistic(_) => "Probabilistic",
            Self::Recurrent(_) => "Recurrent",
            Self::LongShortTermMemory(_) => "LongShortTermMemory",
            Self::Convolutional(_) => "Convolutional",
            Self::Pooling(_) => "Pooling",
            Self::PrincipalComponents(_) => "PrincipalComponents",
        }
    }

    /// Flattened per-sample input width.
    pub fn inputs_number(&self) -> usize {
        match self {
            Self::Scaling(l) => l.neurons_number(),
            Self::Unscaling(l) => l.neurons_number(),
            Self::Bounding(l) => l.neurons_number(),
            Self::Perceptron(l) => l.inputs_number(),
            Self::Probabilistic(l) => l.inputs_number(),
            Self::Recurrent(l) => l.inputs_number(),
            Self::LongShortTermMemory(l) => l.inputs_number(),
            Self::Convolutional(l) => l.inputs_number(),
            Self::Pooling(l) => l.inputs_number(),
            Self::PrincipalComponents(l) => l.inputs_number(),
        }
    }

    /// Flattened per-sample output width.
    pub fn outputs_number(&self) -> usize {
        match self {
            Self::Scaling(l) => l.neurons_number(),
            Self::Unscaling(l) => l.neurons_number(),
            Self::Bounding(l) => l.neurons_number(),
            Self::Perceptron(l) => l.outputs_number(),
            Self::Probabilistic(l) => l.outputs_number(),
            Self::Recurrent(l) => l.outputs_number(),
            Self::LongShortTermMemory(l) => l.outputs_number(),
            Self::Convolutional(l) => l.outputs_number(),
            Self::Pooling(l) => l.outputs_number(),
            Self::PrincipalComponents(l) => l.outputs_number(),
        }
    }

    /// Number of trainable parameters; a pure function of the layer shape.
    pub fn parameter_count(&self) -> usize {
        match self {
            Self::Perceptron(l) => l.parameter_count(),
            Self::Probabilistic(l) => l.parameter_count(),
            Self::Recurrent(l) => l.parameter_count(),
            Self::LongShortTermMemory(l) => l.parameter_count(),
            Self::Convolutional(l) => l.parameter_count(),
            Self::Scaling(_)
            | Self::Unscaling(_)
            | Self::Bounding(_)
            | Self::Pooling(_)
            | Self::PrincipalComponents(_) => 0,
        }
    }

    pub fn is_trainable(&self) -> bool {
        self.parameter_count() > 0
    }

    /// Copy this layer's parameters into a slice of exactly
    /// `parameter_count()` elements.
    pub fn pack_parameters(&self, out: &mut [Float]) {
        debug_assert_eq!(out.len(), self.parameter_count());
        match self {
            Self::Perceptron(l) => l.pack_parameters(out),
            Self::Probabilistic(l) => l.pack_parameters(out),
            Self::Recurrent(l) => l.pack_parameters(out),
            Self::LongShortTermMemory(l) => l.pack_parameters(out),
            Self::Convolutional(l) => l.pack_parameters(out),
            _ => {}
        }
    }

    /// Inverse of [`pack_parameters`](Self::pack_parameters).
    pub fn unpack_parameters(&mut self, p: &[Float]) {
        debug_assert_eq!(p.len(), self.parameter_count());
        match self {
            Self::Perceptron(l) => l.unpack_parameters(p),
            Self::Probabilistic(l) => l.unpack_parameters(p),
            Self::Recurrent(l) => l.unpack_parameters(p),
            Self::LongShortTermMemory(l) => l.unpack_parameters(p),
            Self::Convolutional(l) => l.unpack_parameters(p),
            _ => {}
        }
    }

    /// Batch forward pass. Pure with respect to parameters.
    pub fn forward(&self, inputs: &Tensor<Float>, device: &Device) -> Result<LayerForward> {
        match self {
            Self::Scaling(l) => l.forward(inputs, device),
            Self::Unscaling(l) => l.forward(inputs, device),
            Self::Bounding(l) => l.forward(inputs, device),
            Self::Perceptron(l) => l.forward(inputs, device),
            Self::Probabilistic(l) => l.forward(inputs, device),
            Self::Recurrent(l) => l.forward(inputs, device),
            Self::LongShortTermMemory(l) => l.forward(inputs, device),
            Self::Convolutional(l) => l.forward(inputs, device),
            Self::Pooling(l) => l.forward(inputs, device),
            Self::PrincipalComponents(l) => l.forward(inputs, device),
        }
    }

    /// Batch backward pass: from the loss gradient with respect to this
    /// layer's activations to the gradient with respect to its inputs and
    /// parameters.
    pub fn backward(
        &self,
        inputs: &Tensor<Float>,
        forward: &LayerForward,
        delta: &Tensor<Float>,
        device: &Device,
    ) -> Result<LayerBackward> {
        match self {
            Self::Scaling(l) => l.backward(inputs, delta, device),
            Self::Unscaling(l) => l.backward(inputs, delta, device),
            Self::Bounding(l) => l.backward(inputs, delta, device),
            Self::Perceptron(l) => l.backward(inputs, forward, delta, device),
            Self::Probabilistic(l) => l.backward(inputs, forward, delta, device),
            Self::Recurrent(l) => l.backward(inputs, forward, delta, device),
            Self::LongShortTermMemory(l) => l.backward(inputs, forward, delta, device),
            Self::Convolutional(l) => l.backward(inputs, forward, delta, device),
            Self::Pooling(l) => l.backward(inputs, forward, delta, device),
            Self::PrincipalComponents(l) => l.backward(inputs, delta, device),
        }
    }
}
