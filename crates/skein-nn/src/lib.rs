//! Typed layers and the layered neural network.
//!
//! A network is an ordered pipeline of heterogeneous layers, each with its
//! own parameter block and forward/backward contract. Layers are a tagged
//! variant ([`Layer`]) dispatching a shared operation set, and the network
//! exposes one flat parameter vector concatenating every trainable layer's
//! block in layer order.

mod activation;
mod bounding;
mod convolutional;
mod expression;
mod layer;
mod lstm;
mod network;
mod perceptron;
mod persistence;
mod pooling;
mod principal_components;
mod probabilistic;
mod recurrent;
mod scaling;
mod unscaling;

pub use activation::Activation;
pub use bounding::BoundingLayer;
pub use convolutional::ConvolutionalLayer;
pub use layer::{Layer, LayerBackward, LayerForward};
pub use lstm::LongShortTermMemoryLayer;
pub use network::{ForwardState, ModelType, NeuralNetwork};
pub use perceptron::PerceptronLayer;
pub use pooling::{PoolingLayer, PoolingMethod};
pub use principal_components::PrincipalComponentsLayer;
pub use probabilistic::{ProbabilisticLayer, ProbabilisticMethod};
pub use recurrent::RecurrentLayer;
pub use scaling::{ScalingLayer, ScalingMethod};
pub use unscaling::UnscalingLayer;
