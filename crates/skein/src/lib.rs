//! Core support types shared by every skein crate: scalar abstraction,
//! error model, execution device, seeded rng, persistence tree.

mod cancel;
mod device;
mod error;
mod rng;
mod scalar;
mod tree;

pub use cancel::CancelToken;
pub use device::Device;
pub use error::{Error, Result};
pub use rng::Rng;
pub use scalar::Scalar;
pub use tree::TreeNode;

/// The real type every trainable quantity uses, fixed at build time.
#[cfg(not(feature = "f32"))]
pub type Float = f64;
#[cfg(feature = "f32")]
pub type Float = f32;
