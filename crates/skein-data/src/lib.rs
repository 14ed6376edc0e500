//! In-memory tabular data set.
//!
//! The training and model-selection crates depend only on the accessors
//! here: partition index sets, per-partition input/target matrices,
//! descriptives and mutable use flags. File ingestion lives outside the
//! library; anything that can produce a samples-by-variables matrix can
//! feed a [`DataSet`].

mod dataset;

pub use dataset::{DataSet, Partition, SampleUse, VariableUse};
