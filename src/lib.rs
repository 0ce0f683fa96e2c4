// Component extraction and linear transformation models

#![doc = include_str!("../README.md")]

pub mod algorithm;
pub mod centering;
pub mod component;
pub mod dataset;
pub mod diagnostics;
pub mod error;
pub mod fastica;
pub mod gha;
pub mod kernel;
pub mod kernel_pca;
pub mod linalg_backends;
pub mod model;
pub mod pca;
pub mod selection;
pub mod stop;
pub mod svd;

pub use algorithm::{Algorithm, ComponentExtractor, Fitted};
pub use component::ComponentVector;
pub use dataset::{Dataset, Field, FieldRole, ValueType};
pub use diagnostics::{ConvergenceDetail, FitReport};
pub use error::{DecompositionError, Result};
pub use fastica::{FastIcaConfig, IcaAlgorithmType, IcaFunction};
pub use gha::GhaConfig;
pub use kernel::Kernel;
pub use kernel_pca::KernelPcaConfig;
pub use model::{
    AlgorithmKind, Applied, ApplyOptions, ComponentWeights, KernelModel, LinearModel, Model, OutputOptions,
    Transformation,
};
pub use pca::PcaConfig;
pub use selection::{CumulativeTable, SelectionPolicy, SoftWarning};
pub use stop::StopHandle;
pub use svd::SvdConfig;

#[cfg(test)]
mod pca_tests;
