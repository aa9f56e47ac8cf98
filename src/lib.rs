//! Assembles convolutional classifiers and variational autoencoders from a
//! handful of configuration values, tracking feature-map shapes as it goes.

pub mod activation;
pub mod arch;
pub mod backend;
pub mod classifier;
pub mod error;
pub mod logger;
pub mod loss;
pub mod network;
pub mod rng;
pub mod shape;
pub mod tensor;
pub mod vae;

pub use activation::Activation;
pub use arch::{Architecture, BlockStrategy, Downsample, LayerSpec};
pub use classifier::{build_classifier, ClassifierArchitecture, ClassifierConfig, ConvClassifier};
pub use error::{ConfigurationError, Error, Result, ShapeMismatchError};
pub use loss::{vae_loss, vae_loss_backward, VaeLoss, VaeLossGradients};
pub use network::{ExecutionContext, Network};
pub use shape::Shape;
pub use tensor::Tensor;
pub use vae::{LatentDistribution, LatentSample, Vae, VaeConfig, VaeOutput};
