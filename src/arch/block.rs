use crate::{activation::Activation, error::ConfigurationError, shape::Shape};

use super::{Architecture, ConvolutionSpec, LayerSpec};

/// Each branch of a multi-kernel convolution is scaled by this before summing.
pub const COMPOSITE_BRANCH_WEIGHT: f32 = 0.333;

/// A skip-connected unit, `activation(main(x) + shortcut(x))`.
/// An empty shortcut is the identity.
#[derive(Clone, Debug, PartialEq)]
pub struct ResidualBlockSpec {
    pub main: Architecture,
    pub shortcut: Architecture,
    pub activation: Activation,
}

impl ResidualBlockSpec {
    pub fn output_shape(&self, input: Shape) -> Result<Shape, ConfigurationError> {
        let main = self.main.output_shape(input)?;
        let shortcut = self.shortcut.output_shape(input)?;

        if main == shortcut {
            Ok(main)
        } else {
            Err(ConfigurationError::InvalidShape { op: "residual merge", shape: input })
        }
    }

    pub fn num_params(&self) -> usize {
        self.main.num_params() + self.shortcut.num_params()
    }

    pub fn has_identity_shortcut(&self) -> bool {
        self.shortcut.is_empty()
    }
}

pub(super) fn check_dropout(p: f32) -> Result<(), ConfigurationError> {
    if (0.0..1.0).contains(&p) {
        Ok(())
    } else {
        Err(ConfigurationError::invalid("dropout", format!("{p} is not in [0, 1)")))
    }
}

pub(super) fn check_channels(what: &'static str, channels: &[usize]) -> Result<(), ConfigurationError> {
    if channels.is_empty() {
        return Err(ConfigurationError::EmptyList(what));
    }

    if channels.contains(&0) {
        return Err(ConfigurationError::invalid(what, "channel counts must be positive"));
    }

    Ok(())
}

/// Pushes `[dropout] -> [norm] -> activation`, the tail of every inner stage.
fn push_stage_tail(main: &mut Architecture, channels: usize, batchnorm: bool, dropout: f32, activation: Activation) {
    if dropout > 0.0 {
        main.push(LayerSpec::Dropout { p: dropout, spatial: true });
    }

    if batchnorm {
        main.push(LayerSpec::BatchNorm { channels });
    }

    main.push(LayerSpec::Activate(activation));
}

fn shortcut(in_channels: usize, out_channels: usize) -> Architecture {
    let mut shortcut = Architecture::default();

    if in_channels != out_channels {
        shortcut.push(LayerSpec::Conv(ConvolutionSpec::projection(in_channels, out_channels)));
    }

    shortcut
}

/// Builds a residual block of `channels.len()` spatially preserving convolutions.
/// Every convolution but the last is followed by `[Dropout2d] -> [BatchNorm] -> ReLU`;
/// the final ReLU is applied after the shortcut is added.
pub fn residual_block(
    in_channels: usize,
    channels: &[usize],
    kernel_sizes: &[usize],
    batchnorm: bool,
    dropout: f32,
) -> Result<ResidualBlockSpec, ConfigurationError> {
    check_channels("channels", channels)?;
    check_dropout(dropout)?;

    if kernel_sizes.len() != channels.len() {
        return Err(ConfigurationError::MismatchedLengths {
            what: "kernel_sizes",
            expected: channels.len(),
            got: kernel_sizes.len(),
        });
    }

    let mut main = Architecture::default();
    let mut prev = in_channels;

    for (idx, (&out, &kernel_size)) in channels.iter().zip(kernel_sizes.iter()).enumerate() {
        main.push(LayerSpec::Conv(ConvolutionSpec::same(prev, out, kernel_size)?));

        if idx + 1 < channels.len() {
            push_stage_tail(&mut main, out, batchnorm, dropout, Activation::ReLU);
        }

        prev = out;
    }

    Ok(ResidualBlockSpec { main, shortcut: shortcut(in_channels, prev), activation: Activation::ReLU })
}

/// Residual block built from multi-kernel convolutions with leaky activations.
/// Each multi-kernel convolution normalises its own output. `batchnorm` adds a
/// second normalisation to every inner stage tail.
pub fn composite_residual_block(
    in_channels: usize,
    channels: &[usize],
    batchnorm: bool,
    dropout: f32,
) -> Result<ResidualBlockSpec, ConfigurationError> {
    check_channels("channels", channels)?;
    check_dropout(dropout)?;

    let mut main = Architecture::default();
    let mut prev = in_channels;

    for (idx, &out) in channels.iter().enumerate() {
        main.push(LayerSpec::MultiKernelConv { input_channels: prev, output_channels: out, batchnorm: true });

        if idx + 1 < channels.len() {
            push_stage_tail(&mut main, out, batchnorm, dropout, Activation::LeakyReLU);
        }

        prev = out;
    }

    Ok(ResidualBlockSpec { main, shortcut: shortcut(in_channels, prev), activation: Activation::LeakyReLU })
}
