use crate::{activation::Activation, error::ConfigurationError};

use super::{
    block::{check_channels, check_dropout},
    Architecture, ConvolutionSpec, LayerSpec,
};

/// Channel schedule between the input and the latent feature map.
pub const DEFAULT_HIDDEN_CHANNELS: [usize; 3] = [256, 512, 1024];

const KERNEL_SIZE: usize = 4;
const ELU_ALPHA: f32 = 0.5;

/// Per-stage description of a down- or up-sampling convolution stack.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvStackConfig {
    pub channels: Vec<usize>,
    pub kernel_sizes: Vec<usize>,
    pub strides: Vec<usize>,
    pub paddings: Vec<usize>,
    pub batchnorm: bool,
    pub dropout: f32,
    pub bias: bool,
}

impl ConvStackConfig {
    /// Stride 2 kernel 4 stages halving extent, then a stride 1 unpadded stage.
    pub fn encoder(hidden: &[usize], out_channels: usize) -> Self {
        let channels = hidden.iter().copied().chain(std::iter::once(out_channels)).collect::<Vec<_>>();
        let n = channels.len();

        Self {
            kernel_sizes: vec![KERNEL_SIZE; n],
            strides: (0..n).map(|i| if i + 1 < n { 2 } else { 1 }).collect(),
            paddings: (0..n).map(|i| if i + 1 < n { 1 } else { 0 }).collect(),
            channels,
            batchnorm: true,
            dropout: 0.1,
            bias: false,
        }
    }

    /// Mirror of [`ConvStackConfig::encoder`], to be used with transposed convolutions.
    pub fn decoder(hidden: &[usize], out_channels: usize) -> Self {
        let channels = hidden.iter().rev().copied().chain(std::iter::once(out_channels)).collect::<Vec<_>>();
        let n = channels.len();

        Self {
            kernel_sizes: vec![KERNEL_SIZE; n],
            strides: (0..n).map(|i| if i == 0 { 1 } else { 2 }).collect(),
            paddings: (0..n).map(|i| if i == 0 { 0 } else { 1 }).collect(),
            channels,
            batchnorm: true,
            dropout: 0.1,
            bias: false,
        }
    }

    pub fn with_regularisation(mut self, batchnorm: bool, dropout: f32) -> Self {
        self.batchnorm = batchnorm;
        self.dropout = dropout;
        self
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        check_channels("channels", &self.channels)?;
        check_dropout(self.dropout)?;

        let expected = self.channels.len();

        for (what, list) in [("kernel_sizes", &self.kernel_sizes), ("strides", &self.strides), ("paddings", &self.paddings)] {
            if list.len() != expected {
                return Err(ConfigurationError::MismatchedLengths { what, expected, got: list.len() });
            }
        }

        if self.kernel_sizes.contains(&0) || self.strides.contains(&0) {
            return Err(ConfigurationError::invalid("kernel_sizes/strides", "must be positive"));
        }

        Ok(())
    }
}

/// Builds a stack where every stage but the last is
/// `Conv -> [Dropout2d] -> [BatchNorm] -> ELU`, and the last is `Conv -> ReLU`.
pub fn conv_stack(
    in_channels: usize,
    config: &ConvStackConfig,
    transposed: bool,
) -> Result<Architecture, ConfigurationError> {
    config.validate()?;

    let mut arch = Architecture::default();
    let mut prev = in_channels;
    let n = config.channels.len();

    for i in 0..n {
        let spec = ConvolutionSpec {
            input_channels: prev,
            output_channels: config.channels[i],
            kernel_size: config.kernel_sizes[i],
            stride: config.strides[i],
            padding: config.paddings[i],
            bias: config.bias,
        };

        arch.push(if transposed { LayerSpec::ConvTranspose(spec) } else { LayerSpec::Conv(spec) });

        if i + 1 < n {
            if config.dropout > 0.0 {
                arch.push(LayerSpec::Dropout { p: config.dropout, spatial: true });
            }

            if config.batchnorm {
                arch.push(LayerSpec::BatchNorm { channels: spec.output_channels });
            }

            arch.push(LayerSpec::Activate(Activation::Elu(ELU_ALPHA)));
        }

        prev = spec.output_channels;
    }

    arch.push(LayerSpec::Activate(Activation::ReLU));

    Ok(arch)
}

pub fn encoder_stack(
    in_channels: usize,
    out_channels: usize,
    hidden: &[usize],
    batchnorm: bool,
    dropout: f32,
) -> Result<Architecture, ConfigurationError> {
    let config = ConvStackConfig::encoder(hidden, out_channels).with_regularisation(batchnorm, dropout);
    conv_stack(in_channels, &config, false)
}

pub fn decoder_stack(
    in_channels: usize,
    out_channels: usize,
    hidden: &[usize],
    batchnorm: bool,
    dropout: f32,
) -> Result<Architecture, ConfigurationError> {
    let config = ConvStackConfig::decoder(hidden, out_channels).with_regularisation(batchnorm, dropout);
    conv_stack(in_channels, &config, true)
}
