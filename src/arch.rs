mod block;
mod builder;
mod codec;

pub use block::{composite_residual_block, residual_block, ResidualBlockSpec, COMPOSITE_BRANCH_WEIGHT};
pub use builder::{build_classifier_head, build_feature_extractor, BlockStrategy, Downsample, FeatureOptions};
pub use codec::{conv_stack, decoder_stack, encoder_stack, ConvStackConfig, DEFAULT_HIDDEN_CHANNELS};

use crate::{
    activation::Activation,
    error::ConfigurationError,
    shape::{ConvolutionDescription, PoolDescription, Shape},
};

/// Parameters of a square-kernel convolution, independent of input extent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConvolutionSpec {
    pub input_channels: usize,
    pub output_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
    pub bias: bool,
}

impl ConvolutionSpec {
    /// Stride 1 convolution padded by `kernel_size / 2`, so that spatial
    /// extent is preserved. Requires an odd kernel size.
    pub fn same(input_channels: usize, output_channels: usize, kernel_size: usize) -> Result<Self, ConfigurationError> {
        if kernel_size % 2 == 0 {
            return Err(ConfigurationError::EvenKernelSize(kernel_size));
        }

        Ok(Self { input_channels, output_channels, kernel_size, stride: 1, padding: kernel_size / 2, bias: true })
    }

    /// Bias-free 1x1 convolution used to match channel counts on a shortcut.
    pub fn projection(input_channels: usize, output_channels: usize) -> Self {
        Self { input_channels, output_channels, kernel_size: 1, stride: 1, padding: 0, bias: false }
    }

    pub fn describe(&self, input: Shape, transposed: bool) -> Result<ConvolutionDescription, ConfigurationError> {
        let op = if transposed { "transposed convolution" } else { "convolution" };

        if input.channels() != self.input_channels {
            return Err(ConfigurationError::InvalidShape { op, shape: input });
        }

        let Self { output_channels, kernel_size, stride, padding, .. } = *self;

        if transposed {
            ConvolutionDescription::new_transposed(input, output_channels, kernel_size, stride, padding)
        } else {
            ConvolutionDescription::new(input, output_channels, kernel_size, stride, padding)
        }
    }

    pub fn num_params(&self) -> usize {
        let filters = self.input_channels * self.output_channels * self.kernel_size * self.kernel_size;
        filters + if self.bias { self.output_channels } else { 0 }
    }
}

/// A single operation of an [`Architecture`].
#[derive(Clone, Debug, PartialEq)]
pub enum LayerSpec {
    Conv(ConvolutionSpec),
    ConvTranspose(ConvolutionSpec),
    /// Average of 1x1, 3x3 and 5x5 convolutions, optionally batch normalised.
    MultiKernelConv { input_channels: usize, output_channels: usize, batchnorm: bool },
    Activate(Activation),
    BatchNorm { channels: usize },
    MaxPool { kernel_size: usize, stride: usize },
    Linear { inputs: usize, outputs: usize },
    /// With `spatial` set, whole channels are dropped at once.
    Dropout { p: f32, spatial: bool },
    Residual(ResidualBlockSpec),
}

impl LayerSpec {
    pub fn output_shape(&self, input: Shape) -> Result<Shape, ConfigurationError> {
        use LayerSpec::*;

        let ret = |cond: bool, ok: &dyn Fn() -> Shape, op: &'static str| {
            if cond {
                Ok(ok())
            } else {
                Err(ConfigurationError::InvalidShape { op, shape: input })
            }
        };

        match self {
            Conv(spec) => Ok(spec.describe(input, false)?.output_shape),
            ConvTranspose(spec) => Ok(spec.describe(input, true)?.output_shape),
            MultiKernelConv { input_channels, output_channels, .. } => {
                let cond = input.channels() == *input_channels && *output_channels > 0;
                ret(cond, &|| input.with_channels(*output_channels), "multi-kernel convolution")
            }
            Activate(_) | Dropout { .. } => Ok(input),
            BatchNorm { channels } => ret(input.channels() == *channels, &|| input, "batch norm"),
            MaxPool { kernel_size, stride } => Ok(PoolDescription::new(input, *kernel_size, *stride)?.output_shape),
            Linear { inputs, outputs } => {
                ret(input.size() == *inputs && *outputs > 0, &|| Shape::flat(*outputs), "linear")
            }
            Residual(block) => block.output_shape(input),
        }
    }

    pub fn num_params(&self) -> usize {
        use LayerSpec::*;

        match self {
            Conv(spec) | ConvTranspose(spec) => spec.num_params(),
            MultiKernelConv { input_channels, output_channels, batchnorm } => {
                let convs = [1, 3, 5].iter().map(|k| input_channels * output_channels * k * k + output_channels);
                convs.sum::<usize>() + if *batchnorm { 2 * output_channels } else { 0 }
            }
            BatchNorm { channels } => 2 * channels,
            Linear { inputs, outputs } => inputs * outputs + outputs,
            Activate(_) | Dropout { .. } | MaxPool { .. } => 0,
            Residual(block) => block.num_params(),
        }
    }

    /// Whether this operation halves spatial extent.
    pub fn is_downsample(&self) -> bool {
        match self {
            LayerSpec::MaxPool { stride, .. } => *stride > 1,
            LayerSpec::Conv(spec) => spec.stride > 1,
            _ => false,
        }
    }

    pub fn name(&self) -> String {
        use LayerSpec::*;

        match self {
            Conv(s) => format!(
                "Conv({} -> {}, k={}, s={}, p={})",
                s.input_channels, s.output_channels, s.kernel_size, s.stride, s.padding
            ),
            ConvTranspose(s) => format!(
                "ConvTranspose({} -> {}, k={}, s={}, p={})",
                s.input_channels, s.output_channels, s.kernel_size, s.stride, s.padding
            ),
            MultiKernelConv { input_channels, output_channels, .. } => {
                format!("MultiKernelConv({input_channels} -> {output_channels}, k=1|3|5)")
            }
            Activate(act) => act.name(),
            BatchNorm { channels } => format!("BatchNorm({channels})"),
            MaxPool { kernel_size, stride } => format!("MaxPool(k={kernel_size}, s={stride})"),
            Linear { inputs, outputs } => format!("Linear({inputs} -> {outputs})"),
            Dropout { p, spatial: true } => format!("Dropout2d({p})"),
            Dropout { p, spatial: false } => format!("Dropout({p})"),
            Residual(_) => "Residual".to_string(),
        }
    }
}

/// An ordered sequence of operations, applied strictly in order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Architecture {
    layers: Vec<LayerSpec>,
}

impl From<Vec<LayerSpec>> for Architecture {
    fn from(layers: Vec<LayerSpec>) -> Self {
        Self { layers }
    }
}

impl Architecture {
    pub(crate) fn push(&mut self, layer: LayerSpec) {
        self.layers.push(layer);
    }

    pub fn layers(&self) -> &[LayerSpec] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Tracks the per-sample shape through every operation.
    pub fn output_shape(&self, input: Shape) -> Result<Shape, ConfigurationError> {
        self.layers.iter().try_fold(input, |shape, layer| layer.output_shape(shape))
    }

    pub fn num_params(&self) -> usize {
        self.layers.iter().map(LayerSpec::num_params).sum()
    }

    /// Number of top-level spatial downsampling operations.
    pub fn downsample_count(&self) -> usize {
        self.layers.iter().filter(|layer| layer.is_downsample()).count()
    }
}
