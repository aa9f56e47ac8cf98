mod conv;
mod dropout;
mod linear;
mod norm;
mod residual;

pub use conv::{Conv, MultiKernelConv};
pub use dropout::Dropout;
pub use linear::Linear;
pub use norm::BatchNorm;
pub use residual::Residual;

use rand::rngs::StdRng;

use crate::{
    activation::Activation,
    arch::{Architecture, LayerSpec},
    backend::cpu,
    error::ShapeMismatchError,
    rng,
    shape::PoolDescription,
    tensor::Tensor,
};

/// Mode and randomness shared by every layer during a forward pass.
pub struct ExecutionContext {
    pub training: bool,
    pub rng: StdRng,
}

impl ExecutionContext {
    pub fn new(seed: Option<u64>) -> Self {
        Self { training: true, rng: rng::seeded(seed) }
    }
}

/// An operation together with its parameters.
#[derive(Clone, Debug)]
pub enum Layer {
    Conv(Conv),
    MultiKernelConv(MultiKernelConv),
    Activate(Activation),
    BatchNorm(BatchNorm),
    MaxPool { kernel_size: usize, stride: usize },
    Linear(Linear),
    Dropout(Dropout),
    Residual(Residual),
}

impl Layer {
    pub fn new(spec: &LayerSpec, rng: &mut StdRng) -> Self {
        match spec {
            LayerSpec::Conv(spec) => Layer::Conv(Conv::new(*spec, false, rng)),
            LayerSpec::ConvTranspose(spec) => Layer::Conv(Conv::new(*spec, true, rng)),
            LayerSpec::MultiKernelConv { input_channels, output_channels, batchnorm } => {
                Layer::MultiKernelConv(MultiKernelConv::new(*input_channels, *output_channels, *batchnorm, rng))
            }
            LayerSpec::Activate(act) => Layer::Activate(*act),
            LayerSpec::BatchNorm { channels } => Layer::BatchNorm(BatchNorm::new(*channels)),
            LayerSpec::MaxPool { kernel_size, stride } => Layer::MaxPool { kernel_size: *kernel_size, stride: *stride },
            LayerSpec::Linear { inputs, outputs } => Layer::Linear(Linear::new(*inputs, *outputs, rng)),
            LayerSpec::Dropout { p, spatial } => Layer::Dropout(Dropout { p: *p, spatial: *spatial }),
            LayerSpec::Residual(block) => Layer::Residual(Residual::new(block, rng)),
        }
    }

    pub fn forward(&mut self, input: Tensor, ctx: &mut ExecutionContext) -> Result<Tensor, ShapeMismatchError> {
        match self {
            Layer::Conv(conv) => conv.forward(&input),
            Layer::MultiKernelConv(conv) => conv.forward(&input, ctx),
            Layer::Activate(act) => {
                let mut output = input;
                act.apply(output.values_mut());
                Ok(output)
            }
            Layer::BatchNorm(norm) => norm.forward(input, ctx.training),
            Layer::MaxPool { kernel_size, stride } => {
                let desc = PoolDescription::new(input.shape(), *kernel_size, *stride).map_err(|_| {
                    ShapeMismatchError::new("max pool input", format!("at least {kernel_size}x{kernel_size}"), input.shape())
                })?;

                let mut output = Tensor::zeroed(desc.output_shape, input.batch_size());
                cpu::max_pool_fwd(&desc, input.batch_size(), input.values(), output.values_mut());
                Ok(output)
            }
            Layer::Linear(linear) => linear.forward(&input),
            Layer::Dropout(dropout) => Ok(dropout.forward(input, ctx)),
            Layer::Residual(block) => block.forward(input, ctx),
        }
    }

    fn parameters_mut(&mut self) -> Vec<&mut Vec<f32>> {
        match self {
            Layer::Conv(conv) => conv.parameters_mut(),
            Layer::MultiKernelConv(conv) => conv.parameters_mut(),
            Layer::BatchNorm(norm) => norm.parameters_mut(),
            Layer::Linear(linear) => linear.parameters_mut(),
            Layer::Residual(block) => block.parameters_mut(),
            Layer::Activate(_) | Layer::MaxPool { .. } | Layer::Dropout(_) => Vec::new(),
        }
    }
}

/// An [`Architecture`] instantiated with freshly initialised parameters.
#[derive(Clone, Debug)]
pub struct Network {
    architecture: Architecture,
    layers: Vec<Layer>,
}

impl Network {
    pub fn new(architecture: Architecture, rng: &mut StdRng) -> Self {
        let layers = architecture.layers().iter().map(|spec| Layer::new(spec, rng)).collect();
        Self { architecture, layers }
    }

    pub fn architecture(&self) -> &Architecture {
        &self.architecture
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn forward(&mut self, input: Tensor, ctx: &mut ExecutionContext) -> Result<Tensor, ShapeMismatchError> {
        self.layers.iter_mut().try_fold(input, |x, layer| layer.forward(x, ctx))
    }

    /// Every trainable buffer, in layer order, for an external optimiser.
    pub fn parameters_mut(&mut self) -> Vec<&mut Vec<f32>> {
        self.layers.iter_mut().flat_map(Layer::parameters_mut).collect()
    }

    pub fn num_params(&self) -> usize {
        self.architecture.num_params()
    }
}
