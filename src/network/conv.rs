use rand::rngs::StdRng;

use crate::{
    arch::{ConvolutionSpec, COMPOSITE_BRANCH_WEIGHT},
    backend::cpu,
    error::ShapeMismatchError,
    rng,
    tensor::Tensor,
};

use super::{BatchNorm, ExecutionContext};

/// A convolution or transposed convolution with its filters and optional bias.
#[derive(Clone, Debug)]
pub struct Conv {
    pub spec: ConvolutionSpec,
    pub transposed: bool,
    pub filters: Vec<f32>,
    pub bias: Option<Vec<f32>>,
}

impl Conv {
    pub fn new(spec: ConvolutionSpec, transposed: bool, rng: &mut StdRng) -> Self {
        let k2 = spec.kernel_size * spec.kernel_size;
        let fan_in = if transposed { spec.output_channels * k2 } else { spec.input_channels * k2 };
        let filters = rng::fan_in_init(rng, spec.input_channels * spec.output_channels * k2, fan_in);
        let bias = spec.bias.then(|| rng::fan_in_init(rng, spec.output_channels, fan_in));

        Self { spec, transposed, filters, bias }
    }

    pub fn forward(&self, input: &Tensor) -> Result<Tensor, ShapeMismatchError> {
        let desc = self.spec.describe(input.shape(), self.transposed).map_err(|_| {
            ShapeMismatchError::new(
                "convolution input",
                format!("{} channels of at least {}x{}", self.spec.input_channels, self.spec.kernel_size, self.spec.kernel_size),
                input.shape(),
            )
        })?;

        let batch_size = input.batch_size();
        let mut output = Tensor::zeroed(desc.output_shape, batch_size);
        let bias = self.bias.as_deref();

        if self.transposed {
            cpu::conv_transpose_fwd(&desc, batch_size, &self.filters, bias, input.values(), output.values_mut());
        } else {
            cpu::conv_fwd(&desc, batch_size, &self.filters, bias, input.values(), output.values_mut());
        }

        Ok(output)
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Vec<f32>> {
        let mut params = vec![&mut self.filters];
        params.extend(self.bias.as_mut());
        params
    }
}

/// Weighted average of 1x1, 3x3 and 5x5 convolutions over the same input.
#[derive(Clone, Debug)]
pub struct MultiKernelConv {
    pub branches: [Conv; 3],
    pub norm: Option<BatchNorm>,
}

impl MultiKernelConv {
    pub fn new(input_channels: usize, output_channels: usize, batchnorm: bool, rng: &mut StdRng) -> Self {
        let mut branch = |kernel_size: usize| {
            let spec = ConvolutionSpec {
                input_channels,
                output_channels,
                kernel_size,
                stride: 1,
                padding: kernel_size / 2,
                bias: true,
            };
            Conv::new(spec, false, rng)
        };

        let branches = [branch(1), branch(3), branch(5)];
        let norm = batchnorm.then(|| BatchNorm::new(output_channels));

        Self { branches, norm }
    }

    pub fn forward(&mut self, input: &Tensor, ctx: &mut ExecutionContext) -> Result<Tensor, ShapeMismatchError> {
        let mut output = self.branches[0].forward(input)?;

        for branch in &self.branches[1..] {
            output.add_assign(&branch.forward(input)?)?;
        }

        let output = output.map(|x| COMPOSITE_BRANCH_WEIGHT * x);

        match &mut self.norm {
            Some(norm) => norm.forward(output, ctx.training),
            None => Ok(output),
        }
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Vec<f32>> {
        let mut params = Vec::new();

        for branch in &mut self.branches {
            params.extend(branch.parameters_mut());
        }

        if let Some(norm) = &mut self.norm {
            params.extend(norm.parameters_mut());
        }

        params
    }
}
