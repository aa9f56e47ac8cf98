use rand::rngs::StdRng;

use crate::{backend::cpu, error::ShapeMismatchError, rng, shape::Shape, tensor::Tensor};

/// Fully connected layer, weights stored `outputs x inputs`.
#[derive(Clone, Debug)]
pub struct Linear {
    pub inputs: usize,
    pub outputs: usize,
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
}

impl Linear {
    pub fn new(inputs: usize, outputs: usize, rng: &mut StdRng) -> Self {
        let weights = rng::fan_in_init(rng, inputs * outputs, inputs);
        let bias = rng::fan_in_init(rng, outputs, inputs);
        Self { inputs, outputs, weights, bias }
    }

    /// Each sample is read as a flat vector, so feature maps need no explicit flattening.
    pub fn forward(&self, input: &Tensor) -> Result<Tensor, ShapeMismatchError> {
        if input.shape().size() != self.inputs {
            return Err(ShapeMismatchError::new("linear input", self.inputs, input.shape()));
        }

        if self.outputs == 0 {
            return Err(ShapeMismatchError::new("linear output", "at least one feature", 0));
        }

        let batch_size = input.batch_size();
        let mut output = Tensor::zeroed(Shape::flat(self.outputs), batch_size);

        cpu::linear_fwd(
            self.inputs,
            self.outputs,
            batch_size,
            &self.weights,
            Some(&self.bias),
            input.values(),
            output.values_mut(),
        );

        Ok(output)
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Vec<f32>> {
        vec![&mut self.weights, &mut self.bias]
    }
}
