use crate::{backend::cpu, error::ShapeMismatchError, tensor::Tensor};

const EPS: f32 = 1e-5;
const MOMENTUM: f32 = 0.1;

/// Per-channel batch normalisation with a learned affine transform.
///
/// Training mode normalises with batch statistics and updates the running
/// estimates; evaluation mode uses the running estimates.
#[derive(Clone, Debug)]
pub struct BatchNorm {
    pub channels: usize,
    pub gamma: Vec<f32>,
    pub beta: Vec<f32>,
    pub running_mean: Vec<f32>,
    pub running_var: Vec<f32>,
}

impl BatchNorm {
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            gamma: vec![1.0; channels],
            beta: vec![0.0; channels],
            running_mean: vec![0.0; channels],
            running_var: vec![1.0; channels],
        }
    }

    pub fn forward(&mut self, mut input: Tensor, training: bool) -> Result<Tensor, ShapeMismatchError> {
        let shape = input.shape();

        if shape.channels() != self.channels {
            return Err(ShapeMismatchError::new("batch norm channels", self.channels, shape.channels()));
        }

        if training {
            let (mean, var) = cpu::channel_statistics(shape, input.batch_size(), input.values());
            let count = (input.batch_size() * shape.spatial()) as f32;
            let unbias = if count > 1.0 { count / (count - 1.0) } else { 1.0 };

            for c in 0..self.channels {
                self.running_mean[c] = (1.0 - MOMENTUM) * self.running_mean[c] + MOMENTUM * mean[c];
                self.running_var[c] = (1.0 - MOMENTUM) * self.running_var[c] + MOMENTUM * var[c] * unbias;
            }

            cpu::normalise(shape, &mean, &var, &self.gamma, &self.beta, EPS, input.values_mut());
        } else {
            cpu::normalise(shape, &self.running_mean, &self.running_var, &self.gamma, &self.beta, EPS, input.values_mut());
        }

        Ok(input)
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Vec<f32>> {
        vec![&mut self.gamma, &mut self.beta]
    }
}
