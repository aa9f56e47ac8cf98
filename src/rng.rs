use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal, Uniform};

use crate::{error::ShapeMismatchError, shape::Shape, tensor::Tensor};

pub fn seeded(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Draws `length` values uniformly from `[-bound, bound]`.
pub fn uniform_f32<R: Rng>(rng: &mut R, length: usize, bound: f32) -> Vec<f32> {
    if bound <= 0.0 {
        return vec![0.0; length];
    }

    let dist = Uniform::new_inclusive(-bound, bound);
    (0..length).map(|_| dist.sample(rng)).collect()
}

/// Uniform initialisation scaled by fan-in, `U(-1/sqrt(fan_in), 1/sqrt(fan_in))`.
pub fn fan_in_init<R: Rng>(rng: &mut R, length: usize, fan_in: usize) -> Vec<f32> {
    uniform_f32(rng, length, 1.0 / (fan_in.max(1) as f32).sqrt())
}

/// A batch of independent standard normal draws; fails for an empty batch.
pub fn standard_normal<R: Rng>(rng: &mut R, shape: Shape, batch_size: usize) -> Result<Tensor, ShapeMismatchError> {
    let values = (0..shape.size() * batch_size).map(|_| StandardNormal.sample(rng)).collect();
    Tensor::from_vec(shape, batch_size, values)
}
