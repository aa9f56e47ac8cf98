use rand::Rng;

use crate::tensor::Tensor;

use super::ExecutionContext;

/// Inverted dropout; survivors are scaled by `1 / (1 - p)` so evaluation is the identity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Dropout {
    pub p: f32,
    /// Drop whole channel planes rather than single values.
    pub spatial: bool,
}

impl Dropout {
    pub fn forward(&self, mut input: Tensor, ctx: &mut ExecutionContext) -> Tensor {
        if !ctx.training || self.p <= 0.0 {
            return input;
        }

        let scale = 1.0 / (1.0 - self.p);
        let group = if self.spatial { input.shape().spatial() } else { 1 };

        for chunk in input.values_mut().chunks_exact_mut(group) {
            let keep = ctx.rng.gen::<f32>() >= self.p;
            let factor = if keep { scale } else { 0.0 };

            for x in chunk {
                *x *= factor;
            }
        }

        input
    }
}
