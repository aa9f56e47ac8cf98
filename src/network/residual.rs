use rand::rngs::StdRng;

use crate::{activation::Activation, arch::ResidualBlockSpec, error::ShapeMismatchError, tensor::Tensor};

use super::{ExecutionContext, Network};

/// `activation(main(x) + shortcut(x))`, with an empty shortcut acting as the identity.
#[derive(Clone, Debug)]
pub struct Residual {
    pub main: Network,
    pub shortcut: Network,
    pub activation: Activation,
}

impl Residual {
    pub fn new(spec: &ResidualBlockSpec, rng: &mut StdRng) -> Self {
        Self {
            main: Network::new(spec.main.clone(), rng),
            shortcut: Network::new(spec.shortcut.clone(), rng),
            activation: spec.activation,
        }
    }

    pub fn forward(&mut self, input: Tensor, ctx: &mut ExecutionContext) -> Result<Tensor, ShapeMismatchError> {
        let skip = self.shortcut.forward(input.clone(), ctx)?;
        let mut output = self.main.forward(input, ctx)?;

        output.add_assign(&skip)?;
        self.activation.apply(output.values_mut());

        Ok(output)
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Vec<f32>> {
        let mut params = self.main.parameters_mut();
        params.extend(self.shortcut.parameters_mut());
        params
    }
}
