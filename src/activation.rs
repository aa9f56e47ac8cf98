/// List of supported activation functions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Activation {
    ReLU,
    /// Negative slope is fixed at 0.01.
    LeakyReLU,
    Elu(f32),
    Tanh,
}

const LEAKY_SLOPE: f32 = 0.01;

impl Activation {
    pub fn fwd(&self, x: f32) -> f32 {
        match *self {
            Activation::ReLU => x.max(0.0),
            Activation::LeakyReLU => {
                if x > 0.0 {
                    x
                } else {
                    LEAKY_SLOPE * x
                }
            }
            Activation::Elu(alpha) => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x.exp_m1()
                }
            }
            Activation::Tanh => x.tanh(),
        }
    }

    pub fn apply(&self, values: &mut [f32]) {
        for x in values {
            *x = self.fwd(*x);
        }
    }

    pub fn name(&self) -> String {
        match self {
            Activation::ReLU => "ReLU".to_string(),
            Activation::LeakyReLU => "LeakyReLU".to_string(),
            Activation::Elu(alpha) => format!("ELU({alpha})"),
            Activation::Tanh => "Tanh".to_string(),
        }
    }
}
