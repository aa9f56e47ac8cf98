use tracing::{debug, info};

use crate::{
    activation::Activation,
    arch::{decoder_stack, encoder_stack, Architecture, DEFAULT_HIDDEN_CHANNELS},
    error::{ConfigurationError, Error, ShapeMismatchError},
    logger::ansi,
    network::{ExecutionContext, Linear, Network},
    rng,
    shape::Shape,
    tensor::Tensor,
};

/// Settings for a VAE built from the default encoder/decoder stacks.
#[derive(Clone, Debug, PartialEq)]
pub struct VaeConfig {
    /// Shape of one input, `(C, H, W)`.
    pub in_size: Shape,
    pub z_dim: usize,
    /// Channels of the encoder's output feature map.
    pub feature_channels: usize,
    /// Intermediate channel schedule of the encoder, reversed in the decoder.
    pub hidden_channels: Vec<usize>,
    pub batchnorm: bool,
    pub dropout: f32,
    pub seed: Option<u64>,
}

impl Default for VaeConfig {
    fn default() -> Self {
        Self {
            in_size: Shape::new(3, 64, 64),
            z_dim: 64,
            feature_channels: 1024,
            hidden_channels: DEFAULT_HIDDEN_CHANNELS.to_vec(),
            batchnorm: true,
            dropout: 0.1,
            seed: None,
        }
    }
}

impl VaeConfig {
    pub fn display(&self) {
        println!("Input Size             : {}", ansi(self.in_size, 31));
        println!("Latent Dimension       : {}", ansi(self.z_dim, 31));
        println!("Feature Channels       : {}", ansi(self.feature_channels, 31));
        println!("Hidden Channels        : {}", ansi(format!("{:?}", self.hidden_channels), 31));
        println!("Batchnorm / Dropout    : {} / {}", ansi(self.batchnorm, 31), ansi(self.dropout, 31));
    }
}

/// Shape tracking through one half of the autoencoder. A stage that cannot
/// accept the shape it is handed is an encoder/decoder incompatibility.
fn track(arch: &Architecture, input: Shape, context: &'static str) -> Result<Shape, Error> {
    arch.output_shape(input).map_err(|err| match err {
        ConfigurationError::InvalidShape { op, shape } => {
            ShapeMismatchError::new(context, format!("a shape accepted by {op}"), shape).into()
        }
        err => err.into(),
    })
}

/// Diagonal Gaussian posterior, both tensors of shape `(N, z_dim)`.
#[derive(Clone, Debug, PartialEq)]
pub struct LatentDistribution {
    pub mean: Tensor,
    pub log_variance: Tensor,
}

impl LatentDistribution {
    pub fn batch_size(&self) -> usize {
        self.mean.batch_size()
    }

    pub fn z_dim(&self) -> usize {
        self.mean.shape().size()
    }

    /// `z = mean + exp(log_variance / 2) * noise`.
    pub fn reparameterize(&self, noise: &Tensor) -> Result<Tensor, ShapeMismatchError> {
        self.mean.check_same_dims("latent noise", noise)?;

        let mut z = noise.clone();
        for ((z, &mu), &lv) in z.values_mut().iter_mut().zip(self.mean.values()).zip(self.log_variance.values()) {
            *z = mu + (0.5 * lv).exp() * *z;
        }

        Ok(z)
    }
}

/// A reparameterised draw, keeping the noise it was made from.
#[derive(Clone, Debug, PartialEq)]
pub struct LatentSample {
    pub z: Tensor,
    pub noise: Tensor,
    pub distribution: LatentDistribution,
}

impl LatentSample {
    /// Pulls a gradient with respect to `z` back onto `(mean, log_variance)`.
    pub fn backward(&self, z_grad: &Tensor) -> Result<(Tensor, Tensor), ShapeMismatchError> {
        self.z.check_same_dims("latent gradient", z_grad)?;

        let mean_grad = z_grad.clone();
        let mut log_variance_grad = z_grad.clone();

        for ((g, &lv), &eps) in log_variance_grad
            .values_mut()
            .iter_mut()
            .zip(self.distribution.log_variance.values())
            .zip(self.noise.values())
        {
            *g *= 0.5 * (0.5 * lv).exp() * eps;
        }

        Ok((mean_grad, log_variance_grad))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VaeOutput {
    pub reconstruction: Tensor,
    pub latent: LatentSample,
}

impl VaeOutput {
    pub fn mean(&self) -> &Tensor {
        &self.latent.distribution.mean
    }

    pub fn log_variance(&self) -> &Tensor {
        &self.latent.distribution.log_variance
    }
}

pub struct Vae {
    encoder: Network,
    decoder: Network,
    mean_fc: Linear,
    log_variance_fc: Linear,
    latent_fc: Linear,
    in_size: Shape,
    z_dim: usize,
    feature_shape: Shape,
    ctx: ExecutionContext,
}

impl Vae {
    pub fn from_config(config: &VaeConfig) -> Result<Self, Error> {
        let in_channels = config.in_size.channels();
        let hidden = &config.hidden_channels;

        let encoder = encoder_stack(in_channels, config.feature_channels, hidden, config.batchnorm, config.dropout)?;
        let decoder = decoder_stack(config.feature_channels, in_channels, hidden, config.batchnorm, config.dropout)?;

        Self::new(encoder, decoder, config.in_size, config.z_dim, config.seed)
    }

    /// Instantiates the stacks and checks once, with a zero batch, that the
    /// decoder reproduces the input shape from the encoder's features.
    pub fn new(
        encoder: Architecture,
        decoder: Architecture,
        in_size: Shape,
        z_dim: usize,
        seed: Option<u64>,
    ) -> Result<Self, Error> {
        if z_dim == 0 {
            return Err(ConfigurationError::invalid("z_dim", "must be positive").into());
        }

        let predicted = track(&encoder, in_size, "encoder input")?;
        let reconstructed = track(&decoder, predicted, "decoder input")?;

        if reconstructed != in_size {
            return Err(ShapeMismatchError::new("decoder output", in_size, reconstructed).into());
        }

        let mut ctx = ExecutionContext::new(seed);
        let mut encoder = Network::new(encoder, &mut ctx.rng);
        let mut decoder = Network::new(decoder, &mut ctx.rng);

        let feature_shape = Self::check_features(&mut encoder, &mut decoder, in_size, &mut ctx)?;
        let n_features = feature_shape.size();

        let mean_fc = Linear::new(n_features, z_dim, &mut ctx.rng);
        let log_variance_fc = Linear::new(n_features, z_dim, &mut ctx.rng);
        let latent_fc = Linear::new(z_dim, n_features, &mut ctx.rng);

        info!(%in_size, %feature_shape, n_features, z_dim, "vae shape check passed");

        Ok(Self { encoder, decoder, mean_fc, log_variance_fc, latent_fc, in_size, z_dim, feature_shape, ctx })
    }

    fn check_features(
        encoder: &mut Network,
        decoder: &mut Network,
        in_size: Shape,
        ctx: &mut ExecutionContext,
    ) -> Result<Shape, ShapeMismatchError> {
        let training = ctx.training;
        ctx.training = false;

        let x = Tensor::zeroed(in_size, 1);
        let result = encoder.forward(x.clone(), ctx).and_then(|h| {
            let feature_shape = h.shape();
            let xr = decoder.forward(h, ctx)?;
            x.check_same_dims("encoder/decoder round trip", &xr)?;
            Ok(feature_shape)
        });

        ctx.training = training;
        result
    }

    pub fn encoder(&self) -> &Network {
        &self.encoder
    }

    pub fn decoder(&self) -> &Network {
        &self.decoder
    }

    pub fn in_size(&self) -> Shape {
        self.in_size
    }

    pub fn z_dim(&self) -> usize {
        self.z_dim
    }

    pub fn feature_shape(&self) -> Shape {
        self.feature_shape
    }

    pub fn train(&mut self) {
        self.ctx.training = true;
    }

    pub fn eval(&mut self) {
        self.ctx.training = false;
    }

    /// Encodes `x` into a posterior and draws one reparameterised sample from it.
    pub fn encode(&mut self, x: &Tensor) -> Result<LatentSample, ShapeMismatchError> {
        if x.shape() != self.in_size {
            return Err(ShapeMismatchError::new("vae input", self.in_size, x.shape()));
        }

        let features = self.encoder.forward(x.clone(), &mut self.ctx)?.flatten();

        let distribution = LatentDistribution {
            mean: self.mean_fc.forward(&features)?,
            log_variance: self.log_variance_fc.forward(&features)?,
        };

        let noise = rng::standard_normal(&mut self.ctx.rng, Shape::flat(self.z_dim), x.batch_size())?;
        let z = distribution.reparameterize(&noise)?;

        Ok(LatentSample { z, noise, distribution })
    }

    /// Maps latent codes `(N, z_dim)` back to inputs, bounded to `[-1, 1]`.
    pub fn decode(&mut self, z: &Tensor) -> Result<Tensor, ShapeMismatchError> {
        let features = self.latent_fc.forward(z)?.reshape(self.feature_shape)?;
        let mut reconstruction = self.decoder.forward(features, &mut self.ctx)?;
        Activation::Tanh.apply(reconstruction.values_mut());
        Ok(reconstruction)
    }

    /// Decodes `n` draws from the standard normal prior, with dropout and batch
    /// statistics disabled for the duration.
    pub fn sample(&mut self, n: usize) -> Result<Tensor, Error> {
        if n == 0 {
            return Err(ConfigurationError::invalid("n", "must be positive").into());
        }

        let z = rng::standard_normal(&mut self.ctx.rng, Shape::flat(self.z_dim), n)?;

        let training = self.ctx.training;
        self.ctx.training = false;
        let samples = self.decode(&z);
        self.ctx.training = training;

        debug!(n, "sampled from prior");
        Ok(samples?)
    }

    pub fn forward(&mut self, x: &Tensor) -> Result<VaeOutput, ShapeMismatchError> {
        let latent = self.encode(x)?;
        let reconstruction = self.decode(&latent.z)?;
        Ok(VaeOutput { reconstruction, latent })
    }

    pub fn num_params(&self) -> usize {
        let fc = [&self.mean_fc, &self.log_variance_fc, &self.latent_fc];
        self.encoder.num_params()
            + self.decoder.num_params()
            + fc.iter().map(|l| l.weights.len() + l.bias.len()).sum::<usize>()
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Vec<f32>> {
        let mut params = self.encoder.parameters_mut();
        params.extend(self.decoder.parameters_mut());
        params.extend(self.mean_fc.parameters_mut());
        params.extend(self.log_variance_fc.parameters_mut());
        params.extend(self.latent_fc.parameters_mut());
        params
    }
}
