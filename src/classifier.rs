use tracing::debug;

use crate::{
    arch::{build_classifier_head, build_feature_extractor, Architecture, BlockStrategy, Downsample, FeatureOptions},
    error::{ConfigurationError, ShapeMismatchError},
    logger::ansi,
    network::{ExecutionContext, Network},
    shape::Shape,
    tensor::Tensor,
};

/// Everything needed to assemble a convolutional classifier.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassifierConfig {
    /// Shape of one input, `(C, H, W)`.
    pub in_size: Shape,
    pub out_classes: usize,
    /// Output channels of each convolution.
    pub channels: Vec<usize>,
    /// Number of convolutions between downsamplings.
    pub pool_every: usize,
    /// Widths of the hidden fully connected layers.
    pub hidden_dims: Vec<usize>,
    /// Per-convolution kernel sizes, empty for 3x3 everywhere.
    pub kernel_sizes: Vec<usize>,
    pub strategy: BlockStrategy,
    pub downsample: Downsample,
    pub batchnorm: bool,
    pub dropout: f32,
    pub head_dropout: f32,
    pub seed: Option<u64>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            in_size: Shape::new(3, 32, 32),
            out_classes: 10,
            channels: vec![16, 16, 32, 32],
            pool_every: 2,
            hidden_dims: vec![100],
            kernel_sizes: Vec::new(),
            strategy: BlockStrategy::Plain,
            downsample: Downsample::MaxPool,
            batchnorm: false,
            dropout: 0.0,
            head_dropout: 0.0,
            seed: None,
        }
    }
}

impl ClassifierConfig {
    /// Residual network with multi-kernel blocks, a max pool followed by learned
    /// downsampling, and a regularised head.
    pub fn composite(in_size: Shape, out_classes: usize, channels: Vec<usize>, pool_every: usize) -> Self {
        Self {
            in_size,
            out_classes,
            channels,
            pool_every,
            strategy: BlockStrategy::Composite,
            downsample: Downsample::Hybrid,
            batchnorm: true,
            dropout: 0.2,
            head_dropout: 0.25,
            ..Self::default()
        }
    }

    pub fn display(&self) {
        println!("Input Size             : {}", ansi(self.in_size, 31));
        println!("Output Classes         : {}", ansi(self.out_classes, 31));
        println!("Channels               : {}", ansi(format!("{:?}", self.channels), 31));
        println!("Pool Every             : {}", ansi(self.pool_every, 31));
        println!("Hidden Dims            : {}", ansi(format!("{:?}", self.hidden_dims), 31));
        if !self.kernel_sizes.is_empty() {
            println!("Kernel Sizes           : {}", ansi(format!("{:?}", self.kernel_sizes), 31));
        }
        println!("Strategy               : {}", ansi(format!("{:?}", self.strategy), "32;1"));
        println!("Downsample             : {}", ansi(format!("{:?}", self.downsample), "32;1"));
        println!("Batchnorm / Dropout    : {} / {}", ansi(self.batchnorm, 31), ansi(self.dropout, 31));
        println!("Head Dropout           : {}", ansi(self.head_dropout, 31));
    }
}

/// The structure of a classifier, before any parameters exist.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassifierArchitecture {
    pub in_size: Shape,
    pub features: Architecture,
    pub pool_count: usize,
    /// Per-sample shape leaving the feature extractor.
    pub feature_shape: Shape,
    pub head: Architecture,
}

/// Assembles the feature extractor and classifier head described by `config`.
pub fn build_classifier(config: &ClassifierConfig) -> Result<ClassifierArchitecture, ConfigurationError> {
    let options = FeatureOptions {
        strategy: config.strategy,
        downsample: config.downsample,
        batchnorm: config.batchnorm,
        dropout: config.dropout,
    };

    let in_channels = config.in_size.channels();
    let (features, pool_count) =
        build_feature_extractor(in_channels, &config.channels, &config.kernel_sizes, config.pool_every, &options)?;

    let last_channels = config.channels[config.channels.len() - 1];
    let head = build_classifier_head(
        config.in_size,
        last_channels,
        pool_count,
        &config.hidden_dims,
        config.out_classes,
        config.head_dropout,
    )?;

    let feature_shape = features.output_shape(config.in_size)?;
    head.output_shape(feature_shape)?;

    debug!(%feature_shape, pool_count, params = features.num_params() + head.num_params(), "built classifier");

    Ok(ClassifierArchitecture { in_size: config.in_size, features, pool_count, feature_shape, head })
}

/// A plain, residual or composite convolutional classifier.
pub struct ConvClassifier {
    architecture: ClassifierArchitecture,
    features: Network,
    head: Network,
    ctx: ExecutionContext,
}

impl ConvClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self, ConfigurationError> {
        let architecture = build_classifier(config)?;
        let mut ctx = ExecutionContext::new(config.seed);

        let features = Network::new(architecture.features.clone(), &mut ctx.rng);
        let head = Network::new(architecture.head.clone(), &mut ctx.rng);

        Ok(Self { architecture, features, head, ctx })
    }

    pub fn architecture(&self) -> &ClassifierArchitecture {
        &self.architecture
    }

    /// Class scores of shape `(N, out_classes)`.
    pub fn forward(&mut self, batch: &Tensor) -> Result<Tensor, ShapeMismatchError> {
        if batch.shape() != self.architecture.in_size {
            return Err(ShapeMismatchError::new("classifier input", self.architecture.in_size, batch.shape()));
        }

        let features = self.features.forward(batch.clone(), &mut self.ctx)?;
        self.head.forward(features.flatten(), &mut self.ctx)
    }

    pub fn train(&mut self) {
        self.ctx.training = true;
    }

    pub fn eval(&mut self) {
        self.ctx.training = false;
    }

    pub fn num_params(&self) -> usize {
        self.features.num_params() + self.head.num_params()
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Vec<f32>> {
        let mut params = self.features.parameters_mut();
        params.extend(self.head.parameters_mut());
        params
    }
}

#[cfg(test)]
mod tests {
    use crate::{activation::Activation, arch::LayerSpec};

    use super::*;

    #[test]
    fn reference_configuration() {
        let arch = build_classifier(&ClassifierConfig::default()).unwrap();

        assert_eq!(arch.pool_count, 2);
        assert_eq!(arch.features.downsample_count(), 2);
        assert_eq!(arch.feature_shape, Shape::new(32, 8, 8));
        assert_eq!(
            arch.head.layers(),
            &[
                LayerSpec::Linear { inputs: 2048, outputs: 100 },
                LayerSpec::Activate(Activation::ReLU),
                LayerSpec::Linear { inputs: 100, outputs: 10 },
            ]
        );
    }

    #[test]
    fn flattened_size_formula_matches_tracking() {
        for (h, w) in [(32, 32), (31, 17), (64, 9)] {
            for strategy in [BlockStrategy::Plain, BlockStrategy::Residual] {
                let config = ClassifierConfig {
                    in_size: Shape::new(1, h, w),
                    channels: vec![4, 4, 6],
                    pool_every: 1,
                    strategy,
                    ..ClassifierConfig::default()
                };

                let arch = build_classifier(&config).unwrap();
                assert_eq!(arch.pool_count, 3);
                assert_eq!(arch.feature_shape.size(), 6 * (h / 8) * (w / 8));
            }
        }
    }

    #[test]
    fn composite_preset() {
        let config = ClassifierConfig::composite(Shape::new(3, 32, 32), 10, vec![8, 8, 16, 16], 2);
        let arch = build_classifier(&config).unwrap();

        assert_eq!(arch.pool_count, 2);
        assert_eq!(arch.features.layers()[1], LayerSpec::MaxPool { kernel_size: 2, stride: 2 });
        assert!(matches!(&arch.features.layers()[3], LayerSpec::Conv(conv) if conv.stride == 2));
        assert_eq!(arch.feature_shape, Shape::new(16, 8, 8));
        assert!(arch.head.layers().contains(&LayerSpec::Dropout { p: 0.25, spatial: false }));
    }

    #[test]
    fn too_many_pools() {
        let config = ClassifierConfig { in_size: Shape::new(3, 8, 8), pool_every: 1, ..ClassifierConfig::default() };
        assert!(matches!(build_classifier(&config), Err(ConfigurationError::NonPositiveFeatureSize { .. })));
    }

    #[test]
    fn forward_shape_and_validation() {
        let config = ClassifierConfig {
            in_size: Shape::new(3, 8, 8),
            channels: vec![4, 4, 8],
            hidden_dims: vec![12],
            seed: Some(17),
            ..ClassifierConfig::default()
        };

        let mut model = ConvClassifier::new(&config).unwrap();
        let scores = model.forward(&Tensor::zeroed(Shape::new(3, 8, 8), 5)).unwrap();
        assert_eq!(scores.dims(), [5, 10, 1, 1]);

        assert!(model.forward(&Tensor::zeroed(Shape::new(3, 8, 9), 5)).is_err());
    }
}
