use tracing::debug;

use crate::{activation::Activation, error::ConfigurationError, shape::Shape};

use super::{
    block::{check_channels, check_dropout, composite_residual_block, residual_block},
    Architecture, ConvolutionSpec, LayerSpec,
};

/// How each run of `pool_every` convolutions is turned into operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlockStrategy {
    /// `Conv -> ReLU` per convolution.
    #[default]
    Plain,
    /// One residual block per run.
    Residual,
    /// One multi-kernel residual block per run.
    Composite,
}

/// Operation inserted after every complete run of convolutions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Downsample {
    /// 2x2 max pooling with stride 2.
    #[default]
    MaxPool,
    /// Learned 2x2 convolution with stride 2, keeping the channel count.
    StridedConv,
    /// Max pooling after the first run, strided convolutions after the rest.
    Hybrid,
}

impl Downsample {
    /// The `index`-th downsampling layer of a feature extractor.
    fn layer(self, index: usize, channels: usize) -> LayerSpec {
        match self {
            Downsample::Hybrid if index == 0 => Downsample::MaxPool.layer(index, channels),
            Downsample::Hybrid => Downsample::StridedConv.layer(index, channels),
            Downsample::MaxPool => LayerSpec::MaxPool { kernel_size: 2, stride: 2 },
            Downsample::StridedConv => LayerSpec::Conv(ConvolutionSpec {
                input_channels: channels,
                output_channels: channels,
                kernel_size: 2,
                stride: 2,
                padding: 0,
                bias: true,
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeatureOptions {
    pub strategy: BlockStrategy,
    pub downsample: Downsample,
    /// Only used by residual strategies.
    pub batchnorm: bool,
    /// Only used by residual strategies.
    pub dropout: f32,
}

impl Default for FeatureOptions {
    fn default() -> Self {
        Self { strategy: BlockStrategy::Plain, downsample: Downsample::MaxPool, batchnorm: false, dropout: 0.0 }
    }
}

fn resolve_kernel_sizes(channels: usize, kernel_sizes: &[usize]) -> Result<Vec<usize>, ConfigurationError> {
    if kernel_sizes.is_empty() {
        return Ok(vec![3; channels]);
    }

    if kernel_sizes.len() != channels {
        return Err(ConfigurationError::MismatchedLengths {
            what: "kernel_sizes",
            expected: channels,
            got: kernel_sizes.len(),
        });
    }

    if let Some(&even) = kernel_sizes.iter().find(|&&k| k % 2 == 0) {
        return Err(ConfigurationError::EvenKernelSize(even));
    }

    Ok(kernel_sizes.to_vec())
}

/// Builds `[(block of P convolutions) -> downsample] * (N / P)` followed by the
/// `N mod P` trailing convolutions with no downsample after them.
///
/// An empty `kernel_sizes` means 3x3 everywhere. Returns the architecture together
/// with the number of downsampling operations it contains.
pub fn build_feature_extractor(
    in_channels: usize,
    channels: &[usize],
    kernel_sizes: &[usize],
    pool_every: usize,
    options: &FeatureOptions,
) -> Result<(Architecture, usize), ConfigurationError> {
    check_channels("channels", channels)?;
    check_dropout(options.dropout)?;

    if in_channels == 0 {
        return Err(ConfigurationError::invalid("in_channels", "must be positive"));
    }

    if pool_every == 0 {
        return Err(ConfigurationError::invalid("pool_every", "must be positive"));
    }

    let kernel_sizes = resolve_kernel_sizes(channels.len(), kernel_sizes)?;

    let mut arch = Architecture::default();
    let mut pool_count = 0;
    let mut prev = in_channels;

    for (run, kernels) in channels.chunks(pool_every).zip(kernel_sizes.chunks(pool_every)) {
        match options.strategy {
            BlockStrategy::Plain => {
                for (&out, &kernel_size) in run.iter().zip(kernels.iter()) {
                    arch.push(LayerSpec::Conv(ConvolutionSpec::same(prev, out, kernel_size)?));
                    arch.push(LayerSpec::Activate(Activation::ReLU));
                    prev = out;
                }
            }
            BlockStrategy::Residual => {
                let block = residual_block(prev, run, kernels, options.batchnorm, options.dropout)?;
                arch.push(LayerSpec::Residual(block));
            }
            BlockStrategy::Composite => {
                let block = composite_residual_block(prev, run, options.batchnorm, options.dropout)?;
                arch.push(LayerSpec::Residual(block));
            }
        }

        prev = run[run.len() - 1];

        if run.len() == pool_every {
            arch.push(options.downsample.layer(pool_count, prev));
            pool_count += 1;
        }
    }

    debug!(strategy = ?options.strategy, layers = arch.len(), pool_count, "built feature extractor");

    Ok((arch, pool_count))
}

/// Builds `(Linear -> ReLU [-> Dropout]) * M -> Linear` on the flattened output
/// of a feature extractor that downsampled `pool_count` times.
pub fn build_classifier_head(
    in_size: Shape,
    channels: usize,
    pool_count: usize,
    hidden_dims: &[usize],
    out_classes: usize,
    dropout: f32,
) -> Result<Architecture, ConfigurationError> {
    check_dropout(dropout)?;

    if out_classes == 0 {
        return Err(ConfigurationError::invalid("out_classes", "must be positive"));
    }

    if hidden_dims.contains(&0) {
        return Err(ConfigurationError::invalid("hidden_dims", "widths must be positive"));
    }

    if channels == 0 {
        return Err(ConfigurationError::invalid("channels", "must be positive"));
    }

    let features = in_size.with_channels(channels).downsampled(pool_count).map(|shape| shape.size()).ok_or(
        ConfigurationError::NonPositiveFeatureSize {
            channels,
            height: in_size.height(),
            width: in_size.width(),
            pool_count,
        },
    )?;

    let mut arch = Architecture::default();
    let mut prev = features;

    for &hidden in hidden_dims {
        arch.push(LayerSpec::Linear { inputs: prev, outputs: hidden });
        arch.push(LayerSpec::Activate(Activation::ReLU));

        if dropout > 0.0 {
            arch.push(LayerSpec::Dropout { p: dropout, spatial: false });
        }

        prev = hidden;
    }

    arch.push(LayerSpec::Linear { inputs: prev, outputs: out_classes });

    debug!(features, hidden = hidden_dims.len(), out_classes, "built classifier head");

    Ok(arch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> FeatureOptions {
        FeatureOptions::default()
    }

    #[test]
    fn pools_after_every_complete_run() {
        let (arch, pools) = build_feature_extractor(3, &[16, 16, 32, 32], &[], 2, &plain()).unwrap();

        assert_eq!(pools, 2);
        assert_eq!(arch.downsample_count(), 2);
        assert_eq!(arch.len(), 4 * 2 + 2);
        assert_eq!(arch.output_shape(Shape::new(3, 32, 32)), Ok(Shape::new(32, 8, 8)));
    }

    #[test]
    fn remainder_has_no_pool() {
        let (arch, pools) = build_feature_extractor(3, &[16, 16, 16], &[], 2, &plain()).unwrap();

        assert_eq!(pools, 1);
        assert_eq!(arch.layers().last(), Some(&LayerSpec::Activate(Activation::ReLU)));
        assert!(matches!(arch.layers()[arch.len() - 2], LayerSpec::Conv(ConvolutionSpec { input_channels: 16, .. })));
        assert_eq!(arch.output_shape(Shape::new(3, 32, 32)), Ok(Shape::new(16, 16, 16)));
    }

    #[test]
    fn pool_count_is_floor_of_ratio() {
        for n in 1..8 {
            for p in 1..5 {
                let channels = vec![4; n];
                for strategy in [BlockStrategy::Plain, BlockStrategy::Residual, BlockStrategy::Composite] {
                    let options = FeatureOptions { strategy, ..plain() };
                    let (arch, pools) = build_feature_extractor(3, &channels, &[], p, &options).unwrap();
                    assert_eq!(pools, n / p, "n = {n}, p = {p}, {strategy:?}");
                    assert_eq!(arch.downsample_count(), n / p);
                }
            }
        }
    }

    #[test]
    fn residual_runs_become_blocks() {
        let options = FeatureOptions { strategy: BlockStrategy::Residual, ..plain() };
        let (arch, pools) = build_feature_extractor(3, &[8, 8, 16, 16, 32], &[3, 3, 5, 5, 3], 2, &options).unwrap();

        assert_eq!(pools, 2);
        assert_eq!(arch.len(), 5);

        let LayerSpec::Residual(last) = &arch.layers()[4] else { panic!("Expected trailing residual block!") };
        assert_eq!(last.main.len(), 1);
        assert!(!last.has_identity_shortcut());

        assert_eq!(arch.output_shape(Shape::new(3, 20, 20)), Ok(Shape::new(32, 5, 5)));
    }

    #[test]
    fn strided_downsample() {
        let options = FeatureOptions { downsample: Downsample::StridedConv, ..plain() };
        let (arch, pools) = build_feature_extractor(1, &[4, 6], &[], 1, &options).unwrap();

        assert_eq!(pools, 2);
        assert_eq!(arch.output_shape(Shape::new(1, 9, 9)), Ok(Shape::new(6, 2, 2)));
    }

    #[test]
    fn hybrid_pools_first_then_learns() {
        let options = FeatureOptions { downsample: Downsample::Hybrid, ..plain() };
        let (arch, pools) = build_feature_extractor(1, &[4, 6, 8], &[], 1, &options).unwrap();

        assert_eq!(pools, 3);
        assert_eq!(arch.layers()[2], LayerSpec::MaxPool { kernel_size: 2, stride: 2 });

        for (idx, channels) in [(5, 6), (8, 8)] {
            let LayerSpec::Conv(conv) = &arch.layers()[idx] else { panic!("Expected strided convolution!") };
            assert_eq!((conv.input_channels, conv.output_channels, conv.kernel_size, conv.stride), (channels, channels, 2, 2));
        }

        assert_eq!(arch.output_shape(Shape::new(1, 17, 16)), Ok(Shape::new(8, 2, 2)));
    }

    #[test]
    fn configuration_errors() {
        assert_eq!(
            build_feature_extractor(3, &[8, 8], &[3], 1, &plain()),
            Err(ConfigurationError::MismatchedLengths { what: "kernel_sizes", expected: 2, got: 1 })
        );
        assert_eq!(build_feature_extractor(3, &[8], &[4], 1, &plain()), Err(ConfigurationError::EvenKernelSize(4)));
        assert_eq!(build_feature_extractor(3, &[], &[], 1, &plain()), Err(ConfigurationError::EmptyList("channels")));
        assert!(build_feature_extractor(3, &[8], &[], 0, &plain()).is_err());
    }

    #[test]
    fn head_size_from_pool_count() {
        let head = build_classifier_head(Shape::new(3, 32, 32), 32, 2, &[100], 10, 0.0).unwrap();

        assert_eq!(
            head.layers(),
            &[
                LayerSpec::Linear { inputs: 2048, outputs: 100 },
                LayerSpec::Activate(Activation::ReLU),
                LayerSpec::Linear { inputs: 100, outputs: 10 },
            ]
        );
    }

    #[test]
    fn head_with_dropout_and_no_hidden() {
        let head = build_classifier_head(Shape::new(1, 7, 5), 2, 1, &[8, 4], 3, 0.25).unwrap();
        assert_eq!(head.len(), 7);
        assert_eq!(head.layers()[0], LayerSpec::Linear { inputs: 2 * 3 * 2, outputs: 8 });
        assert_eq!(head.layers()[2], LayerSpec::Dropout { p: 0.25, spatial: false });

        let direct = build_classifier_head(Shape::new(1, 4, 4), 2, 0, &[], 3, 0.0).unwrap();
        assert_eq!(direct.layers(), &[LayerSpec::Linear { inputs: 32, outputs: 3 }]);
    }

    #[test]
    fn head_rejects_vanishing_features() {
        assert_eq!(
            build_classifier_head(Shape::new(3, 8, 8), 16, 4, &[10], 10, 0.0),
            Err(ConfigurationError::NonPositiveFeatureSize { channels: 16, height: 8, width: 8, pool_count: 4 })
        );
        assert!(build_classifier_head(Shape::new(3, 8, 8), 16, 64, &[10], 10, 0.0).is_err());
        assert!(build_classifier_head(Shape::new(3, 8, 8), 0, 1, &[10], 10, 0.0).is_err());

        // one side surviving is not enough
        assert!(build_classifier_head(Shape::new(3, 64, 2), 16, 2, &[10], 10, 0.0).is_err());
        assert!(build_classifier_head(Shape::new(3, 64, 2), 16, 1, &[10], 10, 0.0).is_ok());
    }
}
