use crate::error::ConfigurationError;

/// Per-sample shape of a tensor, `channels x height x width`.
/// Feature vectors are stored as `features x 1 x 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Shape {
    channels: usize,
    height: usize,
    width: usize,
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_flat() {
            write!(f, "{}", self.channels)
        } else {
            write!(f, "{} x {} x {}", self.channels, self.height, self.width)
        }
    }
}

impl Shape {
    pub fn new(channels: usize, height: usize, width: usize) -> Self {
        assert!(channels > 0, "Cannot have 0 channels!");
        assert!(height > 0, "Cannot have 0 height!");
        assert!(width > 0, "Cannot have 0 width!");
        Self { channels, height, width }
    }

    /// Fallible constructor for shapes coming from user configuration.
    pub fn try_new(channels: usize, height: usize, width: usize) -> Result<Self, ConfigurationError> {
        if channels == 0 || height == 0 || width == 0 {
            return Err(ConfigurationError::invalid("in_size", format!("{channels}x{height}x{width} has a zero extent")));
        }

        Ok(Self { channels, height, width })
    }

    pub fn flat(features: usize) -> Self {
        Self::new(features, 1, 1)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn spatial(&self) -> usize {
        self.height * self.width
    }

    pub fn size(&self) -> usize {
        self.channels * self.height * self.width
    }

    pub fn is_flat(&self) -> bool {
        self.height == 1 && self.width == 1
    }

    pub fn with_channels(&self, channels: usize) -> Self {
        Self::new(channels, self.height, self.width)
    }

    /// Spatial extent after `pool_count` successive 2x downsamplings, which is
    /// `floor(H / 2^k) x floor(W / 2^k)`. Returns `None` if either side vanishes.
    pub fn downsampled(&self, pool_count: usize) -> Option<Self> {
        let factor = 1usize.checked_shl(u32::try_from(pool_count).ok()?)?;
        let height = self.height / factor;
        let width = self.width / factor;

        (height > 0 && width > 0).then_some(Self { channels: self.channels, height, width })
    }
}

fn check_window(output_channels: usize, kernel_size: usize, stride: usize) -> Result<(), ConfigurationError> {
    if output_channels == 0 {
        return Err(ConfigurationError::invalid("output_channels", "must be positive"));
    }

    if kernel_size == 0 {
        return Err(ConfigurationError::invalid("kernel_size", "must be positive"));
    }

    if stride == 0 {
        return Err(ConfigurationError::invalid("stride", "must be positive"));
    }

    Ok(())
}

/// Concrete geometry of a (possibly transposed) square-kernel convolution
/// applied to a known input shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConvolutionDescription {
    pub input_shape: Shape,
    pub output_shape: Shape,
    pub kernel_size: usize,
    pub stride: usize,
    /// Can be 0, e.g. for 1x1 projections.
    pub padding: usize,
    pub transposed: bool,
}

impl ConvolutionDescription {
    pub fn new(
        input_shape: Shape,
        output_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
    ) -> Result<Self, ConfigurationError> {
        check_window(output_channels, kernel_size, stride)?;

        let out = |extent: usize| {
            (extent + 2 * padding).checked_sub(kernel_size).map(|x| x / stride + 1)
        };

        let invalid = || ConfigurationError::InvalidShape { op: "convolution", shape: input_shape };

        let hout = out(input_shape.height()).ok_or_else(invalid)?;
        let wout = out(input_shape.width()).ok_or_else(invalid)?;

        Ok(Self {
            input_shape,
            output_shape: Shape::new(output_channels, hout, wout),
            kernel_size,
            stride,
            padding,
            transposed: false,
        })
    }

    pub fn new_transposed(
        input_shape: Shape,
        output_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
    ) -> Result<Self, ConfigurationError> {
        check_window(output_channels, kernel_size, stride)?;

        let out = |extent: usize| {
            ((extent - 1) * stride + kernel_size).checked_sub(2 * padding).filter(|&x| x > 0)
        };

        let invalid = || ConfigurationError::InvalidShape { op: "transposed convolution", shape: input_shape };

        let hout = out(input_shape.height()).ok_or_else(invalid)?;
        let wout = out(input_shape.width()).ok_or_else(invalid)?;

        Ok(Self {
            input_shape,
            output_shape: Shape::new(output_channels, hout, wout),
            kernel_size,
            stride,
            padding,
            transposed: true,
        })
    }

    pub fn input_channels(&self) -> usize {
        self.input_shape.channels()
    }

    pub fn output_channels(&self) -> usize {
        self.output_shape.channels()
    }

    /// Number of filter weights, laid out as `[out][in][k][k]`
    /// (`[in][out][k][k]` when transposed).
    pub fn filter_size(&self) -> usize {
        self.input_channels() * self.output_channels() * self.kernel_size * self.kernel_size
    }
}

/// Geometry of a max-pooling window applied to a known input shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolDescription {
    pub input_shape: Shape,
    pub output_shape: Shape,
    pub kernel_size: usize,
    pub stride: usize,
}

impl PoolDescription {
    pub fn new(input_shape: Shape, kernel_size: usize, stride: usize) -> Result<Self, ConfigurationError> {
        check_window(input_shape.channels(), kernel_size, stride)?;

        let out = |extent: usize| extent.checked_sub(kernel_size).map(|x| x / stride + 1);
        let invalid = || ConfigurationError::InvalidShape { op: "max pool", shape: input_shape };

        let hout = out(input_shape.height()).ok_or_else(invalid)?;
        let wout = out(input_shape.width()).ok_or_else(invalid)?;

        Ok(Self { input_shape, output_shape: Shape::new(input_shape.channels(), hout, wout), kernel_size, stride })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_padding_preserves_extent() {
        for k in [1, 3, 5, 7] {
            let desc = ConvolutionDescription::new(Shape::new(3, 9, 6), 8, k, 1, k / 2).unwrap();
            assert_eq!(desc.output_shape, Shape::new(8, 9, 6));
        }
    }

    #[test]
    fn strided_kernel4_halves() {
        let desc = ConvolutionDescription::new(Shape::new(3, 64, 64), 16, 4, 2, 1).unwrap();
        assert_eq!(desc.output_shape, Shape::new(16, 32, 32));

        let last = ConvolutionDescription::new(Shape::new(16, 8, 8), 4, 4, 1, 0).unwrap();
        assert_eq!(last.output_shape, Shape::new(4, 5, 5));
    }

    #[test]
    fn transposed_inverts_strided() {
        let up = ConvolutionDescription::new_transposed(Shape::new(4, 5, 5), 16, 4, 1, 0).unwrap();
        assert_eq!(up.output_shape, Shape::new(16, 8, 8));

        let up = ConvolutionDescription::new_transposed(Shape::new(16, 32, 32), 3, 4, 2, 1).unwrap();
        assert_eq!(up.output_shape, Shape::new(3, 64, 64));
    }

    #[test]
    fn kernel_larger_than_input() {
        let err = ConvolutionDescription::new(Shape::new(1, 2, 2), 1, 5, 1, 0).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidShape { .. }));
    }

    #[test]
    fn degenerate_windows() {
        let invalid = |result: Result<Shape, ConfigurationError>, param: &str| {
            assert!(matches!(result, Err(ConfigurationError::InvalidParameter { name, .. }) if name == param));
        };

        let input = Shape::new(2, 6, 6);
        invalid(ConvolutionDescription::new(input, 4, 3, 0, 1).map(|d| d.output_shape), "stride");
        invalid(ConvolutionDescription::new(input, 4, 0, 1, 0).map(|d| d.output_shape), "kernel_size");
        invalid(ConvolutionDescription::new(input, 0, 3, 1, 1).map(|d| d.output_shape), "output_channels");
        invalid(ConvolutionDescription::new_transposed(input, 4, 4, 0, 1).map(|d| d.output_shape), "stride");
        invalid(PoolDescription::new(input, 2, 0).map(|d| d.output_shape), "stride");
        invalid(PoolDescription::new(input, 0, 2).map(|d| d.output_shape), "kernel_size");
    }

    #[test]
    fn pooling_floors() {
        let pool = PoolDescription::new(Shape::new(2, 7, 5), 2, 2).unwrap();
        assert_eq!(pool.output_shape, Shape::new(2, 3, 2));
        assert!(PoolDescription::new(Shape::new(2, 1, 4), 2, 2).is_err());
    }

    #[test]
    fn downsampled_matches_repeated_halving() {
        let shape = Shape::new(3, 37, 20);
        assert_eq!(shape.downsampled(0), Some(shape));
        assert_eq!(shape.downsampled(2), Some(Shape::new(3, 9, 5)));
        assert_eq!(shape.downsampled(5), None);
    }
}
