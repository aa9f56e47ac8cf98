use crate::shape::Shape;

/// Per-channel mean and biased variance over batch and spatial positions.
pub fn channel_statistics(shape: Shape, batch_size: usize, input: &[f32]) -> (Vec<f32>, Vec<f32>) {
    let channels = shape.channels();
    let spatial = shape.spatial();
    let count = (batch_size * spatial) as f32;

    assert_eq!(input.len(), shape.size() * batch_size);

    let mut mean = vec![0.0; channels];
    let mut var = vec![0.0; channels];

    for (idx, plane) in input.chunks_exact(spatial).enumerate() {
        mean[idx % channels] += plane.iter().sum::<f32>();
    }

    for m in &mut mean {
        *m /= count;
    }

    for (idx, plane) in input.chunks_exact(spatial).enumerate() {
        let m = mean[idx % channels];
        var[idx % channels] += plane.iter().map(|x| (x - m).powi(2)).sum::<f32>();
    }

    for v in &mut var {
        *v /= count;
    }

    (mean, var)
}

/// `x = gamma * (x - mean) / sqrt(var + eps) + beta`, per channel.
pub fn normalise(
    shape: Shape,
    mean: &[f32],
    var: &[f32],
    gamma: &[f32],
    beta: &[f32],
    eps: f32,
    values: &mut [f32],
) {
    let channels = shape.channels();

    for (idx, plane) in values.chunks_exact_mut(shape.spatial()).enumerate() {
        let c = idx % channels;
        let scale = gamma[c] / (var[c] + eps).sqrt();

        for x in plane {
            *x = scale * (*x - mean[c]) + beta[c];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statistics_and_normalise() {
        let shape = Shape::new(2, 1, 2);
        let mut values = vec![1.0, 3.0, 10.0, 10.0, 5.0, 7.0, 10.0, 10.0];

        let (mean, var) = channel_statistics(shape, 2, &values);
        assert_eq!(mean, [4.0, 10.0]);
        assert_eq!(var, [5.0, 0.0]);

        normalise(shape, &mean, &var, &[1.0, 1.0], &[0.0, 2.0], 1e-5, &mut values[..4]);
        assert!((values[0] + 3.0 / 5f32.sqrt()).abs() < 1e-4);
        assert_eq!(&values[2..4], &[2.0, 2.0]);
    }
}
