use crate::{
    error::{ConfigurationError, Error, ShapeMismatchError},
    tensor::Tensor,
};

/// Scalar terms of the VAE objective for one batch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VaeLoss {
    pub loss: f32,
    pub data_loss: f32,
    pub kl_loss: f32,
}

/// Gradients of [`VaeLoss::loss`] with respect to each of its tensor inputs.
#[derive(Clone, Debug, PartialEq)]
pub struct VaeLossGradients {
    pub reconstruction: Tensor,
    pub mean: Tensor,
    pub log_variance: Tensor,
}

fn check_inputs(x: &Tensor, xr: &Tensor, mean: &Tensor, log_variance: &Tensor, x_sigma2: f32) -> Result<(), Error> {
    if x_sigma2.is_nan() || x_sigma2 <= 0.0 {
        return Err(ConfigurationError::invalid("x_sigma2", format!("must be positive, got {x_sigma2}")).into());
    }

    x.check_same_dims("reconstruction", xr)?;
    mean.check_same_dims("log variance", log_variance)?;

    if mean.batch_size() != x.batch_size() {
        return Err(ShapeMismatchError::new("latent batch", x.batch_size(), mean.batch_size()).into());
    }

    Ok(())
}

/// Reconstruction error scaled by `1 / x_sigma2` plus the KL divergence of
/// the posterior from the unit Gaussian.
///
/// The data term is averaged over every element of `x`. The KL term is
/// `(sum(exp(lv)) + ||mean||^2 - sum(lv)) / N - z_dim`, with `z_dim` taken off
/// after the batch average. This equals the batch mean of the per-sample
/// `sum(exp(lv) + mean^2 - 1 - lv)`, which has no leading `0.5`.
pub fn vae_loss(
    x: &Tensor,
    xr: &Tensor,
    mean: &Tensor,
    log_variance: &Tensor,
    x_sigma2: f32,
) -> Result<VaeLoss, Error> {
    check_inputs(x, xr, mean, log_variance, x_sigma2)?;

    let dx = x.size() as f64;
    let squared_error = x.values().iter().zip(xr.values()).map(|(&a, &b)| f64::from(a - b).powi(2)).sum::<f64>();
    let data_loss = squared_error / (f64::from(x_sigma2) * dx);

    let n = mean.batch_size() as f64;
    let z_dim = mean.shape().size() as f64;

    let mut kl = 0.0;
    for (&mu, &lv) in mean.values().iter().zip(log_variance.values()) {
        let (mu, lv) = (f64::from(mu), f64::from(lv));
        kl += lv.exp() + mu * mu - lv;
    }
    let kl_loss = kl / n - z_dim;

    Ok(VaeLoss { loss: (data_loss + kl_loss) as f32, data_loss: data_loss as f32, kl_loss: kl_loss as f32 })
}

/// Analytic gradients of [`vae_loss`].
pub fn vae_loss_backward(
    x: &Tensor,
    xr: &Tensor,
    mean: &Tensor,
    log_variance: &Tensor,
    x_sigma2: f32,
) -> Result<VaeLossGradients, Error> {
    check_inputs(x, xr, mean, log_variance, x_sigma2)?;

    let scale = 2.0 / (x_sigma2 * x.size() as f32);
    let mut reconstruction = xr.clone();
    for (g, &target) in reconstruction.values_mut().iter_mut().zip(x.values()) {
        *g = scale * (*g - target);
    }

    let n = mean.batch_size() as f32;
    let mean_grad = mean.clone().map(|mu| 2.0 * mu / n);
    let log_variance_grad = log_variance.clone().map(|lv| (lv.exp() - 1.0) / n);

    Ok(VaeLossGradients { reconstruction, mean: mean_grad, log_variance: log_variance_grad })
}

#[cfg(test)]
mod tests {
    use crate::shape::Shape;

    use super::*;

    fn tensor(shape: Shape, batch_size: usize, values: Vec<f32>) -> Tensor {
        Tensor::from_vec(shape, batch_size, values).unwrap()
    }

    #[test]
    fn standard_posterior_has_no_divergence() {
        let x = tensor(Shape::new(1, 2, 2), 2, vec![0.5; 8]);
        let mean = Tensor::zeroed(Shape::flat(3), 2);
        let log_variance = Tensor::zeroed(Shape::flat(3), 2);

        let loss = vae_loss(&x, &x, &mean, &log_variance, 1.0).unwrap();
        assert_eq!(loss.kl_loss, 0.0);
        assert_eq!(loss.data_loss, 0.0);
        assert_eq!(loss.loss, 0.0);
    }

    #[test]
    fn data_term_is_mean_squared_error_over_sigma() {
        let x = tensor(Shape::new(1, 1, 2), 2, vec![1.0, 2.0, 3.0, 4.0]);
        let xr = tensor(Shape::new(1, 1, 2), 2, vec![0.0, 2.0, 3.0, 2.0]);
        let latent = Tensor::zeroed(Shape::flat(1), 2);

        let loss = vae_loss(&x, &xr, &latent, &latent, 0.5).unwrap();
        assert!((loss.data_loss - 2.5).abs() < 1e-6);
    }

    #[test]
    fn divergence_matches_per_sample_average() {
        let mean = tensor(Shape::flat(2), 3, vec![0.5, -1.0, 0.0, 0.2, 1.5, -0.3]);
        let log_variance = tensor(Shape::flat(2), 3, vec![0.3, -0.2, 1.0, 0.0, -0.7, 0.4]);
        let x = Tensor::zeroed(Shape::flat(1), 3);

        let loss = vae_loss(&x, &x, &mean, &log_variance, 1.0).unwrap();

        let per_sample = mean
            .samples()
            .zip(log_variance.samples())
            .map(|(mu, lv)| mu.iter().zip(lv).map(|(&m, &l)| l.exp() + m * m - 1.0 - l).sum::<f32>())
            .collect::<Vec<_>>();

        let average = per_sample.iter().sum::<f32>() / 3.0;
        assert!((loss.kl_loss - average).abs() < 1e-5);

        // twice the usual closed form, which carries a factor of 0.5
        let textbook = 0.5 * average;
        assert!((loss.kl_loss - 2.0 * textbook).abs() < 1e-5);
    }

    #[test]
    fn divergence_is_averaged_over_batch() {
        let mean = Tensor::zeroed(Shape::flat(4), 3);
        let log_variance = Tensor::zeroed(Shape::flat(4), 3);
        let x = Tensor::zeroed(Shape::flat(1), 3);

        let loss = vae_loss(&x, &x, &mean, &log_variance, 1.0).unwrap();
        assert_eq!(loss.kl_loss, 0.0);

        let shifted = tensor(Shape::flat(4), 3, vec![1.0; 12]);
        let loss = vae_loss(&x, &x, &shifted, &log_variance, 1.0).unwrap();
        assert!((loss.kl_loss - 4.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_bad_inputs() {
        let x = Tensor::zeroed(Shape::new(1, 2, 2), 2);
        let latent = Tensor::zeroed(Shape::flat(3), 2);

        assert!(matches!(vae_loss(&x, &x, &latent, &latent, 0.0), Err(Error::Configuration(_))));
        assert!(matches!(vae_loss(&x, &x, &latent, &latent, f32::NAN), Err(Error::Configuration(_))));

        let xr = Tensor::zeroed(Shape::new(1, 2, 3), 2);
        assert!(matches!(vae_loss(&x, &xr, &latent, &latent, 1.0), Err(Error::ShapeMismatch(_))));

        let other = Tensor::zeroed(Shape::flat(3), 1);
        assert!(matches!(vae_loss(&x, &x, &other, &other, 1.0), Err(Error::ShapeMismatch(_))));
        assert!(matches!(vae_loss(&x, &x, &latent, &other, 1.0), Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn gradients_match_finite_differences() {
        let shape = Shape::new(1, 1, 3);
        let x = tensor(shape, 2, vec![0.2, -0.4, 0.9, 0.1, 0.0, -0.3]);
        let xr = tensor(shape, 2, vec![0.5, -0.1, 0.4, 0.3, 0.2, -0.8]);
        let mean = tensor(Shape::flat(2), 2, vec![0.3, -0.6, 0.8, 0.1]);
        let log_variance = tensor(Shape::flat(2), 2, vec![-0.5, 0.4, 0.2, -0.1]);
        let x_sigma2 = 0.7;

        let grads = vae_loss_backward(&x, &xr, &mean, &log_variance, x_sigma2).unwrap();
        let eps = 1e-3;

        let check = |analytic: &Tensor, perturb: &dyn Fn(usize, f32) -> f32| {
            for (i, &g) in analytic.values().iter().enumerate() {
                let numeric = (perturb(i, eps) - perturb(i, -eps)) / (2.0 * eps);
                assert!((numeric - g).abs() < 1e-2, "index {i}: numeric {numeric}, analytic {g}");
            }
        };

        let nudge = |t: &Tensor, i: usize, d: f32| {
            let mut t = t.clone();
            t.values_mut()[i] += d;
            t
        };

        check(&grads.reconstruction, &|i, d| {
            vae_loss(&x, &nudge(&xr, i, d), &mean, &log_variance, x_sigma2).unwrap().loss
        });
        check(&grads.mean, &|i, d| vae_loss(&x, &xr, &nudge(&mean, i, d), &log_variance, x_sigma2).unwrap().loss);
        check(&grads.log_variance, &|i, d| vae_loss(&x, &xr, &mean, &nudge(&log_variance, i, d), x_sigma2).unwrap().loss);
    }
}
