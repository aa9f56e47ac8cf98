use convnet_lib::{
    arch::{decoder_stack, encoder_stack},
    vae_loss, vae_loss_backward, Error, Shape, Tensor, Vae, VaeConfig,
};

fn small(in_size: Shape) -> VaeConfig {
    VaeConfig {
        in_size,
        z_dim: 6,
        feature_channels: 16,
        hidden_channels: vec![4, 8, 8],
        seed: Some(7),
        ..VaeConfig::default()
    }
}

#[test]
fn default_sizes_round_trip() -> Result<(), Error> {
    let vae = Vae::from_config(&small(Shape::new(3, 64, 64)))?;
    assert_eq!(vae.feature_shape(), Shape::new(16, 5, 5));

    let vae = Vae::from_config(&small(Shape::new(1, 32, 32)))?;
    assert_eq!(vae.feature_shape(), Shape::new(16, 1, 1));

    Ok(())
}

#[test]
fn forward_shapes_and_loss() -> Result<(), Error> {
    let in_size = Shape::new(3, 32, 32);
    let mut vae = Vae::from_config(&small(in_size))?;

    let mut rng = convnet_lib::rng::seeded(Some(1));
    let x = convnet_lib::rng::standard_normal(&mut rng, in_size, 3)?.map(f32::tanh);

    let output = vae.forward(&x)?;
    assert_eq!(output.reconstruction.dims(), [3, 3, 32, 32]);
    assert_eq!(output.mean().dims(), [3, 6, 1, 1]);
    assert_eq!(output.log_variance().dims(), [3, 6, 1, 1]);
    assert_eq!(output.latent.z.dims(), [3, 6, 1, 1]);
    assert!(output.reconstruction.values().iter().all(|x| (-1.0..=1.0).contains(x)));

    let loss = vae_loss(&x, &output.reconstruction, output.mean(), output.log_variance(), 1.0)?;
    assert!(loss.loss.is_finite());
    assert!((loss.loss - loss.data_loss - loss.kl_loss).abs() < 1e-4);

    let grads = vae_loss_backward(&x, &output.reconstruction, output.mean(), output.log_variance(), 1.0)?;
    let (dmean, dlogvar) = output.latent.backward(&grads.mean)?;
    assert_eq!(dmean.dims(), dlogvar.dims());

    Ok(())
}

#[test]
fn sampling_restores_mode() -> Result<(), Error> {
    let mut vae = Vae::from_config(&small(Shape::new(1, 32, 32)))?;
    vae.train();

    let samples = vae.sample(4)?;
    assert_eq!(samples.dims(), [4, 1, 32, 32]);
    assert!(samples.values().iter().all(|x| (-1.0..=1.0).contains(x)));

    // still training, so two passes over the same input draw different dropout masks and noise
    let x = Tensor::zeroed(Shape::new(1, 32, 32), 2);
    assert_ne!(vae.forward(&x)?.latent.z, vae.forward(&x)?.latent.z);

    Ok(())
}

#[test]
fn rejects_wrong_input() -> Result<(), Error> {
    let mut vae = Vae::from_config(&small(Shape::new(1, 32, 32)))?;

    let result = vae.forward(&Tensor::zeroed(Shape::new(1, 32, 31), 1));
    assert!(result.is_err());

    let result = vae.decode(&Tensor::zeroed(Shape::flat(5), 1));
    assert!(result.is_err());

    Ok(())
}

#[test]
fn incompatible_stacks_are_rejected() -> Result<(), Error> {
    let in_size = Shape::new(1, 36, 36);
    let encoder = encoder_stack(1, 16, &[4, 8, 8], false, 0.0)?;
    let decoder = decoder_stack(16, 1, &[4, 8, 8], false, 0.0)?;

    assert!(matches!(Vae::new(encoder, decoder, in_size, 4, Some(0)), Err(Error::ShapeMismatch(_))));

    let encoder = encoder_stack(1, 16, &[4, 8, 8], false, 0.0)?;
    let decoder = decoder_stack(16, 2, &[4, 8, 8], false, 0.0)?;
    assert!(matches!(Vae::new(encoder, decoder, Shape::new(1, 32, 32), 4, Some(0)), Err(Error::ShapeMismatch(_))));

    let encoder = encoder_stack(1, 16, &[4, 8, 8], false, 0.0)?;
    let decoder = decoder_stack(16, 1, &[4, 8, 8], false, 0.0)?;
    assert!(matches!(Vae::new(encoder, decoder, Shape::new(1, 32, 32), 0, Some(0)), Err(Error::Configuration(_))));

    Ok(())
}
