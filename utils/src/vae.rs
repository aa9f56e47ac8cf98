use anyhow::Context;
use convnet_lib::{logger, vae_loss, Shape, Vae, VaeConfig};
use structopt::StructOpt;

use crate::parse_shape;

#[derive(StructOpt)]
pub struct VaeOptions {
    #[structopt(long, default_value = "3,64,64", parse(try_from_str = parse_shape))]
    pub in_size: Shape,
    #[structopt(long, default_value = "64")]
    pub z_dim: usize,
    #[structopt(long, default_value = "1024")]
    pub features: usize,
    #[structopt(long, use_delimiter = true, default_value = "256,512,1024")]
    pub hidden: Vec<usize>,
    #[structopt(long)]
    pub no_batchnorm: bool,
    #[structopt(long, default_value = "0.1")]
    pub dropout: f32,
    #[structopt(long, default_value = "1")]
    pub x_sigma2: f32,
    #[structopt(long, default_value = "2")]
    pub batch_size: usize,
    #[structopt(long, default_value = "1")]
    pub samples: usize,
    #[structopt(long)]
    pub seed: Option<u64>,
}

impl VaeOptions {
    pub fn run(&self) -> anyhow::Result<()> {
        let config = VaeConfig {
            in_size: self.in_size,
            z_dim: self.z_dim,
            feature_channels: self.features,
            hidden_channels: self.hidden.clone(),
            batchnorm: !self.no_batchnorm,
            dropout: self.dropout,
            seed: self.seed,
        };

        config.display();

        let mut vae = Vae::from_config(&config).with_context(|| "Failed to build VAE")?;

        println!();
        print!("{}", logger::summary(vae.encoder().architecture(), vae.in_size())?);
        print!("{}", logger::summary(vae.decoder().architecture(), vae.feature_shape())?);
        println!("Feature Shape          : {}", logger::ansi(vae.feature_shape(), 31));
        println!("Parameters             : {}", logger::ansi(vae.num_params(), 31));

        let mut rng = convnet_lib::rng::seeded(self.seed);
        let batch = convnet_lib::rng::standard_normal(&mut rng, self.in_size, self.batch_size)?.map(f32::tanh);

        vae.eval();
        let output = vae.forward(&batch)?;
        let loss = vae_loss(&batch, &output.reconstruction, output.mean(), output.log_variance(), self.x_sigma2)?;

        println!("Loss                   : {}", logger::ansi(format!("{:.4}", loss.loss), 31));
        println!("Data / KL              : {:.4} / {:.4}", loss.data_loss, loss.kl_loss);

        let samples = vae.sample(self.samples)?;
        println!("Sampled                : {}", logger::ansi(format!("{:?}", samples.dims()), 31));

        Ok(())
    }
}
