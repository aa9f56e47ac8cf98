use anyhow::Context;
use convnet_lib::{logger, BlockStrategy, ClassifierConfig, ConvClassifier, Downsample, Shape};
use structopt::StructOpt;

use crate::parse_shape;

#[derive(StructOpt)]
pub struct ClassifierOptions {
    #[structopt(long, default_value = "3,32,32", parse(try_from_str = parse_shape))]
    pub in_size: Shape,
    #[structopt(long, default_value = "10")]
    pub classes: usize,
    #[structopt(long, use_delimiter = true, default_value = "16,16,32,32")]
    pub channels: Vec<usize>,
    #[structopt(long, default_value = "2")]
    pub pool_every: usize,
    #[structopt(long, use_delimiter = true, default_value = "100")]
    pub hidden: Vec<usize>,
    /// One odd kernel size per convolution. 3x3 everywhere if omitted.
    #[structopt(long, use_delimiter = true)]
    pub kernel_sizes: Vec<usize>,
    /// One of `plain`, `residual` or `composite`.
    #[structopt(long, default_value = "plain", parse(try_from_str = parse_strategy))]
    pub strategy: BlockStrategy,
    /// One of `maxpool`, `strided` or `hybrid`.
    #[structopt(long, default_value = "maxpool", parse(try_from_str = parse_downsample))]
    pub downsample: Downsample,
    #[structopt(long)]
    pub batchnorm: bool,
    #[structopt(long, default_value = "0")]
    pub dropout: f32,
    #[structopt(long, default_value = "0")]
    pub head_dropout: f32,
    #[structopt(long, default_value = "4")]
    pub batch_size: usize,
    #[structopt(long)]
    pub seed: Option<u64>,
}

fn parse_strategy(text: &str) -> anyhow::Result<BlockStrategy> {
    match text.to_ascii_lowercase().as_str() {
        "plain" => Ok(BlockStrategy::Plain),
        "residual" => Ok(BlockStrategy::Residual),
        "composite" => Ok(BlockStrategy::Composite),
        _ => anyhow::bail!("Unknown block strategy {text:?}"),
    }
}

fn parse_downsample(text: &str) -> anyhow::Result<Downsample> {
    match text.to_ascii_lowercase().as_str() {
        "maxpool" => Ok(Downsample::MaxPool),
        "strided" => Ok(Downsample::StridedConv),
        "hybrid" => Ok(Downsample::Hybrid),
        _ => anyhow::bail!("Unknown downsampling {text:?}"),
    }
}

impl ClassifierOptions {
    pub fn config(&self) -> ClassifierConfig {
        ClassifierConfig {
            in_size: self.in_size,
            out_classes: self.classes,
            channels: self.channels.clone(),
            pool_every: self.pool_every,
            hidden_dims: self.hidden.clone(),
            kernel_sizes: self.kernel_sizes.clone(),
            strategy: self.strategy,
            downsample: self.downsample,
            batchnorm: self.batchnorm,
            dropout: self.dropout,
            head_dropout: self.head_dropout,
            seed: self.seed,
        }
    }

    pub fn run(&self) -> anyhow::Result<()> {
        let config = self.config();
        config.display();

        let mut model = ConvClassifier::new(&config).with_context(|| "Failed to build classifier")?;
        let arch = model.architecture();

        println!();
        print!("{}", logger::summary(&arch.features, arch.in_size)?);
        print!("{}", logger::summary(&arch.head, Shape::flat(arch.feature_shape.size()))?);
        println!("Downsamplings          : {}", logger::ansi(arch.pool_count, 31));
        println!("Parameters             : {}", logger::ansi(model.num_params(), 31));

        model.eval();
        let mut rng = convnet_lib::rng::seeded(self.seed);
        let batch = convnet_lib::rng::standard_normal(&mut rng, self.in_size, self.batch_size)?;
        let scores = model.forward(&batch)?;

        for (i, sample) in scores.samples().enumerate() {
            println!("Sample {i:>3}             : {sample:.3?}");
        }

        Ok(())
    }
}
