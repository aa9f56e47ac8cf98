mod classifier;
mod vae;

use convnet_lib::Shape;
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

#[derive(StructOpt)]
pub enum Options {
    Classifier(classifier::ClassifierOptions),
    Vae(vae::VaeOptions),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    match Options::from_args() {
        Options::Classifier(options) => options.run(),
        Options::Vae(options) => options.run(),
    }
}

/// Parses `C,H,W`.
fn parse_shape(text: &str) -> anyhow::Result<Shape> {
    let dims = text.split(',').map(|x| x.trim().parse::<usize>()).collect::<Result<Vec<_>, _>>()?;

    match dims[..] {
        [c, h, w] => Ok(Shape::try_new(c, h, w)?),
        _ => anyhow::bail!("Expected three comma separated dimensions, got {text:?}"),
    }
}
