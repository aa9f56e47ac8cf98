mod blas;
mod conv;
mod norm;
mod pool;

pub use blas::linear_fwd;
pub use conv::{conv_fwd, conv_transpose_fwd};
pub use norm::{channel_statistics, normalise};
pub use pool::max_pool_fwd;
