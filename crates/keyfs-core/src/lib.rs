pub mod alg;
pub mod config;
pub mod error;

pub use alg::KeyAlg;
pub use error::{KeyfsError, KeyfsResult};
