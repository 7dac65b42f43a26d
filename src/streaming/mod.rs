pub mod frames;
pub mod normalizer;

pub use normalizer::ResponseNormalizer;
