mod generator;
mod source;

pub use generator::Synthesizer;
pub use source::sine_source;
