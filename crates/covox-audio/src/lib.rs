pub mod buffer;
pub mod effects;
pub mod error;
pub mod mix;

pub use buffer::{crossfade_join, AudioBuffer};
pub use effects::{apply_chain, EffectConfig};
pub use error::AudioError;
pub use mix::{mix, MixConfig, TailPolicy};
