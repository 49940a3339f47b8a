use std::fmt;

#[derive(Debug)]
pub enum AudioError {
    Buffer(String),
    MixAlignment(String),
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioError::Buffer(msg) => write!(f, "buffer error: {msg}"),
            AudioError::MixAlignment(msg) => write!(f, "mix alignment error: {msg}"),
        }
    }
}

impl std::error::Error for AudioError {}
