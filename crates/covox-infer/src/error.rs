use std::fmt;

#[derive(Debug)]
pub enum ConvertError {
    Pitch(String),
    Shape(String),
    Synthesis(String),
    Candle(String),
    Audio(String),
    Io(String),
    Cancelled,
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvertError::Pitch(msg) => write!(f, "pitch extraction error: {msg}"),
            ConvertError::Shape(msg) => write!(f, "shape error: {msg}"),
            ConvertError::Synthesis(msg) => write!(f, "synthesis error: {msg}"),
            ConvertError::Candle(msg) => write!(f, "candle error: {msg}"),
            ConvertError::Audio(msg) => write!(f, "audio error: {msg}"),
            ConvertError::Io(msg) => write!(f, "io error: {msg}"),
            ConvertError::Cancelled => write!(f, "conversion cancelled"),
        }
    }
}

impl std::error::Error for ConvertError {}

impl From<candle_core::Error> for ConvertError {
    fn from(err: candle_core::Error) -> Self {
        ConvertError::Candle(err.to_string())
    }
}

impl From<std::io::Error> for ConvertError {
    fn from(err: std::io::Error) -> Self {
        ConvertError::Io(err.to_string())
    }
}

impl From<covox_audio::AudioError> for ConvertError {
    fn from(err: covox_audio::AudioError) -> Self {
        ConvertError::Audio(err.to_string())
    }
}
