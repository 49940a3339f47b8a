use std::fmt;

#[derive(Debug)]
pub enum PackageError {
    MissingWeights(String),
    AmbiguousWeights(String),
    AmbiguousIndex(String),
    CorruptWeights(String),
    CorruptIndex(String),
    Metadata(String),
    UnsupportedUrl(String),
    Fetch(String),
    Io(String),
}

impl fmt::Display for PackageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageError::MissingWeights(msg) => write!(f, "no weights file found: {msg}"),
            PackageError::AmbiguousWeights(msg) => {
                write!(f, "more than one weights file candidate: {msg}")
            }
            PackageError::AmbiguousIndex(msg) => {
                write!(f, "more than one index file candidate: {msg}")
            }
            PackageError::CorruptWeights(msg) => write!(f, "weights not loadable: {msg}"),
            PackageError::CorruptIndex(msg) => write!(f, "index not loadable: {msg}"),
            PackageError::Metadata(msg) => write!(f, "package metadata error: {msg}"),
            PackageError::UnsupportedUrl(msg) => write!(f, "unsupported download host: {msg}"),
            PackageError::Fetch(msg) => write!(f, "archive fetch failed: {msg}"),
            PackageError::Io(msg) => write!(f, "io error: {msg}"),
        }
    }
}

impl std::error::Error for PackageError {}

impl From<std::io::Error> for PackageError {
    fn from(err: std::io::Error) -> Self {
        PackageError::Io(err.to_string())
    }
}

impl From<zip::result::ZipError> for PackageError {
    fn from(err: zip::result::ZipError) -> Self {
        PackageError::Io(format!("zip: {err}"))
    }
}
