pub mod logging;
pub mod matrix;

pub use logging::{init_file_logger, init_stdout_logger, FileLogger, StdoutLogger};
pub use matrix::{FeatureMatrix, MatrixError};

// Re-export log so downstream crates can use covox_base::log::*
pub use log;
