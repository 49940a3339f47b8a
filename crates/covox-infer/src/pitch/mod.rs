pub mod contour;
pub mod rmvpe;

pub use contour::{PitchContour, PitchFrame};
pub use rmvpe::PitchEstimator;
