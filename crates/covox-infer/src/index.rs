//! Nearest-neighbor feature retrieval against a package's reference matrix.

use covox_base::matrix::FeatureMatrix;

use crate::error::ConvertError;
use crate::pitch::PitchContour;

/// Blends each frame toward its exact nearest reference vector by squared
/// Euclidean distance. Ties break toward the lowest reference row.
///
/// With `ratio == 0` or no reference matrix the input is returned unchanged.
/// Unvoiced frames use the damped ratio `ratio * (1 - protect)` so consonant
/// frames keep more of the source content.
pub fn blend(
    features: &FeatureMatrix,
    reference: Option<&FeatureMatrix>,
    contour: &PitchContour,
    ratio: f32,
    protect: f32,
) -> Result<FeatureMatrix, ConvertError> {
    let reference = match reference {
        Some(r) if ratio > 0.0 && r.rows() > 0 => r,
        _ => return Ok(features.clone()),
    };
    if reference.dim() != features.dim() {
        return Err(ConvertError::Shape(format!(
            "index dim {} does not match feature dim {}",
            reference.dim(),
            features.dim()
        )));
    }
    if contour.len() != features.rows() {
        return Err(ConvertError::Shape(format!(
            "contour has {} frames, features have {} rows",
            contour.len(),
            features.rows()
        )));
    }

    let ratio = ratio.clamp(0.0, 1.0);
    let protect = protect.clamp(0.0, 1.0);
    let mut out = Vec::with_capacity(features.rows() * features.dim());
    for (frame, row) in features.iter_rows().enumerate() {
        let neighbor = nearest_row(reference, row);
        let eff = if contour.frames()[frame].is_voiced() {
            ratio
        } else {
            ratio * (1.0 - protect)
        };
        out.extend(
            row.iter()
                .zip(neighbor)
                .map(|(&a, &b)| eff * b + (1.0 - eff) * a),
        );
    }
    FeatureMatrix::new(features.dim(), out)
        .map_err(|e| ConvertError::Shape(format!("index blend output: {e}")))
}

fn nearest_row<'a>(reference: &'a FeatureMatrix, query: &[f32]) -> &'a [f32] {
    let mut best = 0usize;
    let mut best_dist = f32::INFINITY;
    for (i, row) in reference.iter_rows().enumerate() {
        let dist: f32 = row
            .iter()
            .zip(query)
            .map(|(&a, &b)| (a - b) * (a - b))
            .sum();
        if dist < best_dist {
            best_dist = dist;
            best = i;
        }
    }
    reference.row(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::PitchFrame;

    fn contour(voiced: &[bool]) -> PitchContour {
        PitchContour::new(
            voiced
                .iter()
                .map(|&v| {
                    if v {
                        PitchFrame::Voiced(200.0)
                    } else {
                        PitchFrame::Unvoiced
                    }
                })
                .collect(),
        )
    }

    #[test]
    fn zero_ratio_is_identity() {
        let features = FeatureMatrix::new(2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let reference = FeatureMatrix::new(2, vec![9.0, 9.0]).unwrap();
        let out = blend(&features, Some(&reference), &contour(&[true, true]), 0.0, 0.33)
            .unwrap();
        assert_eq!(out.as_slice(), features.as_slice());
    }

    #[test]
    fn full_ratio_replaces_with_neighbor() {
        let features = FeatureMatrix::new(2, vec![0.9, 0.9]).unwrap();
        let reference = FeatureMatrix::new(2, vec![0.0, 0.0, 1.0, 1.0]).unwrap();
        let out = blend(&features, Some(&reference), &contour(&[true]), 1.0, 0.0).unwrap();
        assert_eq!(out.as_slice(), &[1.0, 1.0]);
    }

    #[test]
    fn unvoiced_frames_are_damped() {
        let features = FeatureMatrix::new(1, vec![0.0, 0.0]).unwrap();
        let reference = FeatureMatrix::new(1, vec![1.0]).unwrap();
        let out = blend(
            &features,
            Some(&reference),
            &contour(&[true, false]),
            1.0,
            0.25,
        )
        .unwrap();
        assert!((out.as_slice()[0] - 1.0).abs() < 1e-6);
        assert!((out.as_slice()[1] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn ties_pick_lowest_row() {
        let features = FeatureMatrix::new(1, vec![0.5]).unwrap();
        // Rows 0 and 1 are equidistant from the query
        let reference = FeatureMatrix::new(1, vec![0.0, 1.0]).unwrap();
        let out = blend(&features, Some(&reference), &contour(&[true]), 1.0, 0.0).unwrap();
        assert_eq!(out.as_slice(), &[0.0]);
    }

    #[test]
    fn dim_mismatch_is_a_shape_error() {
        let features = FeatureMatrix::new(2, vec![0.0, 0.0]).unwrap();
        let reference = FeatureMatrix::new(3, vec![0.0, 0.0, 0.0]).unwrap();
        assert!(matches!(
            blend(&features, Some(&reference), &contour(&[true]), 0.5, 0.0),
            Err(ConvertError::Shape(_))
        ));
    }
}
