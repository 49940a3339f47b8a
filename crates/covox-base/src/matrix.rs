use std::fmt;

#[derive(Debug, PartialEq)]
pub enum MatrixError {
    DimMismatch { dim: usize, len: usize },
    ZeroDim,
    ConcatDim { expected: usize, got: usize },
}

impl fmt::Display for MatrixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatrixError::DimMismatch { dim, len } => {
                write!(f, "data length {len} is not a multiple of row dim {dim}")
            }
            MatrixError::ZeroDim => write!(f, "row dim must be non-zero"),
            MatrixError::ConcatDim { expected, got } => {
                write!(f, "concat dim mismatch: expected {expected}, got {got}")
            }
        }
    }
}

impl std::error::Error for MatrixError {}

/// Row-major `[rows, dim]` f32 matrix.
///
/// Exchange type for acoustic feature sequences (one row per analysis frame)
/// and for the reference vectors bundled with a voice package.
#[derive(Clone, PartialEq)]
pub struct FeatureMatrix {
    dim: usize,
    data: Vec<f32>,
}

impl fmt::Debug for FeatureMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureMatrix")
            .field("rows", &self.rows())
            .field("dim", &self.dim)
            .finish()
    }
}

impl FeatureMatrix {
    pub fn new(dim: usize, data: Vec<f32>) -> Result<Self, MatrixError> {
        if dim == 0 {
            return Err(MatrixError::ZeroDim);
        }
        if data.len() % dim != 0 {
            return Err(MatrixError::DimMismatch {
                dim,
                len: data.len(),
            });
        }
        Ok(Self { dim, data })
    }

    pub fn zeros(rows: usize, dim: usize) -> Result<Self, MatrixError> {
        Self::new(dim, vec![0.0; rows * dim])
    }

    pub fn from_rows(dim: usize, rows: &[&[f32]]) -> Result<Self, MatrixError> {
        let mut data = Vec::with_capacity(rows.len() * dim);
        for row in rows {
            if row.len() != dim {
                return Err(MatrixError::DimMismatch {
                    dim,
                    len: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Self::new(dim, data)
    }

    pub fn rows(&self) -> usize {
        self.data.len() / self.dim
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dim)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Append the rows of `other`. Both matrices must share the same dim.
    pub fn concat(&mut self, other: &FeatureMatrix) -> Result<(), MatrixError> {
        if other.dim != self.dim {
            return Err(MatrixError::ConcatDim {
                expected: self.dim,
                got: other.dim,
            });
        }
        self.data.extend_from_slice(&other.data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_validates_row_multiple() {
        assert!(FeatureMatrix::new(3, vec![0.0; 9]).is_ok());
        let err = FeatureMatrix::new(3, vec![0.0; 8]).unwrap_err();
        assert_eq!(err, MatrixError::DimMismatch { dim: 3, len: 8 });
    }

    #[test]
    fn new_rejects_zero_dim() {
        assert_eq!(
            FeatureMatrix::new(0, vec![]).unwrap_err(),
            MatrixError::ZeroDim
        );
    }

    #[test]
    fn row_access() {
        let m = FeatureMatrix::new(2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(m.rows(), 2);
        assert_eq!(m.row(0), &[1.0, 2.0]);
        assert_eq!(m.row(1), &[3.0, 4.0]);
    }

    #[test]
    fn concat_appends_rows() {
        let mut a = FeatureMatrix::new(2, vec![1.0, 2.0]).unwrap();
        let b = FeatureMatrix::new(2, vec![3.0, 4.0]).unwrap();
        a.concat(&b).unwrap();
        assert_eq!(a.rows(), 2);
        assert_eq!(a.row(1), &[3.0, 4.0]);
    }

    #[test]
    fn concat_rejects_dim_mismatch() {
        let mut a = FeatureMatrix::new(2, vec![1.0, 2.0]).unwrap();
        let b = FeatureMatrix::new(3, vec![3.0, 4.0, 5.0]).unwrap();
        assert_eq!(
            a.concat(&b).unwrap_err(),
            MatrixError::ConcatDim {
                expected: 2,
                got: 3
            }
        );
    }
}
