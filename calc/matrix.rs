//! Dense matrix inversion via Gauss-Jordan elimination.
//!
//! The Hessians inverted here are tiny (one to three rows) but frequently
//! ill-conditioned: an item answered the same way by everyone produces rows
//! that are nearly linearly dependent. A pivot that is exactly zero is
//! therefore replaced by a small epsilon before the division, trading a
//! degraded inverse for a crash. Callers that need to detect the degradation
//! check the solver's convergence flag instead.

use ndarray::{Array2, Axis, concatenate, s};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatrixError {
    #[error("matrix must be square to invert, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },
    #[error("row counts disagree: left has {left} rows, right has {right}")]
    RowMismatch { left: usize, right: usize },
}

/// Glues two matrices side by side, rejecting disagreeing row counts.
pub fn augment(left: &Array2<f64>, right: &Array2<f64>) -> Result<Array2<f64>, MatrixError> {
    if left.nrows() != right.nrows() {
        return Err(MatrixError::RowMismatch {
            left: left.nrows(),
            right: right.nrows(),
        });
    }
    Ok(concatenate![Axis(1), left.view(), right.view()])
}

/// Inverts a square matrix by augmenting it with the identity and reducing
/// the left half to the identity in place.
pub fn invert(matrix: &Array2<f64>, pivot_epsilon: f64) -> Result<Array2<f64>, MatrixError> {
    let (rows, cols) = matrix.dim();
    if rows != cols {
        return Err(MatrixError::NotSquare { rows, cols });
    }

    let mut augmented = augment(matrix, &Array2::eye(rows))?;
    for i in 0..rows {
        let mut pivot = augmented[[i, i]];
        if pivot == 0.0 {
            pivot = pivot_epsilon;
            augmented[[i, i]] = pivot_epsilon;
        }
        augmented.row_mut(i).mapv_inplace(|v| v / pivot);

        for j in 0..rows {
            if j == i {
                continue;
            }
            let factor = augmented[[j, i]];
            if factor != 0.0 {
                let pivot_row = augmented.row(i).to_owned();
                augmented.row_mut(j).scaled_add(-factor, &pivot_row);
            }
        }
    }

    Ok(augmented.slice(s![.., rows..]).to_owned())
}
