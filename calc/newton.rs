//! Multivariate Newton-Raphson root finding.
//!
//! The solver walks the root of a gradient field: at each iterate it
//! evaluates the gradient vector and the Hessian matrix, solves
//! `step = H(x)^-1 * G(x)` through [`matrix::invert`], and moves against the
//! step. It stops when the step norm drops below the configured tolerance or
//! the iteration cap is reached. Hitting the cap is not an error here; the
//! last iterate is returned with `converged == false` so callers can decide
//! whether a degraded result is acceptable.

use ndarray::{Array1, Array2};
use thiserror::Error;

use crate::calc::matrix::{self, MatrixError};
use crate::config::SolverOptions;

/// A boxed score function: gradient or Hessian entry of a log-likelihood,
/// evaluated at a parameter vector.
pub type ScoreFn = Box<dyn Fn(&[f64]) -> f64>;

#[derive(Error, Debug)]
pub enum NumericError {
    #[error(transparent)]
    Matrix(#[from] MatrixError),
    #[error("gradient has {gradient} entries but the Hessian is {rows}x{cols}")]
    ShapeMismatch {
        gradient: usize,
        rows: usize,
        cols: usize,
    },
    #[error("cannot solve an empty system")]
    EmptySystem,
    #[error("iterate became non-finite at iteration {iteration}")]
    NonFinite { iteration: usize },
    #[error("did not converge within {max_iterations} iterations; last step norm {last_step:.3e}")]
    DidNotConverge {
        max_iterations: usize,
        last_step: f64,
    },
}

/// Result of one solver run.
#[derive(Debug, Clone)]
pub struct Solution {
    pub point: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
    pub last_step: f64,
}

/// Finds a root of the gradient field. `gradient[i]` and `hessian[i][j]`
/// evaluate the first and second partial derivatives at the current point.
pub fn solve(
    gradient: &[ScoreFn],
    hessian: &[Vec<ScoreFn>],
    start: Vec<f64>,
    options: &SolverOptions,
) -> Result<Solution, NumericError> {
    let n = gradient.len();
    if n == 0 {
        return Err(NumericError::EmptySystem);
    }
    if hessian.len() != n || hessian.iter().any(|row| row.len() != n) || start.len() != n {
        return Err(NumericError::ShapeMismatch {
            gradient: n,
            rows: hessian.len(),
            cols: hessian.first().map_or(0, |row| row.len()),
        });
    }

    let mut x = start;
    let mut last_step = f64::INFINITY;
    for iteration in 1..=options.max_iterations {
        let g = Array1::from_shape_fn(n, |i| gradient[i](&x));
        let h = Array2::from_shape_fn((n, n), |(i, j)| hessian[i][j](&x));
        let h_inverse = matrix::invert(&h, options.pivot_epsilon)?;
        let step = h_inverse.dot(&g);

        for (value, delta) in x.iter_mut().zip(step.iter()) {
            *value -= delta;
        }
        if x.iter().any(|value| !value.is_finite()) {
            return Err(NumericError::NonFinite { iteration });
        }

        last_step = step.dot(&step).sqrt();
        if last_step < options.tolerance {
            log::trace!("converged after {iteration} iterations, step norm {last_step:.3e}");
            return Ok(Solution {
                point: x,
                iterations: iteration,
                converged: true,
                last_step,
            });
        }
    }

    log::debug!(
        "no convergence within {} iterations, last step norm {last_step:.3e}",
        options.max_iterations
    );
    Ok(Solution {
        point: x,
        iterations: options.max_iterations,
        converged: false,
        last_step,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn options(max_iterations: usize) -> SolverOptions {
        SolverOptions {
            max_iterations,
            tolerance: 1e-3,
            pivot_epsilon: 1e-10,
        }
    }

    #[test]
    fn solves_a_quadratic_in_one_step() {
        // Gradient of (x - 3)^2 has its root at 3.
        let gradient: Vec<ScoreFn> = vec![Box::new(|x: &[f64]| 2.0 * (x[0] - 3.0))];
        let hessian: Vec<Vec<ScoreFn>> = vec![vec![Box::new(|_: &[f64]| 2.0)]];
        let solution = solve(&gradient, &hessian, vec![0.0], &options(50)).unwrap();
        assert!(solution.converged);
        assert_abs_diff_eq!(solution.point[0], 3.0, epsilon = 1e-9);
    }

    #[test]
    fn solves_a_linear_two_dimensional_system() {
        // x + y = 3, x - y = 1 has the root (2, 1).
        let gradient: Vec<ScoreFn> = vec![
            Box::new(|x: &[f64]| x[0] + x[1] - 3.0),
            Box::new(|x: &[f64]| x[0] - x[1] - 1.0),
        ];
        let hessian: Vec<Vec<ScoreFn>> = vec![
            vec![Box::new(|_: &[f64]| 1.0), Box::new(|_: &[f64]| 1.0)],
            vec![Box::new(|_: &[f64]| 1.0), Box::new(|_: &[f64]| -1.0)],
        ];
        let solution = solve(&gradient, &hessian, vec![0.0, 0.0], &options(50)).unwrap();
        assert!(solution.converged);
        assert_abs_diff_eq!(solution.point[0], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(solution.point[1], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn rootless_gradient_exhausts_the_cap_without_claiming_success() {
        // exp(x) never crosses zero; every Newton step is exactly -1.
        let gradient: Vec<ScoreFn> = vec![Box::new(|x: &[f64]| x[0].exp())];
        let hessian: Vec<Vec<ScoreFn>> = vec![vec![Box::new(|x: &[f64]| x[0].exp())]];
        let solution = solve(&gradient, &hessian, vec![0.0], &options(10)).unwrap();
        assert!(!solution.converged);
        assert_eq!(solution.iterations, 10);
        assert_abs_diff_eq!(solution.point[0], -10.0, epsilon = 1e-9);
    }

    #[test]
    fn rejects_shape_disagreements() {
        let gradient: Vec<ScoreFn> = vec![Box::new(|_: &[f64]| 0.0), Box::new(|_: &[f64]| 0.0)];
        let hessian: Vec<Vec<ScoreFn>> = vec![vec![Box::new(|_: &[f64]| 1.0)]];
        assert!(matches!(
            solve(&gradient, &hessian, vec![0.0, 0.0], &options(10)),
            Err(NumericError::ShapeMismatch { gradient: 2, .. })
        ));
    }

    #[test]
    fn rejects_an_empty_system() {
        assert!(matches!(
            solve(&[], &[], vec![], &options(10)),
            Err(NumericError::EmptySystem)
        ));
    }
}
