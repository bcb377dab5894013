//! The three-parameter logistic model.
//!
//! Free parameters are difficulty `b`, discrimination `a`, and the guessing
//! floor `c`, in that order: `P = c + (1 - c) * sigmoid(a * (ability - b))`.
//! The guessing parameter is not clamped here; whether to restrict it to
//! [0, 1) is the caller's policy.
//!
//! The item-side derivatives are expressed through the derivatives of `P`
//! and the quotient rule, which keeps the correct and incorrect branches
//! from drifting apart.

use std::rc::Rc;

use crate::calc::model::{ItemCalibration, ModelKind, ParamFn, ResponseModel, sigmoid};
use crate::data::Outcome;

pub struct ThreeParamLogistic;

impl ThreeParamLogistic {
    /// The inner logistic `s` and the full probability `p`.
    fn parts(ability: f64, params: &[f64]) -> (f64, f64) {
        let (b, a, c) = (params[0], params[1], params[2]);
        let s = sigmoid(a * (ability - b));
        (s, c + (1.0 - c) * s)
    }

    /// First derivatives of `P` with respect to `(b, a, c)`.
    fn prob_gradient(ability: f64, x: &[f64]) -> [f64; 3] {
        let (b, a, c) = (x[0], x[1], x[2]);
        let s = sigmoid(a * (ability - b));
        [
            -((1.0 - c) * a * s * (1.0 - s)),
            (1.0 - c) * (ability - b) * s * (1.0 - s),
            1.0 - s,
        ]
    }

    /// Second derivatives of `P`, upper triangle in (b, a, c) order.
    fn prob_hessian(ability: f64, x: &[f64]) -> [[f64; 3]; 3] {
        let (b, a, c) = (x[0], x[1], x[2]);
        let s = sigmoid(a * (ability - b));
        let bend = s * (1.0 - s) * (1.0 - 2.0 * s);
        let bb = (1.0 - c) * a * a * bend;
        let aa = (1.0 - c) * (ability - b).powi(2) * bend;
        let ab = -((1.0 - c) * s * (1.0 - s) * (1.0 + a * (ability - b) * (1.0 - 2.0 * s)));
        let bc = a * s * (1.0 - s);
        let ac = -((ability - b) * s * (1.0 - s));
        [[bb, ab, bc], [ab, aa, ac], [bc, ac, 0.0]]
    }

    fn log_entry(ability: f64, x: &[f64], outcome: Outcome, i: usize, j: usize) -> f64 {
        let (_, p) = Self::parts(ability, x);
        let grad = Self::prob_gradient(ability, x);
        let hess = Self::prob_hessian(ability, x);
        match outcome {
            Outcome::Correct => hess[i][j] / p - grad[i] * grad[j] / (p * p),
            Outcome::Incorrect => {
                let q = 1.0 - p;
                -(hess[i][j] / q) - grad[i] * grad[j] / (q * q)
            }
        }
    }
}

impl ResponseModel for ThreeParamLogistic {
    fn kind(&self) -> ModelKind {
        ModelKind::ThreeParam
    }

    fn dimension(&self) -> usize {
        4
    }

    fn probability(&self, ability: f64, params: &[f64]) -> f64 {
        Self::parts(ability, params).1
    }

    fn log_likelihood(&self, ability: f64, params: &[f64], outcome: Outcome) -> f64 {
        let (_, p) = Self::parts(ability, params);
        match outcome {
            Outcome::Correct => p.ln(),
            Outcome::Incorrect => (1.0 - p).ln(),
        }
    }

    fn ability_gradient(&self, ability: f64, params: &[f64], outcome: Outcome) -> f64 {
        let (a, c) = (params[1], params[2]);
        let (s, p) = Self::parts(ability, params);
        match outcome {
            Outcome::Correct => (1.0 - c) * a * s * (1.0 - s) / p,
            Outcome::Incorrect => -(a * s),
        }
    }

    fn ability_curvature(&self, ability: f64, params: &[f64], outcome: Outcome) -> f64 {
        let (a, c) = (params[1], params[2]);
        let (s, p) = Self::parts(ability, params);
        match outcome {
            Outcome::Correct => {
                let g = (1.0 - c) * a * s * (1.0 - s) / p;
                g * (a * (1.0 - 2.0 * s) - g)
            }
            Outcome::Incorrect => -(a * a * s * (1.0 - s)),
        }
    }

    fn fisher_information(&self, ability: f64, params: &[f64]) -> f64 {
        let (a, c) = (params[1], params[2]);
        let (_, p) = Self::parts(ability, params);
        a * a * (p - c).powi(2) * (1.0 - p) / ((1.0 - c).powi(2) * p)
    }
}

impl ItemCalibration for ThreeParamLogistic {
    fn item_gradient(&self, ability: f64, outcome: Outcome) -> Vec<ParamFn> {
        (0..3)
            .map(|i| {
                let entry: ParamFn = Rc::new(move |x: &[f64]| {
                    let (_, p) = Self::parts(ability, x);
                    let grad = Self::prob_gradient(ability, x);
                    match outcome {
                        Outcome::Correct => grad[i] / p,
                        Outcome::Incorrect => -(grad[i] / (1.0 - p)),
                    }
                });
                entry
            })
            .collect()
    }

    fn item_hessian(&self, ability: f64, outcome: Outcome) -> Vec<Vec<ParamFn>> {
        let cell = |i: usize, j: usize| -> ParamFn {
            Rc::new(move |x: &[f64]| Self::log_entry(ability, x, outcome, i, j))
        };
        let bb = cell(0, 0);
        let aa = cell(1, 1);
        let cc = cell(2, 2);
        // Off-diagonal entries built once, mirrored below the diagonal.
        let ba = cell(0, 1);
        let bc = cell(0, 2);
        let ac = cell(1, 2);
        vec![
            vec![bb, ba.clone(), bc.clone()],
            vec![ba, aa, ac.clone()],
            vec![bc, ac, cc],
        ]
    }
}
