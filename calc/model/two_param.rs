//! The two-parameter logistic (Birnbaum) model.
//!
//! Free parameters are the difficulty `b` and the discrimination `a`, in that
//! order. The probability of a correct response is
//! `P = sigmoid(a * (ability - b))`. The discrimination is deliberately not
//! constrained to be positive; a poorly behaved item keeps evaluating, the
//! fit is simply useless.

use std::rc::Rc;

use crate::calc::model::{ItemCalibration, ModelKind, ParamFn, ResponseModel, sigmoid};
use crate::data::Outcome;

pub struct TwoParamLogistic;

impl TwoParamLogistic {
    fn p(ability: f64, params: &[f64]) -> f64 {
        let (b, a) = (params[0], params[1]);
        sigmoid(a * (ability - b))
    }
}

impl ResponseModel for TwoParamLogistic {
    fn kind(&self) -> ModelKind {
        ModelKind::TwoParam
    }

    fn dimension(&self) -> usize {
        3
    }

    fn probability(&self, ability: f64, params: &[f64]) -> f64 {
        Self::p(ability, params)
    }

    fn log_likelihood(&self, ability: f64, params: &[f64], outcome: Outcome) -> f64 {
        let p = Self::p(ability, params);
        match outcome {
            Outcome::Correct => p.ln(),
            Outcome::Incorrect => (1.0 - p).ln(),
        }
    }

    fn ability_gradient(&self, ability: f64, params: &[f64], outcome: Outcome) -> f64 {
        let a = params[1];
        let p = Self::p(ability, params);
        match outcome {
            Outcome::Correct => a * (1.0 - p),
            Outcome::Incorrect => -(a * p),
        }
    }

    fn ability_curvature(&self, ability: f64, params: &[f64], _outcome: Outcome) -> f64 {
        let a = params[1];
        let p = Self::p(ability, params);
        -(a * a * p * (1.0 - p))
    }

    fn fisher_information(&self, ability: f64, params: &[f64]) -> f64 {
        let a = params[1];
        let p = Self::p(ability, params);
        a * a * p * (1.0 - p)
    }
}

impl ItemCalibration for TwoParamLogistic {
    fn item_gradient(&self, ability: f64, outcome: Outcome) -> Vec<ParamFn> {
        let by_difficulty: ParamFn = Rc::new(move |x: &[f64]| {
            let (b, a) = (x[0], x[1]);
            let p = sigmoid(a * (ability - b));
            match outcome {
                Outcome::Correct => -(a * (1.0 - p)),
                Outcome::Incorrect => a * p,
            }
        });
        let by_discrimination: ParamFn = Rc::new(move |x: &[f64]| {
            let (b, a) = (x[0], x[1]);
            let p = sigmoid(a * (ability - b));
            match outcome {
                Outcome::Correct => (ability - b) * (1.0 - p),
                Outcome::Incorrect => -((ability - b) * p),
            }
        });
        vec![by_difficulty, by_discrimination]
    }

    fn item_hessian(&self, ability: f64, outcome: Outcome) -> Vec<Vec<ParamFn>> {
        let bb: ParamFn = Rc::new(move |x: &[f64]| {
            let (b, a) = (x[0], x[1]);
            let p = sigmoid(a * (ability - b));
            -(a * a * p * (1.0 - p))
        });
        let aa: ParamFn = Rc::new(move |x: &[f64]| {
            let (b, a) = (x[0], x[1]);
            let p = sigmoid(a * (ability - b));
            -((ability - b).powi(2) * p * (1.0 - p))
        });
        // Mixed derivative, mirrored across the diagonal (Schwarz).
        let ba: ParamFn = Rc::new(move |x: &[f64]| {
            let (b, a) = (x[0], x[1]);
            let p = sigmoid(a * (ability - b));
            match outcome {
                Outcome::Correct => -(1.0 - p) + a * (ability - b) * p * (1.0 - p),
                Outcome::Incorrect => p + a * (ability - b) * p * (1.0 - p),
            }
        });
        vec![vec![bb, ba.clone()], vec![ba, aa]]
    }
}
