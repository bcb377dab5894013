//! A trivial model for demonstrations and wiring tests.
//!
//! Every response is a coin flip regardless of ability, so the model carries
//! no free parameters, contributes nothing to an ability estimate, and cannot
//! be calibrated.

use crate::calc::model::{ModelKind, ResponseModel};
use crate::data::Outcome;

pub struct DemoModel;

impl ResponseModel for DemoModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Demo
    }

    fn dimension(&self) -> usize {
        1
    }

    fn probability(&self, _ability: f64, _params: &[f64]) -> f64 {
        0.5
    }

    fn log_likelihood(&self, _ability: f64, _params: &[f64], _outcome: Outcome) -> f64 {
        0.5_f64.ln()
    }

    fn ability_gradient(&self, _ability: f64, _params: &[f64], _outcome: Outcome) -> f64 {
        0.0
    }

    fn ability_curvature(&self, _ability: f64, _params: &[f64], _outcome: Outcome) -> f64 {
        0.0
    }

    fn fisher_information(&self, _ability: f64, _params: &[f64]) -> f64 {
        1.0
    }
}
