//! The closed family of IRT response models.
//!
//! Every variant provides the closed-form likelihood of a response, its log
//! and the first and second derivatives with respect to the examinee ability,
//! all branched on the response outcome. Models that can be calibrated from
//! response data additionally expose per-parameter derivative closures
//! through [`ItemCalibration`].
//!
//! Model identifiers resolve through a static registry ([`ModelKind`]):
//! the set of models is fixed at compile time and a lookup is a match, not a
//! class-name construction.

pub mod demo;
pub mod one_param;
pub mod three_param;
pub mod two_param;

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::Outcome;

/// A shared derivative closure over an item's free-parameter vector. The
/// examinee ability is captured inside; the argument is the parameter vector
/// the solver is currently probing.
pub type ParamFn = Rc<dyn Fn(&[f64]) -> f64>;

/// Contract of one response model.
pub trait ResponseModel: Sync {
    fn kind(&self) -> ModelKind;

    /// Number of model parameters including the ability.
    fn dimension(&self) -> usize;

    /// Probability of a correct response.
    fn probability(&self, ability: f64, params: &[f64]) -> f64;

    fn log_likelihood(&self, ability: f64, params: &[f64], outcome: Outcome) -> f64;

    /// First derivative of the log-likelihood with respect to ability.
    fn ability_gradient(&self, ability: f64, params: &[f64], outcome: Outcome) -> f64;

    /// Second derivative of the log-likelihood with respect to ability.
    fn ability_curvature(&self, ability: f64, params: &[f64], outcome: Outcome) -> f64;

    /// Item information at the given ability, used to rank candidates.
    fn fisher_information(&self, ability: f64, params: &[f64]) -> f64;
}

/// Capability of estimating an item's free parameters from responses of
/// examinees with known abilities. Not every model supports this.
pub trait ItemCalibration: ResponseModel {
    /// One partial-derivative closure per free parameter.
    fn item_gradient(&self, ability: f64, outcome: Outcome) -> Vec<ParamFn>;

    /// The symmetric second-derivative matrix. Off-diagonal entries are
    /// constructed once and mirrored (Schwarz), not recomputed.
    fn item_hessian(&self, ability: f64, outcome: Outcome) -> Vec<Vec<ParamFn>>;
}

/// The closed set of installed models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    #[serde(rename = "1pl")]
    OneParam,
    #[serde(rename = "2pl")]
    TwoParam,
    #[serde(rename = "3pl")]
    ThreeParam,
    #[serde(rename = "demo")]
    Demo,
}

#[derive(Error, Debug)]
#[error("no response model is registered under `{0}`")]
pub struct UnknownModel(pub String);

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::OneParam,
        ModelKind::TwoParam,
        ModelKind::ThreeParam,
        ModelKind::Demo,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ModelKind::OneParam => "1pl",
            ModelKind::TwoParam => "2pl",
            ModelKind::ThreeParam => "3pl",
            ModelKind::Demo => "demo",
        }
    }

    pub fn model(self) -> &'static dyn ResponseModel {
        match self {
            ModelKind::OneParam => &one_param::OneParamLogistic,
            ModelKind::TwoParam => &two_param::TwoParamLogistic,
            ModelKind::ThreeParam => &three_param::ThreeParamLogistic,
            ModelKind::Demo => &demo::DemoModel,
        }
    }

    /// The calibration capability, when the model has one.
    pub fn calibration(self) -> Option<&'static dyn ItemCalibration> {
        match self {
            ModelKind::OneParam => Some(&one_param::OneParamLogistic),
            ModelKind::TwoParam => Some(&two_param::TwoParamLogistic),
            ModelKind::ThreeParam => Some(&three_param::ThreeParamLogistic),
            ModelKind::Demo => None,
        }
    }

    pub fn dimension(self) -> usize {
        self.model().dimension()
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = UnknownModel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| UnknownModel(s.to_string()))
    }
}

#[inline]
pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
