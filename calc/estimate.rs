//! # Maximum-Likelihood Parameter Estimation
//!
//! This module orchestrates the numeric core over the model family to solve
//! the two MLE problems of adaptive testing:
//!
//! 1. **Person ability**: given fixed item parameters, the log-likelihood
//!    contributions of all of an examinee's responses are composed into one
//!    aggregate gradient and curvature and the one-dimensional root is found
//!    by Newton-Raphson from the configured start ability.
//!
//! 2. **Item parameters**: given fixed examinee abilities, the per-parameter
//!    derivative closures of every observation are folded into a gradient
//!    vector and a Hessian matrix of functions, and the multivariate solver
//!    walks the free-parameter vector from its default start.
//!
//! Both problems are only well posed when the responses carry outcome
//! variation; a set answered entirely one way has no finite maximizer and is
//! reported as [`EstimationError::InsufficientData`] rather than returned as
//! an unflagged extreme value.

use rayon::prelude::*;
use thiserror::Error;

use crate::calc::model::{ModelKind, ParamFn, ResponseModel};
use crate::calc::newton::{NumericError, ScoreFn};
use crate::calc::{compose, newton};
use crate::config::EstimationConfig;
use crate::data::{
    ItemParamList, ItemParams, Outcome, ParamMismatch, ParamStatus, ResponseSet,
};

/// Failures of an estimation call. Numeric failures are recoverable (callers
/// fall back to a previous estimate); missing capabilities and parameter
/// mismatches are setup defects and must propagate.
#[derive(Error, Debug)]
pub enum EstimationError {
    #[error(transparent)]
    Numeric(#[from] NumericError),
    #[error("response set lacks outcome variation; the likelihood has no finite maximizer")]
    InsufficientData,
    #[error("model `{0}` does not support item calibration")]
    NotCalibratable(ModelKind),
    #[error("no parameters available for item `{0}`")]
    MissingItemParams(String),
    #[error(transparent)]
    InvalidParams(#[from] ParamMismatch),
}

/// One response to an item by an examinee whose ability is held fixed, the
/// unit of evidence for item calibration.
#[derive(Debug, Clone, Copy)]
pub struct ItemObservation {
    pub ability: f64,
    pub outcome: Outcome,
}

/// Looks up an item's model and parameter vector, validating the vector
/// length against the model dimension.
fn resolved(
    items: &ItemParamList,
    item: &str,
) -> Result<(&'static dyn ResponseModel, Vec<f64>), EstimationError> {
    let params = items
        .get(item)
        .ok_or_else(|| EstimationError::MissingItemParams(item.to_string()))?;
    let model = params.model.model();
    let expected = model.dimension() - 1;
    if params.values.len() != expected {
        return Err(ParamMismatch {
            item: params.item.clone(),
            model: params.model,
            expected,
            got: params.values.len(),
        }
        .into());
    }
    Ok((model, params.values.clone()))
}

/// Estimates one examinee's ability from their responses, holding the item
/// parameters fixed.
pub fn estimate_person_ability(
    responses: &ResponseSet,
    items: &ItemParamList,
    config: &EstimationConfig,
) -> Result<f64, EstimationError> {
    if !responses.has_outcome_variation() {
        return Err(EstimationError::InsufficientData);
    }

    let mut gradient: ScoreFn = Box::new(compose::zero::<[f64]>());
    let mut curvature: ScoreFn = Box::new(compose::zero::<[f64]>());
    for record in responses.records() {
        let (model, values) = resolved(items, &record.item)?;
        let outcome = record.outcome;
        {
            let values = values.clone();
            gradient = Box::new(compose::sum(gradient, move |x: &[f64]| {
                model.ability_gradient(x[0], &values, outcome)
            }));
        }
        curvature = Box::new(compose::sum(curvature, move |x: &[f64]| {
            model.ability_curvature(x[0], &values, outcome)
        }));
    }

    let hessian: Vec<Vec<ScoreFn>> = vec![vec![curvature]];
    let solution = newton::solve(
        &[gradient],
        &hessian,
        vec![config.start_ability],
        &config.ability,
    )?;
    if !solution.converged {
        return Err(NumericError::DidNotConverge {
            max_iterations: config.ability.max_iterations,
            last_step: solution.last_step,
        }
        .into());
    }

    let ability = solution.point[0];
    if ability.abs() > config.ability_bound {
        log::debug!(
            "ability estimate {ability:.3} escaped the sanity bound; \
             treating the response set as uninformative"
        );
        return Err(EstimationError::InsufficientData);
    }
    log::debug!(
        "estimated ability {:.4} from {} responses in {} iterations",
        ability,
        responses.len(),
        solution.iterations
    );
    Ok(ability)
}

/// Standard error of an ability estimate: the inverse square root of the
/// total Fisher information of the answered items at that ability.
pub fn ability_standard_error(
    ability: f64,
    responses: &ResponseSet,
    items: &ItemParamList,
) -> Result<f64, EstimationError> {
    let mut total = 0.0;
    for record in responses.records() {
        let (model, values) = resolved(items, &record.item)?;
        total += model.fisher_information(ability, &values);
    }
    if total > 0.0 {
        Ok(1.0 / total.sqrt())
    } else {
        Err(EstimationError::InsufficientData)
    }
}

/// Raw likelihood of a response pattern at a given ability, the product of
/// the per-response probabilities. Diagnostic surface; the solvers work on
/// the log scale.
pub fn person_likelihood_at(
    responses: &ResponseSet,
    items: &ItemParamList,
    ability: f64,
) -> Result<f64, EstimationError> {
    let mut likelihood: Box<dyn Fn(&f64) -> f64> = Box::new(compose::one::<f64>());
    for record in responses.records() {
        let (model, values) = resolved(items, &record.item)?;
        let outcome = record.outcome;
        likelihood = Box::new(compose::product(likelihood, move |theta: &f64| {
            let p = model.probability(*theta, &values);
            match outcome {
                Outcome::Correct => p,
                Outcome::Incorrect => 1.0 - p,
            }
        }));
    }
    Ok(likelihood(&ability))
}

fn sum_of(parts: Vec<ParamFn>) -> ScoreFn {
    Box::new(move |x: &[f64]| parts.iter().map(|part| part(x)).sum())
}

/// Estimates an item's free parameters from responses of examinees with
/// known abilities. Requires the model's calibration capability.
pub fn estimate_item_params(
    observations: &[ItemObservation],
    model: ModelKind,
    config: &EstimationConfig,
) -> Result<Vec<f64>, EstimationError> {
    let calibration = model
        .calibration()
        .ok_or(EstimationError::NotCalibratable(model))?;
    let varied = observations
        .first()
        .is_some_and(|first| observations.iter().any(|o| o.outcome != first.outcome));
    if !varied {
        return Err(EstimationError::InsufficientData);
    }

    // Fold each observation's structured contribution into per-entry lists;
    // the solver then sees one summed function per gradient and Hessian cell.
    let free = calibration.dimension() - 1;
    let mut gradient_parts: Vec<Vec<ParamFn>> = (0..free).map(|_| Vec::new()).collect();
    let mut hessian_parts: Vec<Vec<ParamFn>> = (0..free * free).map(|_| Vec::new()).collect();
    for observation in observations {
        let parts = calibration.item_gradient(observation.ability, observation.outcome);
        for (i, part) in parts.into_iter().enumerate() {
            gradient_parts[i].push(part);
        }
        let rows = calibration.item_hessian(observation.ability, observation.outcome);
        for (i, row) in rows.into_iter().enumerate() {
            for (j, part) in row.into_iter().enumerate() {
                hessian_parts[i * free + j].push(part);
            }
        }
    }
    let gradient: Vec<ScoreFn> = gradient_parts.into_iter().map(sum_of).collect();
    let mut cells = hessian_parts.into_iter().map(sum_of);
    let hessian: Vec<Vec<ScoreFn>> = (0..free)
        .map(|_| cells.by_ref().take(free).collect())
        .collect();

    let start = vec![config.item_start_value; free];
    let solution = newton::solve(&gradient, &hessian, start, &config.item)?;
    if !solution.converged {
        return Err(NumericError::DidNotConverge {
            max_iterations: config.item.max_iterations,
            last_step: solution.last_step,
        }
        .into());
    }
    log::debug!(
        "calibrated a {} item from {} observations in {} iterations",
        model,
        observations.len(),
        solution.iterations
    );
    Ok(solution.point)
}

/// Log-odds seed for an item difficulty, used to initialize calibration
/// pipelines before a full solve.
pub fn initial_item_difficulty(observations: &[ItemObservation]) -> f64 {
    if observations.is_empty() {
        return 0.0;
    }
    let passed = observations.iter().filter(|o| o.outcome.is_correct()).count() as f64;
    let p = passed / observations.len() as f64;
    -(p / (1.0 - p + 1e-5)).ln()
}

/// Calibrates a whole pool of items, one solve per item, in parallel. Items
/// whose solve fails carry their error; successes are tagged as estimated
/// automatically.
pub fn calibrate_items(
    groups: &[(String, Vec<ItemObservation>)],
    model: ModelKind,
    config: &EstimationConfig,
) -> Vec<(String, Result<ItemParams, EstimationError>)> {
    groups
        .par_iter()
        .map(|(item, observations)| {
            let result = estimate_item_params(observations, model, config).and_then(|values| {
                ItemParams::new(
                    item.clone(),
                    model,
                    values,
                    ParamStatus::EstimatedAutomatically,
                )
                .map_err(EstimationError::from)
            });
            if let Err(error) = &result {
                log::warn!("calibration of item `{item}` failed: {error}");
            }
            (item.clone(), result)
        })
        .collect()
}
