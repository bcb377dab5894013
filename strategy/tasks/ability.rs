//! The ability-update stage.
//!
//! Runs once per fetch, between the answer to the previous question and the
//! selection of the next one. The update is skipped whenever it cannot be
//! computed honestly: no answered question yet, a pilot answer, or responses
//! without outcome variation. A numeric failure falls back to the previous
//! estimate and lets the attempt continue; only when a successful update
//! moves the ability less than the threshold, and enough questions have been
//! asked, does the stage end the attempt and retire the scale.

use crate::calc::estimate::{self, EstimationError};
use crate::data::{ResponseRecord, ResponseSet};
use crate::strategy::context::{PipelineContext, ScaleAbility};
use crate::strategy::{Next, Selection, Stage, StopReason};

pub struct UpdateAbility;

impl UpdateAbility {
    /// Non-pilot responses for one scale, as an estimation input.
    fn scale_responses(ctx: &PipelineContext, scale: &str) -> ResponseSet {
        ResponseSet::new(
            ctx.responses
                .iter()
                .filter(|r| r.scale == scale && !r.is_pilot)
                .map(|r| ResponseRecord {
                    person: ctx.person,
                    item: r.item.clone(),
                    outcome: r.outcome,
                    timestamp: r.at,
                })
                .collect(),
        )
    }
}

impl Stage for UpdateAbility {
    fn name(&self) -> &'static str {
        "update_ability"
    }

    fn run(&self, ctx: &mut PipelineContext, next: Next<'_>) -> Selection {
        let Some(last) = ctx.last_question.clone() else {
            // First question of the attempt, nothing to update from.
            return next(ctx);
        };
        if last.outcome.is_none() {
            return next(ctx);
        }
        if last.is_pilot {
            // Pilot answers must never feed an ability estimate.
            log::debug!("last question `{}` was a pilot; skipping ability update", last.item);
            return next(ctx);
        }

        let scale = last.scale;
        if ctx.excluded_scales.contains(&scale) {
            // The scale was already retired; its pool is gone too.
            return next(ctx);
        }
        let set = Self::scale_responses(ctx, &scale);
        if !set.has_outcome_variation() {
            log::debug!("scale `{scale}` has single-outcome responses; ability not estimable yet");
            return next(ctx);
        }

        let previous = ctx.ability_of(&scale);
        let updated = match estimate::estimate_person_ability(&set, &ctx.item_params, &ctx.estimation)
        {
            Ok(value) => value,
            Err(EstimationError::InsufficientData) => return next(ctx),
            Err(EstimationError::Numeric(error)) => {
                log::warn!(
                    "ability update for scale `{scale}` failed ({error}); \
                     keeping the previous estimate {previous:.4}"
                );
                return next(ctx);
            }
            Err(fatal) => return Err(StopReason::EstimationFault(fatal.to_string())),
        };

        if (updated - previous).abs() < ctx.settings.update_threshold
            && ctx.attempted >= ctx.settings.min_questions
        {
            log::info!(
                "ability of scale `{scale}` settled at {previous:.4}; retiring the scale"
            );
            ctx.excluded_scales.insert(scale);
            return Err(StopReason::AbilityUnchanged);
        }

        let standard_error = estimate::ability_standard_error(updated, &set, &ctx.item_params).ok();
        ctx.abilities.insert(
            scale,
            ScaleAbility {
                value: updated,
                standard_error,
            },
        );
        next(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Outcome;
    use crate::strategy::context::{AnsweredQuestion, AttemptResponse};
    use crate::strategy::run_pipeline;
    use crate::strategy::tasks::test_support::{context_with_pool, two_param_question};
    use approx::assert_abs_diff_eq;

    fn run_update(ctx: &mut PipelineContext) -> Selection {
        let stages: Vec<Box<dyn Stage>> = vec![Box::new(UpdateAbility)];
        run_pipeline(&stages, ctx)
    }

    fn answered(item: &str, outcome: Option<Outcome>, is_pilot: bool) -> AnsweredQuestion {
        AnsweredQuestion {
            item: item.to_string(),
            scale: "S".to_string(),
            is_pilot,
            outcome,
        }
    }

    fn response(item: &str, outcome: Outcome) -> AttemptResponse {
        AttemptResponse {
            item: item.to_string(),
            scale: "S".to_string(),
            outcome,
            is_pilot: false,
            at: 0,
        }
    }

    fn pool() -> Vec<crate::strategy::context::Question> {
        vec![
            two_param_question("Q1", 0.0, 1.0),
            two_param_question("Q2", 0.5, 1.2),
        ]
    }

    #[test]
    fn skips_when_the_previous_result_is_unknown() {
        let mut ctx = context_with_pool(pool());
        ctx.last_question = Some(answered("Q1", None, false));
        ctx.responses = vec![response("Q1", Outcome::Correct), response("Q2", Outcome::Incorrect)];
        let _ = run_update(&mut ctx);
        assert!(ctx.abilities.is_empty());
    }

    #[test]
    fn skips_for_pilot_answers() {
        let mut ctx = context_with_pool(pool());
        ctx.last_question = Some(answered("P1", Some(Outcome::Correct), true));
        ctx.responses = vec![response("Q1", Outcome::Correct), response("Q2", Outcome::Incorrect)];
        let _ = run_update(&mut ctx);
        assert!(ctx.abilities.is_empty());
    }

    #[test]
    fn skips_without_outcome_variation() {
        let mut ctx = context_with_pool(pool());
        ctx.last_question = Some(answered("Q1", Some(Outcome::Correct), false));
        ctx.responses = vec![response("Q1", Outcome::Correct), response("Q2", Outcome::Correct)];
        let _ = run_update(&mut ctx);
        assert!(ctx.abilities.is_empty());
    }

    #[test]
    fn recomputes_and_stores_the_ability_with_its_standard_error() {
        let mut ctx = context_with_pool(pool());
        ctx.last_question = Some(answered("Q2", Some(Outcome::Incorrect), false));
        ctx.responses = vec![response("Q1", Outcome::Correct), response("Q2", Outcome::Incorrect)];
        let _ = run_update(&mut ctx);
        let ability = ctx.abilities.get("S").expect("ability should be stored");
        assert!(ability.value.is_finite());
        assert!(ability.standard_error.is_some());
    }

    #[test]
    fn settled_ability_stops_the_attempt_and_retires_the_scale() {
        let mut ctx = context_with_pool(pool());
        ctx.last_question = Some(answered("Q2", Some(Outcome::Incorrect), false));
        ctx.responses = vec![response("Q1", Outcome::Correct), response("Q2", Outcome::Incorrect)];
        // Pretend the previous estimate already matches what the solver will find.
        let _ = run_update(&mut ctx);
        let settled = ctx.abilities.get("S").unwrap().value;

        let mut ctx = context_with_pool(pool());
        ctx.last_question = Some(answered("Q2", Some(Outcome::Incorrect), false));
        ctx.responses = vec![response("Q1", Outcome::Correct), response("Q2", Outcome::Incorrect)];
        ctx.abilities.insert(
            "S".to_string(),
            ScaleAbility {
                value: settled,
                standard_error: None,
            },
        );
        ctx.attempted = ctx.settings.min_questions;
        let outcome = run_update(&mut ctx);
        assert_eq!(outcome, Err(StopReason::AbilityUnchanged));
        assert!(ctx.excluded_scales.contains("S"));
        // The stored estimate is left as it was.
        assert_abs_diff_eq!(ctx.abilities.get("S").unwrap().value, settled, epsilon = 0.0);
    }

    #[test]
    fn below_minimum_questions_the_attempt_continues_despite_convergence() {
        let mut ctx = context_with_pool(pool());
        ctx.last_question = Some(answered("Q2", Some(Outcome::Incorrect), false));
        ctx.responses = vec![response("Q1", Outcome::Correct), response("Q2", Outcome::Incorrect)];
        let _ = run_update(&mut ctx);
        let settled = ctx.abilities.get("S").unwrap().value;

        let mut ctx = context_with_pool(pool());
        ctx.last_question = Some(answered("Q2", Some(Outcome::Incorrect), false));
        ctx.responses = vec![response("Q1", Outcome::Correct), response("Q2", Outcome::Incorrect)];
        ctx.abilities.insert(
            "S".to_string(),
            ScaleAbility {
                value: settled,
                standard_error: None,
            },
        );
        ctx.attempted = 1;
        ctx.settings.min_questions = 3;
        let outcome = run_update(&mut ctx);
        assert_eq!(outcome, Err(StopReason::SelectionFailed));
        assert!(ctx.excluded_scales.is_empty());
    }

    #[test]
    fn a_defective_setup_propagates_as_a_fault() {
        let mut ctx = context_with_pool(pool());
        ctx.last_question = Some(answered("Q2", Some(Outcome::Incorrect), false));
        // Q9 has no parameters anywhere.
        ctx.responses = vec![response("Q9", Outcome::Correct), response("Q2", Outcome::Incorrect)];
        let outcome = run_update(&mut ctx);
        assert!(matches!(outcome, Err(StopReason::EstimationFault(_))));
    }
}
