//! Guard and filter stages.

use crate::strategy::context::PipelineContext;
use crate::strategy::{Next, Selection, Stage, StopReason};

/// Stops the attempt once the configured question cap is reached. A cap of
/// zero disables the check.
pub struct MaximumQuestionsCheck;

impl Stage for MaximumQuestionsCheck {
    fn name(&self) -> &'static str {
        "maximum_questions_check"
    }

    fn run(&self, ctx: &mut PipelineContext, next: Next<'_>) -> Selection {
        let cap = ctx.settings.max_questions;
        if cap > 0 && ctx.attempted >= cap {
            log::info!("attempt hit the maximum of {cap} questions");
            return Err(StopReason::ReachedMaximumQuestions);
        }
        next(ctx)
    }
}

/// Drops questions the examinee has already been given in this attempt.
pub struct RemovePlayed;

impl Stage for RemovePlayed {
    fn name(&self) -> &'static str {
        "remove_played"
    }

    fn run(&self, ctx: &mut PipelineContext, next: Next<'_>) -> Selection {
        let played = &ctx.played;
        ctx.candidates.retain(|c| !played.contains(&c.question.id));
        next(ctx)
    }
}

/// Drops questions of scales that were excluded earlier in the attempt,
/// typically because their ability stopped moving.
pub struct RemoveExcludedScales;

impl Stage for RemoveExcludedScales {
    fn name(&self) -> &'static str {
        "remove_excluded_scales"
    }

    fn run(&self, ctx: &mut PipelineContext, next: Next<'_>) -> Selection {
        let excluded = &ctx.excluded_scales;
        ctx.candidates
            .retain(|c| !excluded.contains(&c.question.scale));
        next(ctx)
    }
}

/// Drops questions without usable parameters. Pilot questions survive; they
/// are administered for calibration, not measurement.
pub struct RemoveUncalculated;

impl Stage for RemoveUncalculated {
    fn name(&self) -> &'static str {
        "remove_uncalculated"
    }

    fn run(&self, ctx: &mut PipelineContext, next: Next<'_>) -> Selection {
        ctx.candidates.retain(|c| {
            c.question.is_pilot
                || c.question
                    .params
                    .as_ref()
                    .is_some_and(|p| p.status.is_usable())
        });
        next(ctx)
    }
}

/// Terminal failure when the candidate list has run dry.
pub struct NoRemainingQuestions;

impl Stage for NoRemainingQuestions {
    fn name(&self) -> &'static str {
        "no_remaining_questions"
    }

    fn run(&self, ctx: &mut PipelineContext, next: Next<'_>) -> Selection {
        if ctx.candidates.is_empty() {
            return Err(StopReason::NoRemainingQuestions);
        }
        next(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ParamStatus;
    use crate::strategy::run_pipeline;
    use crate::strategy::tasks::test_support::{
        context_with_pool, pilot_question, two_param_question,
    };

    fn run_single(stage: Box<dyn Stage>, ctx: &mut PipelineContext) -> Selection {
        let stages = vec![stage];
        run_pipeline(&stages, ctx)
    }

    #[test]
    fn cap_of_zero_disables_the_maximum_check() {
        let mut ctx = context_with_pool(vec![two_param_question("Q1", 0.0, 1.0)]);
        ctx.settings.max_questions = 0;
        ctx.attempted = 1000;
        // Falls through to the tail continuation.
        assert_eq!(
            run_single(Box::new(MaximumQuestionsCheck), &mut ctx),
            Err(StopReason::SelectionFailed)
        );
    }

    #[test]
    fn played_questions_are_filtered() {
        let mut ctx = context_with_pool(vec![
            two_param_question("Q1", 0.0, 1.0),
            two_param_question("Q2", 0.5, 1.0),
        ]);
        ctx.played.insert("Q1".to_string());
        let _ = run_single(Box::new(RemovePlayed), &mut ctx);
        let ids: Vec<_> = ctx.candidates.iter().map(|c| c.question.id.clone()).collect();
        assert_eq!(ids, vec!["Q2"]);
    }

    #[test]
    fn excluded_scales_take_their_questions_along() {
        let mut ctx = context_with_pool(vec![
            two_param_question("Q1", 0.0, 1.0),
            two_param_question("Q2", 0.5, 1.0),
        ]);
        ctx.excluded_scales.insert("S".to_string());
        let _ = run_single(Box::new(RemoveExcludedScales), &mut ctx);
        assert!(ctx.candidates.is_empty());
    }

    #[test]
    fn uncalculated_items_are_dropped_but_pilots_survive() {
        let mut stale = two_param_question("Q1", 0.0, 1.0);
        if let Some(params) = &mut stale.params {
            params.status = ParamStatus::NotYetCalculated;
        }
        let mut ctx = context_with_pool(vec![
            stale,
            two_param_question("Q2", 0.5, 1.0),
            pilot_question("P1"),
        ]);
        let _ = run_single(Box::new(RemoveUncalculated), &mut ctx);
        let ids: Vec<_> = ctx.candidates.iter().map(|c| c.question.id.clone()).collect();
        assert_eq!(ids, vec!["Q2", "P1"]);
    }

    #[test]
    fn an_empty_pool_is_a_terminal_stop() {
        let mut ctx = context_with_pool(vec![]);
        assert_eq!(
            run_single(Box::new(NoRemainingQuestions), &mut ctx),
            Err(StopReason::NoRemainingQuestions)
        );
    }
}
