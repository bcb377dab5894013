//! Scoring and selecting stages.

use crate::strategy::context::PipelineContext;
use crate::strategy::{Next, Selection, Stage, StopReason};

/// Opens an attempt with the calculated question whose difficulty is closest
/// to the configured start ability. Later fetches pass straight through.
pub struct FirstQuestion;

impl Stage for FirstQuestion {
    fn name(&self) -> &'static str {
        "first_question"
    }

    fn run(&self, ctx: &mut PipelineContext, next: Next<'_>) -> Selection {
        if ctx.attempted > 0 {
            return next(ctx);
        }
        let start = ctx.estimation.start_ability;
        let mut best: Option<(&crate::strategy::context::Candidate, f64)> = None;
        for candidate in &ctx.candidates {
            if candidate.question.is_pilot {
                continue;
            }
            let Some(difficulty) = candidate.question.difficulty() else {
                continue;
            };
            let distance = (difficulty - start).abs();
            if best.is_none_or(|(_, closest)| distance < closest) {
                best = Some((candidate, distance));
            }
        }
        match best {
            Some((candidate, _)) => Ok(candidate.question.clone()),
            None => Err(StopReason::NoRemainingQuestions),
        }
    }
}

/// With the configured probability, restricts the pool to pilot questions so
/// uncalibrated items gather responses. Does nothing when no pilots remain.
pub struct MaybeReturnPilot;

impl Stage for MaybeReturnPilot {
    fn name(&self) -> &'static str {
        "maybe_return_pilot"
    }

    fn run(&self, ctx: &mut PipelineContext, next: Next<'_>) -> Selection {
        let has_pilots = ctx.candidates.iter().any(|c| c.question.is_pilot);
        if has_pilots && ctx.pilot_draw < ctx.settings.pilot_ratio {
            ctx.candidates.retain(|c| c.question.is_pilot);
            log::debug!("pilot draw fired; pool restricted to pilot questions");
        }
        next(ctx)
    }
}

/// Annotates every candidate with its Fisher information at the current
/// ability of its scale. Items without usable parameters are uninformative.
pub struct FisherInformation;

impl Stage for FisherInformation {
    fn name(&self) -> &'static str {
        "fisher_information"
    }

    fn run(&self, ctx: &mut PipelineContext, next: Next<'_>) -> Selection {
        let abilities = ctx.abilities.clone();
        let start = ctx.estimation.start_ability;
        for candidate in &mut ctx.candidates {
            let ability = abilities
                .get(&candidate.question.scale)
                .map_or(start, |a| a.value);
            candidate.information = match &candidate.question.params {
                Some(params) if params.status.is_usable() => params
                    .model
                    .model()
                    .fisher_information(ability, &params.values),
                _ => 0.0,
            };
        }
        next(ctx)
    }
}

/// Annotates candidates with a penalty that fades linearly over the
/// configured window since the question was last played.
pub struct RecencyPenalty;

impl Stage for RecencyPenalty {
    fn name(&self) -> &'static str {
        "recency_penalty"
    }

    fn run(&self, ctx: &mut PipelineContext, next: Next<'_>) -> Selection {
        let window = ctx.settings.penalty_window;
        let now = ctx.now;
        for candidate in &mut ctx.candidates {
            candidate.penalty = match candidate.question.last_attempt {
                Some(at) => {
                    let age = now - at;
                    if age >= window { 0.0 } else { (window - age) as f64 }
                }
                None => 0.0,
            };
        }
        next(ctx)
    }
}

/// Drops scales that are already measured precisely enough: their standard
/// error is below the threshold and they have received the minimum number of
/// questions.
pub struct StandardErrorFilter;

impl Stage for StandardErrorFilter {
    fn name(&self) -> &'static str {
        "standard_error_filter"
    }

    fn run(&self, ctx: &mut PipelineContext, next: Next<'_>) -> Selection {
        let Some(threshold) = ctx.settings.standard_error_threshold else {
            return next(ctx);
        };
        let minimum = ctx.settings.min_questions as usize;
        let mut measured: Vec<String> = Vec::new();
        for (scale, ability) in &ctx.abilities {
            let asked = ctx.responses.iter().filter(|r| &r.scale == scale).count();
            if asked >= minimum
                && ability.standard_error.is_some_and(|se| se < threshold)
            {
                measured.push(scale.clone());
            }
        }
        if !measured.is_empty() {
            log::debug!("scales measured below {threshold:.3}: {measured:?}");
            ctx.candidates
                .retain(|c| !measured.contains(&c.question.scale));
        }
        next(ctx)
    }
}

/// Terminal scorer of the fastest-convergence strategy: score is the Fisher
/// information discounted by the recency penalty; the best candidate wins,
/// ties broken by original candidate order.
pub struct HighestScore;

impl Stage for HighestScore {
    fn name(&self) -> &'static str {
        "highest_score"
    }

    fn run(&self, ctx: &mut PipelineContext, _next: Next<'_>) -> Selection {
        let window = ctx.settings.penalty_window as f64;
        for candidate in &mut ctx.candidates {
            candidate.score = (1.0 - candidate.penalty / window) * candidate.information;
        }
        let mut best: Option<&crate::strategy::context::Candidate> = None;
        for candidate in &ctx.candidates {
            if best.is_none_or(|b| candidate.score > b.score) {
                best = Some(candidate);
            }
        }
        match best {
            Some(candidate) => Ok(candidate.question.clone()),
            None => Err(StopReason::NoRemainingQuestions),
        }
    }
}

/// Terminal scorer of the classical strategy: the candidate whose difficulty
/// is closest to the current ability of its scale wins.
pub struct ClassicScore;

impl Stage for ClassicScore {
    fn name(&self) -> &'static str {
        "classic_score"
    }

    fn run(&self, ctx: &mut PipelineContext, _next: Next<'_>) -> Selection {
        for candidate in &mut ctx.candidates {
            let ability = ctx
                .abilities
                .get(&candidate.question.scale)
                .map_or(ctx.estimation.start_ability, |a| a.value);
            candidate.score = match candidate.question.difficulty() {
                Some(difficulty) => -((difficulty - ability).abs()),
                None => f64::NEG_INFINITY,
            };
        }
        let mut best: Option<&crate::strategy::context::Candidate> = None;
        for candidate in &ctx.candidates {
            if best.is_none_or(|b| candidate.score > b.score) {
                best = Some(candidate);
            }
        }
        match best {
            Some(candidate) => Ok(candidate.question.clone()),
            None => Err(StopReason::NoRemainingQuestions),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::context::ScaleAbility;
    use crate::strategy::run_pipeline;
    use crate::strategy::tasks::test_support::{
        context_with_pool, pilot_question, two_param_question,
    };
    use approx::assert_abs_diff_eq;

    fn run_single(stage: Box<dyn Stage>, ctx: &mut PipelineContext) -> Selection {
        let stages = vec![stage];
        run_pipeline(&stages, ctx)
    }

    #[test]
    fn first_fetch_picks_the_difficulty_closest_to_the_start_ability() {
        let mut ctx = context_with_pool(vec![
            two_param_question("FAR", 1.5, 1.0),
            two_param_question("NEAR", 0.1, 1.0),
            two_param_question("ALSO_FAR", -0.8, 1.0),
        ]);
        let selected = run_single(Box::new(FirstQuestion), &mut ctx).unwrap();
        assert_eq!(selected.id, "NEAR");
    }

    #[test]
    fn first_question_passes_through_mid_attempt() {
        let mut ctx = context_with_pool(vec![two_param_question("Q1", 0.0, 1.0)]);
        ctx.attempted = 4;
        assert_eq!(
            run_single(Box::new(FirstQuestion), &mut ctx),
            Err(StopReason::SelectionFailed)
        );
    }

    #[test]
    fn information_ranks_the_most_discriminating_item_at_ability_zero() {
        let mut ctx = context_with_pool(vec![
            two_param_question("X", 0.0, 1.0),
            two_param_question("Y", 0.5, 2.0),
            two_param_question("Z", -1.0, 1.5),
        ]);
        let stages: Vec<Box<dyn Stage>> =
            vec![Box::new(FisherInformation), Box::new(HighestScore)];
        let selected = run_pipeline(&stages, &mut ctx).unwrap();
        assert_eq!(selected.id, "Y");
    }

    #[test]
    fn score_ties_resolve_to_the_earlier_candidate() {
        let mut ctx = context_with_pool(vec![
            two_param_question("FIRST", 0.5, 1.0),
            two_param_question("SECOND", -0.5, 1.0),
        ]);
        // Symmetric difficulties at ability zero give identical information.
        let stages: Vec<Box<dyn Stage>> =
            vec![Box::new(FisherInformation), Box::new(HighestScore)];
        let selected = run_pipeline(&stages, &mut ctx).unwrap();
        assert_eq!(selected.id, "FIRST");
    }

    #[test]
    fn recently_played_questions_lose_their_score() {
        let mut played_recently = two_param_question("HOT", 0.0, 1.5);
        played_recently.last_attempt = Some(1_000);
        let mut ctx = context_with_pool(vec![
            played_recently,
            two_param_question("COLD", 0.0, 1.2),
        ]);
        ctx.now = 1_060;
        ctx.settings.penalty_window = 3_600;
        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(FisherInformation),
            Box::new(RecencyPenalty),
            Box::new(HighestScore),
        ];
        let selected = run_pipeline(&stages, &mut ctx).unwrap();
        // HOT carries more information but was played a minute ago.
        assert_eq!(selected.id, "COLD");
    }

    #[test]
    fn pilot_draw_below_the_ratio_restricts_the_pool() {
        let mut ctx = context_with_pool(vec![
            two_param_question("Q1", 0.0, 1.0),
            pilot_question("P1"),
        ]);
        ctx.settings.pilot_ratio = 0.5;
        ctx.pilot_draw = 0.25;
        let _ = run_single(Box::new(MaybeReturnPilot), &mut ctx);
        let ids: Vec<_> = ctx.candidates.iter().map(|c| c.question.id.clone()).collect();
        assert_eq!(ids, vec!["P1"]);
    }

    #[test]
    fn pilot_draw_above_the_ratio_changes_nothing() {
        let mut ctx = context_with_pool(vec![
            two_param_question("Q1", 0.0, 1.0),
            pilot_question("P1"),
        ]);
        ctx.settings.pilot_ratio = 0.5;
        ctx.pilot_draw = 0.75;
        let _ = run_single(Box::new(MaybeReturnPilot), &mut ctx);
        assert_eq!(ctx.candidates.len(), 2);
    }

    #[test]
    fn well_measured_scales_are_filtered_once_the_minimum_is_reached() {
        let mut ctx = context_with_pool(vec![two_param_question("Q1", 0.0, 1.0)]);
        ctx.settings.standard_error_threshold = Some(0.5);
        ctx.settings.min_questions = 1;
        ctx.abilities.insert(
            "S".to_string(),
            ScaleAbility {
                value: 0.3,
                standard_error: Some(0.2),
            },
        );
        ctx.responses.push(crate::strategy::context::AttemptResponse {
            item: "Q0".to_string(),
            scale: "S".to_string(),
            outcome: crate::data::Outcome::Correct,
            is_pilot: false,
            at: 0,
        });
        let _ = run_single(Box::new(StandardErrorFilter), &mut ctx);
        assert!(ctx.candidates.is_empty());
    }

    #[test]
    fn classical_scoring_matches_difficulty_to_ability() {
        let mut ctx = context_with_pool(vec![
            two_param_question("EASY", -1.0, 1.0),
            two_param_question("MATCHED", 0.8, 1.0),
            two_param_question("HARD", 2.5, 1.0),
        ]);
        ctx.abilities.insert(
            "S".to_string(),
            ScaleAbility {
                value: 0.7,
                standard_error: None,
            },
        );
        let selected = run_single(Box::new(ClassicScore), &mut ctx).unwrap();
        assert_eq!(selected.id, "MATCHED");
        let matched = ctx.candidates.iter().find(|c| c.question.id == "MATCHED").unwrap();
        assert_abs_diff_eq!(matched.score, -0.1, epsilon = 1e-12);
    }
}
