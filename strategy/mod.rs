//! # Adaptive Item Selection
//!
//! A test strategy is an ordered list of stages sharing one mutable
//! [`PipelineContext`]. Each stage either forwards control to the remaining
//! chain through its continuation or short-circuits with a terminal result:
//! the chosen question on success, a typed [`StopReason`] otherwise. The
//! runner folds the stage list right to left into nested continuations and
//! invokes the outermost one exactly once per fetch.
//!
//! Stopping is an expected outcome, not an error: a stop reason tells the
//! caller to end the attempt, a question tells it what to administer next.

pub mod attempt;
pub mod context;
pub mod tasks;

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::strategy::context::{PipelineContext, Question};
use crate::strategy::tasks::{
    ClassicScore, FirstQuestion, FisherInformation, HighestScore, MaximumQuestionsCheck,
    MaybeReturnPilot, NoRemainingQuestions, RecencyPenalty, RemoveExcludedScales, RemovePlayed,
    RemoveUncalculated, StandardErrorFilter, UpdateAbility,
};

/// Terminal status of a pipeline invocation that did not produce a question.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    #[error("no remaining questions to choose from")]
    NoRemainingQuestions,
    #[error("reached the configured maximum number of questions")]
    ReachedMaximumQuestions,
    #[error("person ability no longer changes")]
    AbilityUnchanged,
    #[error("no stage selected a question")]
    SelectionFailed,
    #[error("estimation setup is defective: {0}")]
    EstimationFault(String),
}

/// What a stage, and the pipeline as a whole, returns.
pub type Selection = Result<Question, StopReason>;

/// The continuation representing the remaining stages of the chain.
pub type Next<'a> = Box<dyn FnOnce(&mut PipelineContext) -> Selection + 'a>;

/// One stage of a selection pipeline.
pub trait Stage {
    fn name(&self) -> &'static str;

    /// Either mutate the context and call `next`, or return a terminal
    /// result without calling it.
    fn run(&self, ctx: &mut PipelineContext, next: Next<'_>) -> Selection;
}

/// Folds the stages into nested continuations and runs the chain.
pub fn run_pipeline(stages: &[Box<dyn Stage>], ctx: &mut PipelineContext) -> Selection {
    let chain = stages.iter().rev().fold(
        Box::new(|_: &mut PipelineContext| Err(StopReason::SelectionFailed)) as Next<'_>,
        |next, stage| {
            Box::new(move |ctx: &mut PipelineContext| {
                log::trace!("entering stage `{}`", stage.name());
                stage.run(ctx, next)
            }) as Next<'_>
        },
    );
    chain(ctx)
}

/// The built-in test strategies, each an ordered stage assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Administers the item with the highest Fisher information, adjusted
    /// for recency, until the ability stops moving.
    #[serde(rename = "fastest")]
    FastestConvergence,
    /// Classical difficulty matching: the item closest to the current
    /// ability wins.
    #[serde(rename = "classical")]
    Classical,
}

#[derive(Error, Debug)]
#[error("no strategy is registered under `{0}`")]
pub struct UnknownStrategy(pub String);

impl Strategy {
    pub fn name(self) -> &'static str {
        match self {
            Strategy::FastestConvergence => "fastest",
            Strategy::Classical => "classical",
        }
    }

    /// The ordered stage list this strategy runs.
    pub fn stages(self) -> Vec<Box<dyn Stage>> {
        match self {
            Strategy::FastestConvergence => vec![
                Box::new(FirstQuestion),
                Box::new(UpdateAbility),
                Box::new(MaximumQuestionsCheck),
                Box::new(RemovePlayed),
                Box::new(RemoveExcludedScales),
                Box::new(RemoveUncalculated),
                Box::new(NoRemainingQuestions),
                Box::new(MaybeReturnPilot),
                Box::new(FisherInformation),
                Box::new(RecencyPenalty),
                Box::new(StandardErrorFilter),
                Box::new(HighestScore),
            ],
            Strategy::Classical => vec![
                Box::new(FirstQuestion),
                Box::new(UpdateAbility),
                Box::new(MaximumQuestionsCheck),
                Box::new(RemovePlayed),
                Box::new(RemoveExcludedScales),
                Box::new(RemoveUncalculated),
                Box::new(NoRemainingQuestions),
                Box::new(ClassicScore),
            ],
        }
    }
}

impl FromStr for Strategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fastest" => Ok(Strategy::FastestConvergence),
            "classical" => Ok(Strategy::Classical),
            other => Err(UnknownStrategy(other.to_string())),
        }
    }
}

/// Runs one fetch of the given strategy against a prepared context. This is
/// the pipeline entry point; attempt bookkeeping around it lives in
/// [`attempt::Attempt`].
pub fn select_next_question(ctx: &mut PipelineContext, strategy: Strategy) -> Selection {
    let stages = strategy.stages();
    let selection = run_pipeline(&stages, ctx);
    match &selection {
        Ok(question) => log::debug!("strategy `{}` selected `{}`", strategy.name(), question.id),
        Err(reason) => log::debug!("strategy `{}` stopped: {reason}", strategy.name()),
    }
    selection
}
