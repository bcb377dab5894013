//! The mutable context threaded through one pipeline invocation.

use ahash::{AHashMap, AHashSet};

use crate::config::{AttemptSettings, EstimationConfig};
use crate::data::{ItemParamList, Outcome, PersonId};

/// A candidate item as seen by the selection pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub id: String,
    pub scale: String,
    pub params: Option<crate::data::ItemParams>,
    pub is_pilot: bool,
    pub last_attempt: Option<i64>,
}

impl Question {
    /// Difficulty of the item when its parameters are known.
    pub fn difficulty(&self) -> Option<f64> {
        self.params.as_ref().map(|p| p.difficulty())
    }
}

/// A question plus the scores the pipeline stages attach to it.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub question: Question,
    pub information: f64,
    pub penalty: f64,
    pub score: f64,
}

impl Candidate {
    pub fn new(question: Question) -> Self {
        Self {
            question,
            information: 0.0,
            penalty: 0.0,
            score: 0.0,
        }
    }
}

/// The question most recently administered in the attempt, with its outcome
/// once the examinee has answered.
#[derive(Debug, Clone)]
pub struct AnsweredQuestion {
    pub item: String,
    pub scale: String,
    pub is_pilot: bool,
    pub outcome: Option<Outcome>,
}

/// A response recorded during the attempt.
#[derive(Debug, Clone)]
pub struct AttemptResponse {
    pub item: String,
    pub scale: String,
    pub outcome: Outcome,
    pub is_pilot: bool,
    pub at: i64,
}

/// Current ability estimate for one scale.
#[derive(Debug, Clone, Copy)]
pub struct ScaleAbility {
    pub value: f64,
    pub standard_error: Option<f64>,
}

/// Everything one "fetch next question" call operates on. The context is
/// owned by a single pipeline invocation and discarded afterwards; durable
/// attempt state lives in [`crate::strategy::attempt::Attempt`].
pub struct PipelineContext {
    pub person: PersonId,
    pub candidates: Vec<Candidate>,
    pub item_params: ItemParamList,
    pub abilities: AHashMap<String, ScaleAbility>,
    pub responses: Vec<AttemptResponse>,
    pub last_question: Option<AnsweredQuestion>,
    pub attempted: u32,
    pub played: AHashSet<String>,
    pub excluded_scales: AHashSet<String>,
    pub settings: AttemptSettings,
    pub estimation: EstimationConfig,
    /// Wall clock of the fetch, for recency penalties.
    pub now: i64,
    /// Uniform draw in [0, 1) consumed by the pilot stage.
    pub pilot_draw: f64,
}

impl PipelineContext {
    /// Current ability of a scale, or the configured start ability.
    pub fn ability_of(&self, scale: &str) -> f64 {
        self.abilities
            .get(scale)
            .map_or(self.estimation.start_ability, |a| a.value)
    }
}
