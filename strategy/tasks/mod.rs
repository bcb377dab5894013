//! The built-in pipeline stages.
//!
//! Stage order is a strategy decision; the stages themselves only assume
//! what their own contract needs. Filters shrink the candidate list, scorers
//! annotate it, terminal scorers pick from it, and the ability stage updates
//! the context between questions.

mod ability;
mod checks;
mod scoring;

pub use ability::UpdateAbility;
pub use checks::{
    MaximumQuestionsCheck, NoRemainingQuestions, RemoveExcludedScales, RemovePlayed,
    RemoveUncalculated,
};
pub use scoring::{
    ClassicScore, FirstQuestion, FisherInformation, HighestScore, MaybeReturnPilot, RecencyPenalty,
    StandardErrorFilter,
};

#[cfg(test)]
pub mod test_support {
    use ahash::{AHashMap, AHashSet};

    use crate::calc::model::ModelKind;
    use crate::config::{AttemptSettings, EstimationConfig};
    use crate::data::{ItemParamList, ItemParams, ParamStatus};
    use crate::strategy::context::{Candidate, PipelineContext, Question};

    pub fn two_param_question(id: &str, difficulty: f64, discrimination: f64) -> Question {
        let params = ItemParams::new(
            id,
            ModelKind::TwoParam,
            vec![difficulty, discrimination],
            ParamStatus::SetManually,
        )
        .unwrap();
        Question {
            id: id.to_string(),
            scale: "S".to_string(),
            params: Some(params),
            is_pilot: false,
            last_attempt: None,
        }
    }

    pub fn pilot_question(id: &str) -> Question {
        Question {
            id: id.to_string(),
            scale: "S".to_string(),
            params: None,
            is_pilot: true,
            last_attempt: None,
        }
    }

    pub fn context_with_pool(pool: Vec<Question>) -> PipelineContext {
        let item_params: ItemParamList = pool
            .iter()
            .filter_map(|q| q.params.clone())
            .collect();
        PipelineContext {
            person: 1,
            candidates: pool.into_iter().map(Candidate::new).collect(),
            item_params,
            abilities: AHashMap::new(),
            responses: Vec::new(),
            last_question: None,
            attempted: 0,
            played: AHashSet::new(),
            excluded_scales: AHashSet::new(),
            settings: AttemptSettings::default(),
            estimation: EstimationConfig::default(),
            now: 0,
            pilot_draw: 0.99,
        }
    }
}
