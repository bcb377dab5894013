//! Per-attempt state.
//!
//! One [`Attempt`] owns everything a single examinee's test run accumulates:
//! the question pool, the responses so far, the per-scale abilities, and the
//! bookkeeping the pipeline needs between fetches. Each fetch builds a fresh
//! [`PipelineContext`], runs the strategy, and absorbs the outcome back into
//! the attempt. Calls within one attempt are strictly sequential; separate
//! attempts share nothing mutable and may run concurrently.

use ahash::{AHashMap, AHashSet};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{AttemptSettings, EstimationConfig};
use crate::data::{ItemParamList, Outcome, PersonId, PersonParam, ResponseError};
use crate::strategy::context::{
    AnsweredQuestion, AttemptResponse, Candidate, PipelineContext, Question, ScaleAbility,
};
use crate::strategy::{Selection, Strategy, select_next_question};

pub struct Attempt {
    person: PersonId,
    strategy: Strategy,
    settings: AttemptSettings,
    estimation: EstimationConfig,
    /// The pool in presentation order; candidate order is semantic because
    /// score ties resolve to the earlier question.
    pool: Vec<Question>,
    item_params: ItemParamList,
    abilities: AHashMap<String, ScaleAbility>,
    responses: Vec<AttemptResponse>,
    played: Vec<String>,
    played_set: AHashSet<String>,
    excluded_scales: AHashSet<String>,
    last_question: Option<AnsweredQuestion>,
    attempted: u32,
    rng: StdRng,
}

impl Attempt {
    pub fn new(
        person: PersonId,
        pool: Vec<Question>,
        strategy: Strategy,
        settings: AttemptSettings,
        estimation: EstimationConfig,
    ) -> Self {
        let item_params: ItemParamList = pool.iter().filter_map(|q| q.params.clone()).collect();
        let rng = StdRng::seed_from_u64(settings.pilot_seed);
        Self {
            person,
            strategy,
            settings,
            estimation,
            pool,
            item_params,
            abilities: AHashMap::new(),
            responses: Vec::new(),
            played: Vec::new(),
            played_set: AHashSet::new(),
            excluded_scales: AHashSet::new(),
            last_question: None,
            attempted: 0,
            rng,
        }
    }

    /// Fetches the next question, or the reason the attempt is over. `now`
    /// is the wall clock of the fetch, injected so replays stay
    /// deterministic.
    pub fn next_question(&mut self, now: i64) -> Selection {
        let pilot_draw: f64 = self.rng.r#gen();
        let mut ctx = PipelineContext {
            person: self.person,
            candidates: self.pool.iter().cloned().map(Candidate::new).collect(),
            item_params: self.item_params.clone(),
            abilities: self.abilities.clone(),
            responses: self.responses.clone(),
            last_question: self.last_question.clone(),
            attempted: self.attempted,
            played: self.played_set.clone(),
            excluded_scales: self.excluded_scales.clone(),
            settings: self.settings.clone(),
            estimation: self.estimation.clone(),
            now,
            pilot_draw,
        };

        let selection = select_next_question(&mut ctx, self.strategy);

        // Absorb what the pipeline learned, then the context is gone.
        self.abilities = ctx.abilities;
        self.excluded_scales = ctx.excluded_scales;

        if let Ok(question) = &selection {
            self.played.push(question.id.clone());
            self.played_set.insert(question.id.clone());
            self.attempted += 1;
            self.last_question = Some(AnsweredQuestion {
                item: question.id.clone(),
                scale: question.scale.clone(),
                is_pilot: question.is_pilot,
                outcome: None,
            });
            if let Some(entry) = self.pool.iter_mut().find(|q| q.id == question.id) {
                entry.last_attempt = Some(now);
            }
            log::info!(
                "attempt of person {}: question {} is `{}`",
                self.person,
                self.attempted,
                question.id
            );
        }
        selection
    }

    /// Records the examinee's answer to a pool question. Graded fractions
    /// other than 0.0 and 1.0 are rejected here, before they can reach the
    /// estimators.
    pub fn record_response(
        &mut self,
        item: &str,
        fraction: f64,
        at: i64,
    ) -> Result<(), ResponseError> {
        let outcome = Outcome::from_fraction(fraction)?;
        let question = self
            .pool
            .iter()
            .find(|q| q.id == item)
            .ok_or_else(|| ResponseError::UnknownItem(item.to_string()))?;
        self.responses.push(AttemptResponse {
            item: item.to_string(),
            scale: question.scale.clone(),
            outcome,
            is_pilot: question.is_pilot,
            at,
        });
        if let Some(last) = &mut self.last_question {
            if last.item == item {
                last.outcome = Some(outcome);
            }
        }
        Ok(())
    }

    /// Current ability estimate for a scale, if one has been computed.
    pub fn ability(&self, scale: &str) -> Option<f64> {
        self.abilities.get(scale).map(|a| a.value)
    }

    /// Standard error of a scale's ability estimate, if known.
    pub fn standard_error(&self, scale: &str) -> Option<f64> {
        self.abilities.get(scale).and_then(|a| a.standard_error)
    }

    pub fn questions_attempted(&self) -> u32 {
        self.attempted
    }

    /// Snapshot of every scale's current estimate, in the shape the ability
    /// store persists between attempts.
    pub fn person_params(&self) -> Vec<PersonParam> {
        self.abilities
            .iter()
            .map(|(scale, ability)| PersonParam {
                person: self.person,
                scale: scale.clone(),
                ability: ability.value,
                standard_error: ability.standard_error,
            })
            .collect()
    }

    /// Identifiers of the questions administered so far, in order.
    pub fn played(&self) -> &[String] {
        &self.played
    }
}
