//! Core data model shared by the estimators and the selection pipeline.
//!
//! Responses enter the engine as graded fractions and are narrowed to a
//! binary [`Outcome`] at ingestion. Item and person parameters are plain
//! records; their lifetimes are owned by the caller (typically a persistence
//! layer), the engine only reads them and proposes new values.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calc::model::ModelKind;

/// Identifier of an examinee.
pub type PersonId = u64;

/// Binary response outcome. Graded fractions other than exactly `0.0` and
/// `1.0` are partial outcomes the closed-form likelihood branches cannot
/// represent; they are rejected at ingestion instead of being coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Correct,
    Incorrect,
}

impl Outcome {
    pub fn from_fraction(fraction: f64) -> Result<Self, ResponseError> {
        if fraction == 1.0 {
            Ok(Outcome::Correct)
        } else if fraction == 0.0 {
            Ok(Outcome::Incorrect)
        } else {
            Err(ResponseError::PartialOutcome { fraction })
        }
    }

    pub fn is_correct(self) -> bool {
        matches!(self, Outcome::Correct)
    }
}

/// Errors raised while ingesting response data.
#[derive(Error, Debug)]
pub enum ResponseError {
    #[error("fraction {fraction} is a partial outcome; only 0.0 and 1.0 map to a binary response")]
    PartialOutcome { fraction: f64 },
    #[error("item `{0}` is not part of the question pool")]
    UnknownItem(String),
}

/// One answered question.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseRecord {
    pub person: PersonId,
    pub item: String,
    pub outcome: Outcome,
    pub timestamp: i64,
}

/// An immutable collection of responses for one estimation call. The grouping
/// key is the examinee when estimating an ability and the item when
/// estimating item parameters; the set itself does not care which.
#[derive(Debug, Clone, Default)]
pub struct ResponseSet {
    records: Vec<ResponseRecord>,
}

impl ResponseSet {
    pub fn new(records: Vec<ResponseRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[ResponseRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True when the set contains both correct and incorrect answers. Without
    /// outcome variation the log-likelihood has no finite maximizer and an
    /// ability estimate is not well posed.
    pub fn has_outcome_variation(&self) -> bool {
        match self.records.first() {
            None => false,
            Some(first) => self.records.iter().any(|r| r.outcome != first.outcome),
        }
    }
}

/// Provenance of an item-parameter vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamStatus {
    Unset,
    NotYetCalculated,
    EstimatedAutomatically,
    SetManually,
}

impl ParamStatus {
    /// Parameters usable for estimation and scoring. `Unset` and
    /// `NotYetCalculated` items may still be administered as pilots but must
    /// not influence an ability.
    pub fn is_usable(self) -> bool {
        matches!(
            self,
            ParamStatus::EstimatedAutomatically | ParamStatus::SetManually
        )
    }
}

/// Raised when a parameter vector disagrees with its model's dimension.
#[derive(Error, Debug)]
#[error("item `{item}`: model `{model}` expects {expected} free parameters, got {got}")]
pub struct ParamMismatch {
    pub item: String,
    pub model: ModelKind,
    pub expected: usize,
    pub got: usize,
}

/// The free parameters of one item under one response model, difficulty
/// first. The vector length is always `model.dimension() - 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemParams {
    pub item: String,
    pub model: ModelKind,
    pub values: Vec<f64>,
    pub status: ParamStatus,
}

impl ItemParams {
    pub fn new(
        item: impl Into<String>,
        model: ModelKind,
        values: Vec<f64>,
        status: ParamStatus,
    ) -> Result<Self, ParamMismatch> {
        let item = item.into();
        let expected = model.dimension() - 1;
        if values.len() != expected {
            return Err(ParamMismatch {
                item,
                model,
                expected,
                got: values.len(),
            });
        }
        Ok(Self {
            item,
            model,
            values,
            status,
        })
    }

    /// The difficulty parameter, by convention the first entry.
    pub fn difficulty(&self) -> f64 {
        self.values.first().copied().unwrap_or(0.0)
    }
}

/// Item parameters keyed by item identifier.
#[derive(Debug, Clone, Default)]
pub struct ItemParamList {
    by_item: AHashMap<String, ItemParams>,
}

impl ItemParamList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, params: ItemParams) {
        self.by_item.insert(params.item.clone(), params);
    }

    pub fn get(&self, item: &str) -> Option<&ItemParams> {
        self.by_item.get(item)
    }

    pub fn len(&self) -> usize {
        self.by_item.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_item.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ItemParams> {
        self.by_item.values()
    }
}

impl FromIterator<ItemParams> for ItemParamList {
    fn from_iter<T: IntoIterator<Item = ItemParams>>(iter: T) -> Self {
        let mut list = Self::new();
        for params in iter {
            list.insert(params);
        }
        list
    }
}

/// One examinee's ability on one scale. Created on the first estimate and
/// overwritten on every later update, never deleted mid-attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonParam {
    pub person: PersonId,
    pub scale: String,
    pub ability: f64,
    pub standard_error: Option<f64>,
}
