//! # metron
//!
//! An engine for computerized adaptive testing built on Item Response Theory.
//!
//! The crate is split into two subsystems:
//!
//! 1. **`calc`** holds the numeric core and the model family: pointwise
//!    function composition, Gauss-Jordan matrix inversion with pivot
//!    regularization, a multivariate Newton-Raphson root finder, the closed
//!    set of logistic response models with their closed-form derivatives,
//!    and the maximum-likelihood estimators for person abilities and item
//!    parameters built on top of them.
//!
//! 2. **`strategy`** holds the adaptive item-selection pipeline: an ordered
//!    chain of stages threaded through one mutable context with
//!    continuation-passing short-circuit semantics, plus the per-attempt
//!    state object that drives one examinee through a test.
//!
//! Persistence, rendering, and host integration are collaborator concerns;
//! this crate only consumes response data and item parameters and produces
//! estimates and selection decisions.

pub mod config;
pub mod data;

#[path = "../calc/mod.rs"]
pub mod calc;

#[path = "../strategy/mod.rs"]
pub mod strategy;
