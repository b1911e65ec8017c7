// Copyright (c) 2026 Taskweave
// SPDX-License-Identifier: AGPL-3.0
//! Branch-decision tree attached to a task.
//!
//! A [`Condition`] passes iff at least one of its [`Rule`]s passes; a rule
//! passes iff every one of its [`Predicate`]s passes. An empty rule list
//! passes trivially. Evaluation lives in
//! `application::condition_engine`; this module is the pure data shape.

use serde::{Deserialize, Serialize};

use crate::domain::fields::FieldType;

/// Comparison operator of a predicate.
///
/// `Exists`, `NotExists` and `Completed` are unary: they ignore the
/// predicate's comparison value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Exists,
    NotExists,
    Contains,
    NotContains,
    MoreThan,
    LessThan,
    Completed,
}

impl Operator {
    pub fn is_unary(&self) -> bool {
        matches!(self, Self::Exists | Self::NotExists | Self::Completed)
    }
}

/// One field comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    /// Api name of the referenced kickoff field, task output field, or
    /// sibling task (for `TaskStatus` predicates).
    pub field: String,
    /// Selects the normalization arm used for both operands.
    pub field_type: FieldType,
    pub operator: Operator,
    /// Comparison value; absent for unary operators.
    pub value: Option<String>,
}

/// AND-combination of predicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub predicates: Vec<Predicate>,
}

/// OR-combination of rules, attached to one task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub rules: Vec<Rule>,
}

impl Condition {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Convenience constructor for a single-rule, single-predicate
    /// condition, the overwhelmingly common authored shape.
    pub fn single(predicate: Predicate) -> Self {
        Self {
            rules: vec![Rule {
                predicates: vec![predicate],
            }],
        }
    }
}
