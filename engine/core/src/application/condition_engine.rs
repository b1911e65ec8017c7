// Copyright (c) 2026 Taskweave
// SPDX-License-Identifier: AGPL-3.0
//! Condition Evaluation Engine
//!
//! Decides whether a task's branching condition passes against the live
//! field values of a workflow: OR across rules, AND across predicates
//! within a rule, an empty rule list passing trivially.
//!
//! Dispatch is a closed match over [`FieldType`]: each arm is a pure
//! normalization from the located live field (or sibling task) into an
//! [`Operand`], and both operands are handed to a shared comparator keyed
//! by [`Operator`]. A binary comparison with an absent or unparsable
//! operand is `false`, never an error. A predicate whose reference cannot
//! be located at all is a configuration failure and surfaces as
//! [`IntegrityError`], never a silent "condition not met".

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeSet;

use crate::domain::condition::{Condition, Operator, Predicate, Rule};
use crate::domain::errors::IntegrityError;
use crate::domain::fields::{FieldType, TaskField};
use crate::domain::identity::UserId;
use crate::domain::workflow::{TaskStatus, Workflow};

/// A live field value normalized into the resolver's native comparable
/// type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// No stored value.
    Missing,
    Str(String),
    Number(Decimal),
    Date(DateTime<Utc>),
    User(UserId),
    /// Api names of the chosen options of a choice field.
    Selections(BTreeSet<String>),
    /// Completion state of a sibling task.
    TaskCompleted(bool),
}

impl Operand {
    pub fn is_present(&self) -> bool {
        !matches!(self, Self::Missing)
    }
}

/// Stateless condition evaluator.
pub struct ConditionEngine;

impl ConditionEngine {
    /// Evaluate a condition against the workflow's current field values.
    ///
    /// Returns true iff at least one rule evaluates true; an empty rule
    /// list passes: there is no predicate to fail.
    pub fn evaluate(condition: &Condition, workflow: &Workflow) -> Result<bool, IntegrityError> {
        if condition.rules.is_empty() {
            return Ok(true);
        }
        for rule in &condition.rules {
            if Self::rule_passes(rule, workflow)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn rule_passes(rule: &Rule, workflow: &Workflow) -> Result<bool, IntegrityError> {
        for predicate in &rule.predicates {
            if !Self::predicate_passes(predicate, workflow)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn predicate_passes(
        predicate: &Predicate,
        workflow: &Workflow,
    ) -> Result<bool, IntegrityError> {
        let field = Self::field_operand(predicate, workflow)?;
        let value = Self::value_operand(predicate);
        Ok(compare(predicate.operator, &field, &value))
    }

    /// Locate the predicate's reference and normalize the stored value.
    fn field_operand(
        predicate: &Predicate,
        workflow: &Workflow,
    ) -> Result<Operand, IntegrityError> {
        if predicate.field_type == FieldType::TaskStatus {
            let task = workflow.task_by_api_name(&predicate.field).ok_or_else(|| {
                IntegrityError::UnknownTask {
                    api_name: predicate.field.clone(),
                }
            })?;
            return Ok(Operand::TaskCompleted(task.status == TaskStatus::Completed));
        }

        let field = workflow.find_field(&predicate.field).ok_or_else(|| {
            IntegrityError::UnknownField {
                api_name: predicate.field.clone(),
            }
        })?;
        Ok(normalize_field(predicate.field_type, field))
    }

    /// Normalize the predicate's own comparison value.
    fn value_operand(predicate: &Predicate) -> Operand {
        let Some(raw) = predicate.value.as_deref().filter(|v| !v.is_empty()) else {
            return Operand::Missing;
        };
        match predicate.field_type {
            FieldType::String | FieldType::Text | FieldType::Url | FieldType::File => {
                Operand::Str(raw.to_string())
            }
            FieldType::Number => parse_decimal(raw)
                .map(Operand::Number)
                .unwrap_or(Operand::Missing),
            FieldType::Date => parse_date(raw)
                .map(Operand::Date)
                .unwrap_or(Operand::Missing),
            FieldType::User => parse_user(raw).map(Operand::User).unwrap_or(Operand::Missing),
            FieldType::Checkbox | FieldType::Radio | FieldType::Dropdown => {
                Operand::Selections(BTreeSet::from([raw.to_string()]))
            }
            FieldType::TaskStatus => Operand::Missing,
        }
    }
}

/// Normalize a located live field into an operand, by field type.
///
/// A present but unparsable value stays a string operand: it still
/// *exists*, it just fails every typed binary comparison.
fn normalize_field(field_type: FieldType, field: &TaskField) -> Operand {
    if !field.has_value() {
        return Operand::Missing;
    }
    let raw = field.value.as_deref().unwrap_or_default();
    match field_type {
        FieldType::String | FieldType::Text | FieldType::Url | FieldType::File => {
            Operand::Str(raw.to_string())
        }
        FieldType::Number => parse_decimal(raw)
            .map(Operand::Number)
            .unwrap_or_else(|| Operand::Str(raw.to_string())),
        FieldType::Date => parse_date(raw)
            .map(Operand::Date)
            .unwrap_or_else(|| Operand::Str(raw.to_string())),
        FieldType::User => parse_user(raw)
            .map(Operand::User)
            .unwrap_or_else(|| Operand::Str(raw.to_string())),
        FieldType::Checkbox | FieldType::Radio | FieldType::Dropdown => {
            let selected: BTreeSet<String> =
                field.selected_options().map(str::to_string).collect();
            if selected.is_empty() {
                Operand::Missing
            } else {
                Operand::Selections(selected)
            }
        }
        FieldType::TaskStatus => Operand::Missing,
    }
}

/// Shared comparator keyed by operator.
///
/// Unary operators consider only the field operand. Binary operators
/// return false when either operand is absent; mismatched operand kinds
/// never compare equal and never order.
pub fn compare(operator: Operator, field: &Operand, value: &Operand) -> bool {
    match operator {
        Operator::Exists => field.is_present(),
        Operator::NotExists => !field.is_present(),
        Operator::Completed => matches!(field, Operand::TaskCompleted(true)),
        _ => {
            if !field.is_present() || !value.is_present() {
                return false;
            }
            match operator {
                Operator::Equals => operands_equal(field, value),
                Operator::NotEquals => !operands_equal(field, value),
                Operator::Contains => operand_contains(field, value),
                Operator::NotContains => !operand_contains(field, value),
                Operator::MoreThan => {
                    matches!(operand_order(field, value), Some(std::cmp::Ordering::Greater))
                }
                Operator::LessThan => {
                    matches!(operand_order(field, value), Some(std::cmp::Ordering::Less))
                }
                Operator::Exists | Operator::NotExists | Operator::Completed => unreachable!(),
            }
        }
    }
}

fn operands_equal(field: &Operand, value: &Operand) -> bool {
    match (field, value) {
        (Operand::Str(a), Operand::Str(b)) => a == b,
        (Operand::Number(a), Operand::Number(b)) => a == b,
        (Operand::Date(a), Operand::Date(b)) => a == b,
        (Operand::User(a), Operand::User(b)) => a == b,
        (Operand::Selections(a), Operand::Selections(b)) => a == b,
        _ => false,
    }
}

fn operand_contains(field: &Operand, value: &Operand) -> bool {
    match (field, value) {
        (Operand::Str(a), Operand::Str(b)) => a.contains(b.as_str()),
        (Operand::Selections(a), Operand::Selections(b)) => b.is_subset(a),
        _ => false,
    }
}

fn operand_order(field: &Operand, value: &Operand) -> Option<std::cmp::Ordering> {
    match (field, value) {
        (Operand::Number(a), Operand::Number(b)) => Some(a.cmp(b)),
        (Operand::Date(a), Operand::Date(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    raw.trim().parse::<Decimal>().ok()
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| Utc.from_utc_datetime(&ndt))
}

fn parse_user(raw: &str) -> Option<UserId> {
    uuid::Uuid::parse_str(raw.trim()).ok().map(UserId::from_uuid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fields::FieldValueInput;
    use crate::domain::identity::AccountId;
    use crate::domain::performer::RawPerformer;
    use crate::domain::template::{
        FieldTemplate, SelectionTemplate, TaskTemplate, Template,
    };
    use std::collections::HashMap;

    fn number_field(api_name: &str) -> FieldTemplate {
        FieldTemplate {
            api_name: api_name.to_string(),
            kind: FieldType::Number,
            name: api_name.to_string(),
            is_required: false,
            selections: vec![],
        }
    }

    fn workflow_with_kickoff(
        fields: Vec<FieldTemplate>,
        input: HashMap<String, FieldValueInput>,
    ) -> Workflow {
        let template = Template::new(
            AccountId::new(),
            "proc",
            vec![TaskTemplate {
                api_name: "first".to_string(),
                name: "First".to_string(),
                number: 1,
                require_completion_by_all: false,
                raw_performers: vec![RawPerformer::WorkflowStarter],
                condition: None,
                fields: vec![],
                due_in: None,
            }],
            fields,
        )
        .unwrap();
        Workflow::instantiate(&template.snapshot(), AccountId::new(), UserId::new(), &input)
    }

    fn predicate(field: &str, field_type: FieldType, operator: Operator, value: &str) -> Predicate {
        Predicate {
            field: field.to_string(),
            field_type,
            operator,
            value: if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            },
        }
    }

    #[test]
    fn empty_rule_list_passes_trivially() {
        let workflow = workflow_with_kickoff(vec![], HashMap::new());
        let condition = Condition::new(vec![]);
        assert!(ConditionEngine::evaluate(&condition, &workflow).unwrap());
    }

    #[test]
    fn number_more_than_uses_exact_decimal_semantics() {
        let mut input = HashMap::new();
        input.insert("amount".to_string(), FieldValueInput::value("100.10"));
        let workflow = workflow_with_kickoff(vec![number_field("amount")], input);

        let passes = |op, value: &str| {
            let condition =
                Condition::single(predicate("amount", FieldType::Number, op, value));
            ConditionEngine::evaluate(&condition, &workflow).unwrap()
        };

        assert!(passes(Operator::MoreThan, "100.09"));
        assert!(!passes(Operator::MoreThan, "100.10"));
        assert!(passes(Operator::LessThan, "100.2"));
        // trailing zeros do not defeat equality
        assert!(passes(Operator::Equals, "100.1"));
    }

    #[test]
    fn binary_comparison_with_absent_value_is_false_never_an_error() {
        let workflow = workflow_with_kickoff(vec![number_field("amount")], HashMap::new());

        for op in [
            Operator::Equals,
            Operator::NotEquals,
            Operator::MoreThan,
            Operator::LessThan,
            Operator::Contains,
            Operator::NotContains,
        ] {
            let condition =
                Condition::single(predicate("amount", FieldType::Number, op, "100"));
            assert!(
                !ConditionEngine::evaluate(&condition, &workflow).unwrap(),
                "{op:?} against an absent value must be false"
            );
        }
    }

    #[test]
    fn exists_reports_absence_correctly() {
        let workflow = workflow_with_kickoff(vec![number_field("amount")], HashMap::new());
        let exists =
            Condition::single(predicate("amount", FieldType::Number, Operator::Exists, ""));
        let not_exists = Condition::single(predicate(
            "amount",
            FieldType::Number,
            Operator::NotExists,
            "",
        ));
        assert!(!ConditionEngine::evaluate(&exists, &workflow).unwrap());
        assert!(ConditionEngine::evaluate(&not_exists, &workflow).unwrap());

        let mut input = HashMap::new();
        input.insert("amount".to_string(), FieldValueInput::value("5"));
        let workflow = workflow_with_kickoff(vec![number_field("amount")], input);
        assert!(ConditionEngine::evaluate(&exists, &workflow).unwrap());
        assert!(!ConditionEngine::evaluate(&not_exists, &workflow).unwrap());
    }

    #[test]
    fn unknown_field_reference_is_an_integrity_error() {
        let workflow = workflow_with_kickoff(vec![], HashMap::new());
        let condition = Condition::single(predicate(
            "no-such-field",
            FieldType::String,
            Operator::Equals,
            "x",
        ));
        let result = ConditionEngine::evaluate(&condition, &workflow);
        assert!(matches!(
            result,
            Err(IntegrityError::UnknownField { api_name }) if api_name == "no-such-field"
        ));
    }

    #[test]
    fn rules_are_or_predicates_are_and() {
        let mut input = HashMap::new();
        input.insert("amount".to_string(), FieldValueInput::value("50"));
        let workflow = workflow_with_kickoff(vec![number_field("amount")], input);

        // rule 1 fails (50 > 100 is false), rule 2 passes
        let condition = Condition::new(vec![
            Rule {
                predicates: vec![
                    predicate("amount", FieldType::Number, Operator::Exists, ""),
                    predicate("amount", FieldType::Number, Operator::MoreThan, "100"),
                ],
            },
            Rule {
                predicates: vec![predicate(
                    "amount",
                    FieldType::Number,
                    Operator::LessThan,
                    "100",
                )],
            },
        ]);
        assert!(ConditionEngine::evaluate(&condition, &workflow).unwrap());

        // single rule ANDs both, fails
        let condition = Condition::new(vec![Rule {
            predicates: vec![
                predicate("amount", FieldType::Number, Operator::Exists, ""),
                predicate("amount", FieldType::Number, Operator::MoreThan, "100"),
            ],
        }]);
        assert!(!ConditionEngine::evaluate(&condition, &workflow).unwrap());
    }

    #[test]
    fn selection_contains_is_subset_membership() {
        let field = FieldTemplate {
            api_name: "tags".to_string(),
            kind: FieldType::Checkbox,
            name: "Tags".to_string(),
            is_required: false,
            selections: vec![
                SelectionTemplate {
                    api_name: "red".to_string(),
                    value: "Red".to_string(),
                },
                SelectionTemplate {
                    api_name: "blue".to_string(),
                    value: "Blue".to_string(),
                },
            ],
        };
        let mut input = HashMap::new();
        input.insert(
            "tags".to_string(),
            FieldValueInput::selected(vec!["red".to_string(), "blue".to_string()]),
        );
        let workflow = workflow_with_kickoff(vec![field], input);

        let contains_red = Condition::single(predicate(
            "tags",
            FieldType::Checkbox,
            Operator::Contains,
            "red",
        ));
        let not_contains_green = Condition::single(predicate(
            "tags",
            FieldType::Checkbox,
            Operator::NotContains,
            "green",
        ));
        assert!(ConditionEngine::evaluate(&contains_red, &workflow).unwrap());
        assert!(ConditionEngine::evaluate(&not_contains_green, &workflow).unwrap());
    }

    #[test]
    fn sibling_task_completed_predicate() {
        let mut workflow = workflow_with_kickoff(vec![], HashMap::new());
        let condition = Condition::single(predicate(
            "first",
            FieldType::TaskStatus,
            Operator::Completed,
            "",
        ));
        assert!(!ConditionEngine::evaluate(&condition, &workflow).unwrap());

        workflow.task_mut(1).unwrap().complete(Utc::now());
        assert!(ConditionEngine::evaluate(&condition, &workflow).unwrap());

        let unknown = Condition::single(predicate(
            "ghost-task",
            FieldType::TaskStatus,
            Operator::Completed,
            "",
        ));
        assert!(matches!(
            ConditionEngine::evaluate(&unknown, &workflow),
            Err(IntegrityError::UnknownTask { .. })
        ));
    }

    #[test]
    fn date_predicates_compare_parsed_dates() {
        let field = FieldTemplate {
            api_name: "deadline".to_string(),
            kind: FieldType::Date,
            name: "Deadline".to_string(),
            is_required: false,
            selections: vec![],
        };
        let mut input = HashMap::new();
        input.insert(
            "deadline".to_string(),
            FieldValueInput::value("2026-03-01"),
        );
        let workflow = workflow_with_kickoff(vec![field], input);

        let after = Condition::single(predicate(
            "deadline",
            FieldType::Date,
            Operator::MoreThan,
            "2026-02-01",
        ));
        let before = Condition::single(predicate(
            "deadline",
            FieldType::Date,
            Operator::LessThan,
            "2026-02-01",
        ));
        assert!(ConditionEngine::evaluate(&after, &workflow).unwrap());
        assert!(!ConditionEngine::evaluate(&before, &workflow).unwrap());
    }
}
