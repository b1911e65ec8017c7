// Copyright (c) 2026 Taskweave
// SPDX-License-Identifier: AGPL-3.0
//! Live field values entered for a workflow's kickoff or a task's output.
//!
//! Fields are declared on the template (`FieldTemplate`) and materialize on
//! the running instance as [`TaskField`] rows holding whatever the user has
//! entered so far. The condition engine and the performer resolver read
//! these values; they never read template declarations directly.

use serde::{Deserialize, Serialize};

use crate::domain::template::FieldTemplate;

/// Closed set of field kinds.
///
/// Selects which normalization arm the condition engine uses for a
/// predicate and how a raw stored value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Short free text
    String,
    /// Long free text
    Text,
    /// URL value, compared as text
    Url,
    /// Exact decimal number
    Number,
    /// Calendar date or RFC 3339 timestamp
    Date,
    /// Reference to a standing account member
    User,
    /// Multi-select
    Checkbox,
    /// Single-select, radio presentation
    Radio,
    /// Single-select, dropdown presentation
    Dropdown,
    /// File attachment; predicates test presence only
    File,
    /// Sibling-task status; predicates use the `completed` operator
    TaskStatus,
}

/// One selectable option of a live choice field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSelection {
    pub api_name: String,
    pub value: String,
    pub is_selected: bool,
}

/// A live field value on a running workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskField {
    pub api_name: String,
    pub kind: FieldType,
    pub name: String,
    /// Raw stored value; `None` while nothing has been entered.
    pub value: Option<String>,
    /// Options for choice fields, empty otherwise.
    pub selections: Vec<FieldSelection>,
}

impl TaskField {
    /// Materialize an empty live field from its template declaration.
    pub fn from_template(template: &FieldTemplate) -> Self {
        Self {
            api_name: template.api_name.clone(),
            kind: template.kind,
            name: template.name.clone(),
            value: None,
            selections: template
                .selections
                .iter()
                .map(|s| FieldSelection {
                    api_name: s.api_name.clone(),
                    value: s.value.clone(),
                    is_selected: false,
                })
                .collect(),
        }
    }

    /// Apply user input to this field.
    pub fn apply_input(&mut self, input: &FieldValueInput) {
        self.value = input.value.clone();
        for selection in &mut self.selections {
            selection.is_selected = input.selected.iter().any(|s| s == &selection.api_name);
        }
    }

    /// Api names of the currently selected options.
    pub fn selected_options(&self) -> impl Iterator<Item = &str> {
        self.selections
            .iter()
            .filter(|s| s.is_selected)
            .map(|s| s.api_name.as_str())
    }

    /// Whether anything has been entered for this field.
    pub fn has_value(&self) -> bool {
        self.value.as_deref().is_some_and(|v| !v.is_empty())
            || self.selections.iter().any(|s| s.is_selected)
    }
}

/// User-provided input for one field, keyed by the field's api name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldValueInput {
    pub value: Option<String>,
    /// Api names of the options to select, for choice fields.
    #[serde(default)]
    pub selected: Vec<String>,
}

impl FieldValueInput {
    pub fn value(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            selected: Vec::new(),
        }
    }

    pub fn selected(options: Vec<String>) -> Self {
        Self {
            value: None,
            selected: options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::template::SelectionTemplate;

    fn choice_template() -> FieldTemplate {
        FieldTemplate {
            api_name: "priority".to_string(),
            kind: FieldType::Radio,
            name: "Priority".to_string(),
            is_required: false,
            selections: vec![
                SelectionTemplate {
                    api_name: "low".to_string(),
                    value: "Low".to_string(),
                },
                SelectionTemplate {
                    api_name: "high".to_string(),
                    value: "High".to_string(),
                },
            ],
        }
    }

    #[test]
    fn materialized_field_starts_empty() {
        let field = TaskField::from_template(&choice_template());
        assert!(!field.has_value());
        assert_eq!(field.selections.len(), 2);
        assert!(field.selections.iter().all(|s| !s.is_selected));
    }

    #[test]
    fn apply_input_selects_matching_options() {
        let mut field = TaskField::from_template(&choice_template());
        field.apply_input(&FieldValueInput::selected(vec!["high".to_string()]));
        assert!(field.has_value());
        assert_eq!(field.selected_options().collect::<Vec<_>>(), vec!["high"]);
    }

    #[test]
    fn empty_string_value_is_not_a_value() {
        let mut field = TaskField::from_template(&choice_template());
        field.apply_input(&FieldValueInput::value(""));
        assert!(!field.has_value());
    }
}
