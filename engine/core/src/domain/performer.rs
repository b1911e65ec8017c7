// Copyright (c) 2026 Taskweave
// SPDX-License-Identifier: AGPL-3.0
//! Performer declarations and their resolved form.
//!
//! A raw performer is what the template author wrote; it is dereferenced on
//! demand by the performer resolver and never mutated during execution.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::identity::{GroupId, UserId};

/// Unresolved performer declaration on a task or template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawPerformer {
    /// A specific standing account member.
    User { user_id: UserId },
    /// Every current member of a group; membership is read live at
    /// resolution time, never snapshotted at authoring time.
    Group { group_id: GroupId },
    /// The current value of a user-typed field in the kickoff or an
    /// earlier task's output. No value means no performer.
    FieldRef { api_name: String },
    /// The user who started the workflow.
    WorkflowStarter,
    /// An external guest, identified by email. Guests are granted a
    /// time-boxed single-task access token and never come from group
    /// expansion.
    Guest { email: String },
}

/// Concrete assignee of a task performer row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Assignee {
    User { user_id: UserId },
    Guest { email: String },
}

/// The union of everything a task's raw performers resolve to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPerformers {
    pub users: BTreeSet<UserId>,
    pub guests: BTreeSet<String>,
}

impl ResolvedPerformers {
    pub fn contains(&self, assignee: &Assignee) -> bool {
        match assignee {
            Assignee::User { user_id } => self.users.contains(user_id),
            Assignee::Guest { email } => self.guests.contains(email),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.guests.is_empty()
    }

    pub fn user_ids(&self) -> Vec<UserId> {
        self.users.iter().copied().collect()
    }
}
