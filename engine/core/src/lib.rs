// Copyright (c) 2026 Taskweave
// SPDX-License-Identifier: AGPL-3.0
//! Taskweave orchestration engine core.
//!
//! Runs live instances of authored process templates: the task-by-task
//! state machine, branching-condition evaluation, performer resolution,
//! template-version propagation into running instances, and the delay
//! scheduler.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Runtime orchestration engine

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
