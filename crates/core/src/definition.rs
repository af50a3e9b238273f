// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative job definitions.
//!
//! A definition is an ordered list of steps; each step names the
//! planner worker that realises it. Parsing definitions out of
//! TOML/JSON files is the host's concern — these types only carry the
//! parsed form (they deserialize from the JSON the upstream reader
//! produces).

use crate::config::ConfigMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::borrow::Borrow;
use std::fmt;

/// Key for the planner registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerKind(pub SmolStr);

impl WorkerKind {
    pub fn new(kind: impl Into<SmolStr>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkerKind {
    fn from(s: &str) -> Self {
        Self(s.into())
    }
}

impl From<String> for WorkerKind {
    fn from(s: String) -> Self {
        Self(s.into())
    }
}

impl PartialEq<str> for WorkerKind {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl Borrow<str> for WorkerKind {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// What the orchestrator does when a step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// Mark the step and manager failed, stop iterating.
    #[default]
    Abort,
    /// Mark the step failed but proceed to the next step.
    Continue,
}

crate::simple_display! {
    OnError {
        Abort => "abort",
        Continue => "continue",
    }
}

/// One step of a job definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,
    /// Planner worker that realises this step.
    pub worker: WorkerKind,
    #[serde(default)]
    pub config: ConfigMap,
    #[serde(default)]
    pub on_error: OnError,
}

impl StepDefinition {
    pub fn new(name: impl Into<String>, worker: impl Into<WorkerKind>) -> Self {
        Self {
            name: name.into(),
            worker: worker.into(),
            config: ConfigMap::new(),
            on_error: OnError::default(),
        }
    }

    crate::setters! {
        set {
            config: ConfigMap,
            on_error: OnError,
        }
    }

    /// Step-level variable overrides (`config.variables` object).
    pub fn variables(&self) -> ConfigMap {
        crate::config::get_object(&self.config, "variables")
            .cloned()
            .unwrap_or_default()
    }
}

/// A declarative job definition: ordered steps plus job-level config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub name: String,
    #[serde(default)]
    pub config: ConfigMap,
    pub steps: Vec<StepDefinition>,
}

impl JobDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: ConfigMap::new(),
            steps: Vec::new(),
        }
    }

    crate::setters! {
        set {
            config: ConfigMap,
            steps: Vec<StepDefinition>,
        }
    }

    pub fn step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    /// Job-level variable globals (`config.variables` object).
    pub fn variables(&self) -> ConfigMap {
        crate::config::get_object(&self.config, "variables")
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "definition_tests.rs"]
mod tests;
