//! `plangate.toml` loading.
//!
//! A missing file means defaults. Environment overrides are applied after
//! the file, then the whole config is validated once.

use crate::core::error::PlanGateError;
use crate::core::schemas;
use crate::engine::coordinator::CoordinatorConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "plangate.toml";

pub const ENV_DB: &str = "PLANGATE_DB";
pub const ENV_LOG: &str = "PLANGATE_LOG";
pub const ENV_STEP_CEILING: &str = "PLANGATE_STEP_CEILING";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub audit_log: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(schemas::TASKS_DB_NAME),
            audit_log: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionConfig {
    pub interactive_step_ceiling: usize,
    pub interactive_budget_ms: u64,
    pub default_read_limit: usize,
    pub max_read_limit: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            interactive_step_ceiling: 5,
            interactive_budget_ms: 15_000,
            default_read_limit: 50,
            max_read_limit: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResponseConfig {
    pub list_cap: usize,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self { list_cap: 5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub trace_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            trace_path: Some(PathBuf::from(schemas::TRACES_NAME)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub store: StoreConfig,
    pub execution: ExecutionConfig,
    pub response: ResponseConfig,
    pub logging: LoggingConfig,
}

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Reads `path` (if present), applies process environment overrides and
    /// validates.
    pub fn load(path: &Path) -> Result<Self, PlanGateError> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, PlanGateError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, PlanGateError> {
        toml::from_str(content).map_err(|e| PlanGateError::Config(e.to_string()))
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), PlanGateError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup(ENV_DB).filter(|v| !v.trim().is_empty()) {
            self.store.path = PathBuf::from(db);
        }
        if let Some(level) = lookup(ENV_LOG).filter(|v| !v.trim().is_empty()) {
            self.logging.level = level.trim().to_ascii_lowercase();
        }
        if let Some(ceiling) = lookup(ENV_STEP_CEILING) {
            self.execution.interactive_step_ceiling = ceiling.trim().parse().map_err(|_| {
                PlanGateError::Config(format!("{ENV_STEP_CEILING} must be a positive integer"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), PlanGateError> {
        let exec = &self.execution;
        if exec.interactive_step_ceiling == 0 {
            return Err(PlanGateError::Config(
                "execution.interactive_step_ceiling must be at least 1".into(),
            ));
        }
        if exec.interactive_budget_ms == 0 {
            return Err(PlanGateError::Config(
                "execution.interactive_budget_ms must be at least 1".into(),
            ));
        }
        if exec.default_read_limit == 0 || exec.default_read_limit > exec.max_read_limit {
            return Err(PlanGateError::Config(
                "execution.default_read_limit must be within 1..=max_read_limit".into(),
            ));
        }
        if self.response.list_cap == 0 {
            return Err(PlanGateError::Config("response.list_cap must be at least 1".into()));
        }
        if !LEVELS.contains(&self.logging.level.as_str()) {
            return Err(PlanGateError::Config(format!(
                "logging.level '{}' is not one of {}",
                self.logging.level,
                LEVELS.join(", ")
            )));
        }
        Ok(())
    }

    /// Resolves relative store and log paths against `root`.
    pub fn resolve_paths(&mut self, root: &Path) {
        let anchor = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = root.join(&*p);
            }
        };
        anchor(&mut self.store.path);
        if let Some(p) = self.store.audit_log.as_mut() {
            anchor(p);
        }
        if let Some(p) = self.logging.trace_path.as_mut() {
            anchor(p);
        }
    }

    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            interactive_step_ceiling: self.execution.interactive_step_ceiling,
            interactive_budget: Duration::from_millis(self.execution.interactive_budget_ms),
            default_read_limit: self.execution.default_read_limit,
            max_read_limit: self.execution.max_read_limit,
            list_cap: self.response.list_cap,
            trace_path: self.logging.trace_path.clone(),
        }
    }

    pub fn to_toml(&self) -> Result<String, PlanGateError> {
        toml::to_string_pretty(self).map_err(|e| PlanGateError::Config(e.to_string()))
    }
}
