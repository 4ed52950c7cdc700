use std::ffi::OsString;

use serde::{Deserialize, Serialize};

use crate::RuntimeError;
use crate::executor::DEFAULT_PARALLEL_MIN_ROWS;

pub const ENV_EXECUTOR: &str = "FRANKENCOLUMN_EXECUTOR";
pub const ENV_PARALLEL_MIN_ROWS: &str = "FRANKENCOLUMN_PARALLEL_MIN_ROWS";
pub const ENV_MEMORY_LIMIT: &str = "FRANKENCOLUMN_MEMORY_LIMIT";

const ENV_PREFIX: &str = "FRANKENCOLUMN_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    Sequential,
    Parallel,
}

/// Runtime knobs for building an [`ExecutionContext`](crate::ExecutionContext).
///
/// Missing JSON fields fall back to [`RuntimeConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub executor: ExecutorKind,
    pub parallel_min_rows: usize,
    pub memory_limit_bytes: Option<usize>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorKind::Parallel,
            parallel_min_rows: DEFAULT_PARALLEL_MIN_ROWS,
            memory_limit_bytes: None,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, RuntimeError> {
        serde_json::from_str(raw).map_err(|err| RuntimeError::InvalidConfig(err.to_string()))
    }

    /// Defaults overridden by `FRANKENCOLUMN_*` environment variables.
    pub fn from_env() -> Result<Self, RuntimeError> {
        let mut config = Self::default();
        config.apply_os_overrides(std::env::vars_os())?;
        Ok(config)
    }

    /// Like [`apply_overrides`](Self::apply_overrides) for raw OS strings.
    /// Keys outside `FRANKENCOLUMN_*` are skipped whatever their encoding;
    /// a non-UTF-8 value under one of ours is an error.
    pub fn apply_os_overrides<I>(&mut self, vars: I) -> Result<(), RuntimeError>
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let mut ours = Vec::new();
        for (key, value) in vars {
            let Some(key) = key.to_str().filter(|key| key.starts_with(ENV_PREFIX)) else {
                continue;
            };
            let value = value.into_string().map_err(|raw| {
                RuntimeError::InvalidConfig(format!("{key}: value {raw:?} is not valid UTF-8"))
            })?;
            ours.push((key.to_owned(), value));
        }
        self.apply_overrides(ours)
    }

    /// Apply `FRANKENCOLUMN_*` key/value pairs; other keys are ignored.
    /// Nothing changes unless every pair parses.
    pub fn apply_overrides<I, K, V>(&mut self, vars: I) -> Result<(), RuntimeError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut next = self.clone();
        for (key, value) in vars {
            let value = value.as_ref().trim();
            match key.as_ref() {
                ENV_EXECUTOR => {
                    next.executor = match value.to_ascii_lowercase().as_str() {
                        "sequential" => ExecutorKind::Sequential,
                        "parallel" => ExecutorKind::Parallel,
                        other => {
                            return Err(RuntimeError::InvalidConfig(format!(
                                "{ENV_EXECUTOR}: unknown executor {other:?}"
                            )));
                        }
                    };
                }
                ENV_PARALLEL_MIN_ROWS => {
                    next.parallel_min_rows = parse_count(ENV_PARALLEL_MIN_ROWS, value)?;
                }
                ENV_MEMORY_LIMIT => {
                    next.memory_limit_bytes = if value.is_empty() || value == "none" {
                        None
                    } else {
                        Some(parse_count(ENV_MEMORY_LIMIT, value)?)
                    };
                }
                _ => {}
            }
        }
        *self = next;
        Ok(())
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize, RuntimeError> {
    value
        .parse::<usize>()
        .map_err(|err| RuntimeError::InvalidConfig(format!("{key}: {err} ({value:?})")))
}
