use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use log::warn;

use crate::limits::{DEFAULT_MAX_CALL_DEPTH, DEFAULT_STACK_TRACE_LIMIT};

/// Runtime settings of an interpreter session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory import paths are resolved against.
    pub import_dir: PathBuf,
    pub max_call_depth: usize,
    /// Frames kept on an error's stack trace, most recent first.
    pub stack_trace_limit: usize,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            import_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            stack_trace_limit: DEFAULT_STACK_TRACE_LIMIT,
            debug: false,
        }
    }
}

impl Config {
    /// Reads `CARRION_PATH`, `CARRION_MAX_DEPTH` and `CARRION_DEBUG`, anything unset or invalid
    /// keeps its default.
    pub fn from_env() -> Self {
        Config::from_vars(|key| env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Config::default();
        if let Some(path) = var("CARRION_PATH").filter(|path| !path.is_empty()) {
            config.import_dir = PathBuf::from(path);
        }
        if let Some(depth) = parse_var::<usize>(&var, "CARRION_MAX_DEPTH") {
            config.max_call_depth = depth;
        }
        if let Some(debug) = var("CARRION_DEBUG") {
            config.debug = matches!(debug.as_str(), "1" | "true" | "yes" | "on");
        }
        config
    }

    pub fn with_import_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.import_dir = dir.into();
        self
    }
}

fn parse_var<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = var(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("ignoring invalid value '{}' for {}", raw, key);
            None
        }
    }
}
