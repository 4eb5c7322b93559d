//! Execution results reported to embedders

use serde::{Deserialize, Serialize};
use valuevm_core::Value;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Fatal,
}

/// A message about the run, separate from its output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
}

impl Diagnostic {
    pub fn new(level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Diagnostic {
            level,
            message: message.into(),
        }
    }
}

/// Outcome of a complete run.
///
/// `output` is the returned value on success and the thrown value, with its
/// fields intact, on failure.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub output: Result<Value, Value>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ExecutionResult {
    pub fn is_ok(&self) -> bool {
        self.output.is_ok()
    }

    pub fn is_fatal(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.level == DiagnosticLevel::Fatal)
    }

    /// `output` rendered with [`Value::codify`].
    pub fn codified(&self) -> Result<String, String> {
        match &self.output {
            Ok(value) => Ok(value.codify()),
            Err(value) => Err(value.codify()),
        }
    }
}
