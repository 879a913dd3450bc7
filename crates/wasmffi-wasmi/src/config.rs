//! Host configuration.

use serde::{Deserialize, Serialize};

use wasmffi_marshal::WideIntStrategy;

use crate::error::WasmiResult;

/// Export name emscripten gives the function table.
pub const DEFAULT_TABLE_EXPORT: &str = "__indirect_function_table";
pub const DEFAULT_MEMORY_EXPORT: &str = "memory";

/// How a [`crate::WasmiHost`] binds to an instance.
///
/// ```json
/// {
///   "strategy": "split_words",
///   "signatures": ["vi", "iii", "jij"]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WasmiConfig {
    pub strategy: WideIntStrategy,
    pub table_export: String,
    pub memory_export: String,
    /// Signatures to generate `dynCall` thunks for. Only consulted under
    /// [`WideIntStrategy::SplitWords`].
    pub signatures: Vec<String>,
}

impl Default for WasmiConfig {
    fn default() -> Self {
        Self {
            strategy: WideIntStrategy::default(),
            table_export: DEFAULT_TABLE_EXPORT.to_string(),
            memory_export: DEFAULT_MEMORY_EXPORT.to_string(),
            signatures: Vec::new(),
        }
    }
}

impl WasmiConfig {
    pub fn from_json(json: &str) -> WasmiResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Split-word dispatch over the given signatures.
    pub fn split_words<I, S>(signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            strategy: WideIntStrategy::SplitWords,
            signatures: signatures.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}
