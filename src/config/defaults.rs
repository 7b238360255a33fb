//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};

/// Values used when no other layer sets them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Interpreter that runs esptool.py (default: "python3")
    pub python: String,

    /// Program name of the application binary (default: "firmware")
    pub progname: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            progname: "firmware".to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to the layered config shape
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "build": {
                "python": self.python,
                "progname": self.progname
            }
        })
    }
}
