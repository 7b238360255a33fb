//! Environment (layer 4) and command-line (layer 5) overrides

use std::path::PathBuf;

use serde_json::{Map, Value};

use crate::toolchain::ESPTOOL_PACKAGE;

/// Environment variables read into the config, with their config key.
pub const ENV_KEYS: &[(&str, &str)] = &[
    ("BUILD_DIR", "build.dir"),
    ("PYTHONEXE", "build.python"),
    ("PROGNAME", "build.progname"),
    ("PLATFORMIO_CORE_DIR", "packages.core_dir"),
];

/// Set `value` at a dotted `key`, creating objects along the way.
fn insert_path(root: &mut Map<String, Value>, key: &str, value: Value) {
    match key.split_once('.') {
        Some((head, rest)) => {
            let child = root
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(map) = child {
                insert_path(map, rest, value);
            }
        }
        None => {
            root.insert(key.to_string(), value);
        }
    }
}

/// Layer built from environment variables. Empty values are ignored.
/// Returns `None` when nothing is set.
pub fn env_layer(lookup: impl Fn(&str) -> Option<String>) -> Option<Value> {
    let mut root = Map::new();
    for (var, key) in ENV_KEYS {
        if let Some(value) = lookup(var).filter(|v| !v.is_empty()) {
            insert_path(&mut root, key, Value::String(value));
        }
    }

    if root.is_empty() {
        None
    } else {
        Some(Value::Object(root))
    }
}

/// Values given as command-line flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    pub build_dir: Option<PathBuf>,
    pub python: Option<PathBuf>,
    pub progname: Option<String>,
    pub mcu: Option<String>,
    pub flash_size: Option<String>,
    pub esptool_dir: Option<PathBuf>,
    pub core_dir: Option<PathBuf>,
}

impl CliOverrides {
    /// Layer built from the flags that were given, `None` if none were.
    pub fn to_value(&self) -> Option<Value> {
        let path = |p: &PathBuf| Value::String(p.to_string_lossy().into_owned());
        let text = |s: &String| Value::String(s.clone());

        let entries = [
            ("build.dir", self.build_dir.as_ref().map(path)),
            ("build.python", self.python.as_ref().map(path)),
            ("build.progname", self.progname.as_ref().map(text)),
            ("board.build.mcu", self.mcu.as_ref().map(text)),
            ("board.upload.flash_size", self.flash_size.as_ref().map(text)),
            ("packages.core_dir", self.core_dir.as_ref().map(path)),
        ];

        let mut root = Map::new();
        for (key, value) in entries {
            if let Some(value) = value {
                insert_path(&mut root, key, value);
            }
        }
        if let Some(dir) = &self.esptool_dir {
            insert_path(&mut root, &format!("packages.{}", ESPTOOL_PACKAGE), path(dir));
        }

        if root.is_empty() {
            None
        } else {
            Some(Value::Object(root))
        }
    }
}
