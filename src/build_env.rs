//! Explicit build environment handed to post-build actions.
//!
//! Holds the construction variables a build step may expand (`$BUILD_DIR`,
//! `$PYTHONEXE`, `$PROGNAME`) and the board configuration. Nothing here reads
//! the process environment; the CLI assembles a [`BuildEnv`] from the
//! effective config and passes it in.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;

use fw_merge_layout::DEFAULT_FLASH_SIZE;
use regex_lite::{Captures, Regex};
use serde_json::{Map, Value};

/// Variable holding the build output directory.
pub const BUILD_DIR: &str = "BUILD_DIR";

/// Variable holding the Python interpreter used to run esptool.
pub const PYTHONEXE: &str = "PYTHONEXE";

/// Variable holding the program name (`firmware` for Arduino/ESP32 builds).
pub const PROGNAME: &str = "PROGNAME";

/// Board key carrying the MCU identifier.
pub const BOARD_MCU: &str = "build.mcu";

/// Board key carrying the flash size.
pub const BOARD_FLASH_SIZE: &str = "upload.flash_size";

/// MCU assumed when the board does not declare one.
pub const DEFAULT_MCU: &str = "esp32";

/// Read-only board configuration with dotted-key lookup.
///
/// Backed by the JSON shape of a PlatformIO board manifest, so
/// `build.mcu` resolves to `{"build": {"mcu": ...}}`. A literal top-level
/// key containing dots is also honored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardConfig(Value);

impl BoardConfig {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Build from dotted key/value pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut board = Self::default();
        for (key, value) in pairs {
            board.set(key, value);
        }
        board
    }

    /// Insert a string value at a dotted key, creating intermediate objects.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        if !self.0.is_object() {
            self.0 = Value::Object(Map::new());
        }

        let mut node = &mut self.0;
        let mut parts = key.split('.').peekable();
        while let Some(part) = parts.next() {
            let Value::Object(map) = node else {
                return;
            };
            if parts.peek().is_none() {
                map.insert(part.to_string(), Value::String(value.into()));
                return;
            }
            let child = map
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            node = child;
        }
    }

    /// Look up a dotted key. Strings are returned as-is; numbers and booleans
    /// are rendered; objects, arrays and nulls count as absent.
    pub fn get(&self, key: &str) -> Option<String> {
        let nested = key
            .split('.')
            .try_fold(&self.0, |node, part| node.get(part));
        let value = nested.or_else(|| self.0.get(key))?;

        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// `build.mcu`, defaulting to `esp32`.
    pub fn mcu(&self) -> String {
        self.get_or(BOARD_MCU, DEFAULT_MCU)
    }

    /// `upload.flash_size`, defaulting to `4MB`.
    pub fn flash_size(&self) -> String {
        self.get_or(BOARD_FLASH_SIZE, DEFAULT_FLASH_SIZE)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Construction variables plus board configuration for one build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildEnv {
    vars: BTreeMap<String, String>,
    board: BoardConfig,
}

impl BuildEnv {
    /// Environment for `build_dir` with the stock interpreter and program name.
    pub fn new(build_dir: impl Into<PathBuf>) -> Self {
        let build_dir: PathBuf = build_dir.into();
        Self::default()
            .with_var(BUILD_DIR, build_dir.to_string_lossy())
            .with_var(PYTHONEXE, "python3")
            .with_var(PROGNAME, "firmware")
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn with_board(mut self, board: BoardConfig) -> Self {
        self.board = board;
        self
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Expand `$NAME` and `${NAME}` references. Unknown names expand to the
    /// empty string; `$$` yields a literal `$`.
    pub fn subst(&self, input: &str) -> String {
        static VAR_RE: OnceLock<Regex> = OnceLock::new();
        let re = VAR_RE.get_or_init(|| {
            Regex::new(r"\$\$|\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
                .expect("variable pattern is valid")
        });

        re.replace_all(input, |caps: &Captures| {
            match caps.get(1).or_else(|| caps.get(2)) {
                Some(name) => self.var(name.as_str()).unwrap_or_default().to_string(),
                None => "$".to_string(),
            }
        })
        .into_owned()
    }

    pub fn build_dir(&self) -> PathBuf {
        PathBuf::from(self.subst("$BUILD_DIR"))
    }

    pub fn python_exe(&self) -> PathBuf {
        PathBuf::from(self.subst("$PYTHONEXE"))
    }

    pub fn board(&self) -> &BoardConfig {
        &self.board
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_board_nested_lookup() {
        let board = BoardConfig::new(json!({
            "build": {"mcu": "esp32c3", "f_cpu": "160000000L"},
            "upload": {"flash_size": "8MB", "speed": 460800}
        }));

        assert_eq!(board.get("build.mcu").as_deref(), Some("esp32c3"));
        assert_eq!(board.get("upload.speed").as_deref(), Some("460800"));
        assert_eq!(board.flash_size(), "8MB");
        assert_eq!(board.get("upload.protocol"), None);
        assert_eq!(board.get("build"), None);
    }

    #[test]
    fn test_board_literal_dotted_key() {
        let board = BoardConfig::new(json!({"upload.flash_size": "16MB"}));
        assert_eq!(board.flash_size(), "16MB");
    }

    #[test]
    fn test_board_defaults() {
        let board = BoardConfig::default();
        assert_eq!(board.mcu(), "esp32");
        assert_eq!(board.flash_size(), "4MB");
    }

    #[test]
    fn test_board_from_pairs() {
        let board = BoardConfig::from_pairs([("build.mcu", "esp32s3"), ("upload.flash_size", "8MB")]);

        assert_eq!(board.as_value()["build"]["mcu"], "esp32s3");
        assert_eq!(board.mcu(), "esp32s3");
        assert_eq!(board.flash_size(), "8MB");
    }

    #[test]
    fn test_board_set_replaces_scalar_parent() {
        let mut board = BoardConfig::new(json!({"build": "oops"}));
        board.set("build.mcu", "esp32s2");
        assert_eq!(board.mcu(), "esp32s2");
    }

    #[test]
    fn test_subst_forms() {
        let env = BuildEnv::new("/tmp/build").with_var(PROGNAME, "app");

        assert_eq!(env.subst("$BUILD_DIR/${PROGNAME}.bin"), "/tmp/build/app.bin");
        assert_eq!(env.subst("${BUILD_DIR}"), "/tmp/build");
        assert_eq!(env.subst("no vars"), "no vars");
    }

    #[test]
    fn test_subst_unknown_is_empty() {
        let env = BuildEnv::new("/tmp/build");
        assert_eq!(env.subst("[$UNDEFINED]"), "[]");
        assert_eq!(env.subst("[${UNDEFINED}]"), "[]");
    }

    #[test]
    fn test_subst_escaped_dollar() {
        let env = BuildEnv::new("/tmp/build");
        assert_eq!(env.subst("cost: $$5"), "cost: $5");
    }

    #[test]
    fn test_build_env_accessors() {
        let env = BuildEnv::new("/tmp/build").with_var(PYTHONEXE, "/usr/bin/python3.11");

        assert_eq!(env.build_dir(), PathBuf::from("/tmp/build"));
        assert_eq!(env.python_exe(), PathBuf::from("/usr/bin/python3.11"));
        assert_eq!(env.var(PROGNAME), Some("firmware"));
    }
}
