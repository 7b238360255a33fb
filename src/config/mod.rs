//! Layered configuration
//!
//! Layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. PlatformIO board manifest (`--board` or `board_file`)
//! 3. Config file (`fw-merge.toml`)
//! 4. Environment (`BUILD_DIR`, `PYTHONEXE`, `PROGNAME`, `PLATFORMIO_CORE_DIR`)
//! 5. CLI flags

mod defaults;
mod effective;
mod merge;
mod overrides;

pub use defaults::BuiltinDefaults;
pub use effective::{
    ConfigError, ConfigInputs, ConfigOrigin, ConfigSource, EffectiveConfig, DEFAULT_CONFIG_FILE,
};
pub use merge::{deep_merge, merge_layers};
pub use overrides::{env_layer, CliOverrides, ENV_KEYS};
