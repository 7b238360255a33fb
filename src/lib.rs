//! fw-merge - merged ESP32 firmware images
//!
//! Post-build step that runs `esptool.py merge_bin` to combine the
//! bootloader, partition table and application binaries of a PlatformIO
//! build into a single `full_firmware.bin`.

pub mod build_env;
pub mod config;
pub mod pipeline;
pub mod runner;
pub mod step;
pub mod toolchain;

pub use build_env::{BoardConfig, BuildEnv};
pub use config::{CliOverrides, ConfigError, ConfigInputs, EffectiveConfig};
pub use pipeline::{register, BuildPipeline, PostAction, APP_BINARY_TARGET};
pub use runner::{CommandRunner, MergeCommand, SystemRunner};
pub use step::{MergePlan, MergeStep, StepError};
pub use toolchain::{locate_esptool, LocateError, PackageRegistry, PlatformioRegistry, StaticRegistry};

pub use fw_merge_layout::{BuildArtifacts, Chip, FlashLayout};
