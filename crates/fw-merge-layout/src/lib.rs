//! Flash layout for merged ESP32 firmware images.
//!
//! This crate knows nothing about processes or configuration files. It maps
//! an MCU identifier to the `esptool.py --chip` selector, describes where each
//! build artifact lands in flash, and renders the `merge_bin` argument list.

mod args;
mod artifacts;
mod chip;
mod layout;

pub use args::{Arg, MergeBinArgs};
pub use artifacts::{BuildArtifacts, ImageRole, MERGED_IMAGE};
pub use chip::Chip;
pub use layout::{FlashLayout, Segment, DEFAULT_FLASH_SIZE, FLASH_FREQ, FLASH_MODE};
