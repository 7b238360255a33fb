//! Flash parameters and segment offsets for the merged image.

use serde::Serialize;

use crate::artifacts::ImageRole;

/// Flash size passed when the board does not declare `upload.flash_size`.
pub const DEFAULT_FLASH_SIZE: &str = "4MB";

/// SPI flash access mode (`--flash_mode`).
pub const FLASH_MODE: &str = "dio";

/// SPI flash clock (`--flash_freq`).
pub const FLASH_FREQ: &str = "40m";

/// One image placed at a flash offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub offset: u32,
    pub role: ImageRole,
}

impl Segment {
    /// Offset as esptool expects it, e.g. `0x1000`.
    pub fn offset_hex(&self) -> String {
        format!("{:#x}", self.offset)
    }
}

/// Flash parameters and segment placement for `merge_bin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlashLayout {
    pub mode: &'static str,
    pub freq: &'static str,
    /// Segments in the order they are passed on the command line.
    pub segments: Vec<Segment>,
}

impl Default for FlashLayout {
    /// `dio` at 40 MHz; bootloader at 0x1000, partition table at 0x8000,
    /// application at 0x10000. Applied to every chip variant.
    fn default() -> Self {
        Self {
            mode: FLASH_MODE,
            freq: FLASH_FREQ,
            segments: vec![
                Segment {
                    offset: 0x1000,
                    role: ImageRole::Bootloader,
                },
                Segment {
                    offset: 0x8000,
                    role: ImageRole::PartitionTable,
                },
                Segment {
                    offset: 0x10000,
                    role: ImageRole::Application,
                },
            ],
        }
    }
}
