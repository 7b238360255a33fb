//! Chip selector derived from the board's MCU identifier.

use std::fmt;

use serde::Serialize;

/// `esptool.py --chip` values understood by the merge step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Chip {
    #[default]
    Esp32,
    Esp32c3,
    Esp32s3,
    Esp32s2,
}

/// Variants probed by substring, in priority order. `Esp32` is the fallback.
const PROBE_ORDER: &[Chip] = &[Chip::Esp32c3, Chip::Esp32s3, Chip::Esp32s2];

impl Chip {
    /// Select the chip for an MCU identifier such as `esp32c3` or `ESP32-S3`.
    ///
    /// The identifier is lower-cased and stripped of `-`, `_` and whitespace,
    /// then probed for `esp32c3`, `esp32s3`, `esp32s2` in that order. The first
    /// hit wins; anything else selects plain `esp32`.
    pub fn from_mcu(mcu: &str) -> Self {
        let normalized: String = mcu
            .to_lowercase()
            .chars()
            .filter(|c| !matches!(c, '-' | '_') && !c.is_whitespace())
            .collect();

        PROBE_ORDER
            .iter()
            .copied()
            .find(|chip| normalized.contains(chip.as_str()))
            .unwrap_or(Chip::Esp32)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Chip::Esp32 => "esp32",
            Chip::Esp32c3 => "esp32c3",
            Chip::Esp32s3 => "esp32s3",
            Chip::Esp32s2 => "esp32s2",
        }
    }
}

impl fmt::Display for Chip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
