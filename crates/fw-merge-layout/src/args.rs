//! `esptool.py merge_bin` argument grammar.
//!
//! ```text
//! --chip <chip> merge_bin -o <output>
//!     --flash_mode <mode> --flash_freq <freq> --flash_size <size>
//!     <offset> <image> [<offset> <image> ...]
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::artifacts::BuildArtifacts;
use crate::chip::Chip;
use crate::layout::FlashLayout;

/// A single argv element. Paths are kept apart from plain words so the
/// printed command line can quote them. Both serialize as plain strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Arg {
    Word(String),
    Path(PathBuf),
}

impl Arg {
    fn word(s: impl Into<String>) -> Self {
        Arg::Word(s.into())
    }

    pub fn as_os_str(&self) -> &OsStr {
        match self {
            Arg::Word(w) => OsStr::new(w),
            Arg::Path(p) => p.as_os_str(),
        }
    }

    /// Shell-style rendering: paths in double quotes, words bare.
    pub fn render(&self) -> String {
        match self {
            Arg::Word(w) => w.clone(),
            Arg::Path(p) => quote_path(p),
        }
    }
}

/// Double-quote a path for display.
fn quote_path(path: &Path) -> String {
    format!("\"{}\"", path.display())
}

/// Fully resolved inputs of one `merge_bin` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeBinArgs {
    pub chip: Chip,
    pub flash_size: String,
    pub layout: FlashLayout,
    pub artifacts: BuildArtifacts,
}

impl MergeBinArgs {
    pub fn new(chip: Chip, flash_size: impl Into<String>, artifacts: BuildArtifacts) -> Self {
        Self {
            chip,
            flash_size: flash_size.into(),
            layout: FlashLayout::default(),
            artifacts,
        }
    }

    /// Arguments following the script path.
    pub fn to_args(&self) -> Vec<Arg> {
        let mut args = vec![
            Arg::word("--chip"),
            Arg::word(self.chip.as_str()),
            Arg::word("merge_bin"),
            Arg::word("-o"),
            Arg::Path(self.artifacts.output.clone()),
            Arg::word("--flash_mode"),
            Arg::word(self.layout.mode),
            Arg::word("--flash_freq"),
            Arg::word(self.layout.freq),
            Arg::word("--flash_size"),
            Arg::word(self.flash_size.as_str()),
        ];

        for segment in &self.layout.segments {
            args.push(Arg::Word(segment.offset_hex()));
            args.push(Arg::Path(self.artifacts.image(segment.role).to_path_buf()));
        }

        args
    }
}
