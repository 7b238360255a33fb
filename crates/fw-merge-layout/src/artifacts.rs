//! Build artifact naming inside the build output directory.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// File name of the merged image written by `merge_bin`.
pub const MERGED_IMAGE: &str = "full_firmware.bin";

/// Role of an input image in the merged flash layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageRole {
    Bootloader,
    PartitionTable,
    Application,
}

impl ImageRole {
    /// File name the build toolchain writes for this role.
    pub fn file_name(&self) -> &'static str {
        match self {
            ImageRole::Bootloader => "bootloader.bin",
            ImageRole::PartitionTable => "partitions.bin",
            ImageRole::Application => "firmware.bin",
        }
    }
}

/// The three input images and the merged output, all in one build directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildArtifacts {
    pub bootloader: PathBuf,
    pub partitions: PathBuf,
    pub firmware: PathBuf,
    pub output: PathBuf,
}

impl BuildArtifacts {
    pub fn in_dir(build_dir: &Path) -> Self {
        Self {
            bootloader: build_dir.join(ImageRole::Bootloader.file_name()),
            partitions: build_dir.join(ImageRole::PartitionTable.file_name()),
            firmware: build_dir.join(ImageRole::Application.file_name()),
            output: build_dir.join(MERGED_IMAGE),
        }
    }

    /// Input path for a role.
    pub fn image(&self, role: ImageRole) -> &Path {
        match role {
            ImageRole::Bootloader => &self.bootloader,
            ImageRole::PartitionTable => &self.partitions,
            ImageRole::Application => &self.firmware,
        }
    }

    /// Inputs that are not present on disk.
    ///
    /// The merge step does not act on this; `esptool.py` reports missing
    /// inputs itself. Useful for diagnostics before spawning.
    pub fn missing_inputs(&self) -> Vec<&Path> {
        [&self.bootloader, &self.partitions, &self.firmware]
            .into_iter()
            .filter(|p| !p.is_file())
            .map(PathBuf::as_path)
            .collect()
    }
}
