//! The firmware merge step.
//!
//! Resolves the artifact paths, the flashing tool, the chip selector and the
//! flash size from a [`BuildEnv`], prints the resulting `merge_bin` command
//! and runs it. Result codes:
//! - 0 on success
//! - 1 when `esptool.py` cannot be located (nothing is executed)
//! - the child's exit code when `merge_bin` fails
//!
//! Progress lines are best effort. A closed or broken console never changes
//! the result code.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fw_merge_layout::{BuildArtifacts, Chip, MergeBinArgs};
use serde::Serialize;
use tracing::{info, warn};

use crate::build_env::BuildEnv;
use crate::runner::{CommandRunner, MergeCommand, SPAWN_FAILURE_CODE};
use crate::toolchain::{locate_esptool, LocateError, PackageRegistry};

/// Printed when the flashing tool cannot be located.
pub const TOOL_NOT_FOUND_HINT: &str =
    "❌ tool-esptoolpy not found. Try rebuilding or add platform_packages = tool-esptoolpy.";

/// Merge step errors
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// `esptool.py` could not be located
    #[error("Flashing tool not found: {0}")]
    ToolNotFound(#[from] LocateError),

    /// `merge_bin` exited with a non-zero code
    #[error("merge_bin exited with code {code}")]
    ExecutionFailed { code: i32 },

    /// The interpreter could not be started
    #[error("Failed to start '{}': {source}", program.display())]
    Spawn { program: PathBuf, source: io::Error },
}

impl StepError {
    /// Result code reported to the build pipeline.
    pub fn exit_code(&self) -> i32 {
        match self {
            StepError::ToolNotFound(_) => 1,
            StepError::ExecutionFailed { code } => *code,
            StepError::Spawn { .. } => SPAWN_FAILURE_CODE,
        }
    }
}

/// Everything resolved before the command runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergePlan {
    pub merge: MergeBinArgs,
    pub command: MergeCommand,
}

impl MergePlan {
    pub fn output(&self) -> &Path {
        &self.merge.artifacts.output
    }
}

/// Post-build step producing `full_firmware.bin`.
#[derive(Debug)]
pub struct MergeStep<R, C> {
    registry: R,
    runner: C,
}

impl<R: PackageRegistry, C: CommandRunner> MergeStep<R, C> {
    pub fn new(registry: R, runner: C) -> Self {
        Self { registry, runner }
    }

    pub fn runner(&self) -> &C {
        &self.runner
    }

    /// Resolve paths, tool, chip and flash size without executing anything.
    pub fn plan(&self, env: &BuildEnv) -> Result<MergePlan, StepError> {
        let build_dir = env.build_dir();
        let artifacts = BuildArtifacts::in_dir(&build_dir);

        let esptool = locate_esptool(&self.registry)?;
        let python = env.python_exe();

        let mcu = env.board().mcu();
        let chip = Chip::from_mcu(&mcu);
        let flash_size = env.board().flash_size();
        info!(%mcu, %chip, %flash_size, build_dir = %build_dir.display(), "resolved merge parameters");

        let merge = MergeBinArgs::new(chip, flash_size, artifacts);
        let command = MergeCommand::new(python, esptool, &merge);

        Ok(MergePlan { merge, command })
    }

    /// Run the step, writing progress lines to `out`.
    ///
    /// Returns the merged image path on success.
    pub fn run(&self, env: &BuildEnv, out: &mut dyn Write) -> Result<PathBuf, StepError> {
        let plan = match self.plan(env) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(error = %e, "cannot merge firmware");
                report(out, TOOL_NOT_FOUND_HINT);
                return Err(e);
            }
        };

        let missing = plan.merge.artifacts.missing_inputs();
        if !missing.is_empty() {
            warn!(?missing, "merge inputs not found, esptool will report the failure");
        }

        report(out, "");
        report(out, "🔧 Merging full firmware...");
        report(out, &plan.command.render());

        let code = match self.runner.run(&plan.command) {
            Ok(code) => code,
            Err(source) => {
                warn!(error = %source, "failed to spawn merge command");
                report(out, "❌ merge_bin failed");
                return Err(StepError::Spawn {
                    program: plan.command.program,
                    source,
                });
            }
        };

        if code != 0 {
            report(out, "❌ merge_bin failed");
            return Err(StepError::ExecutionFailed { code });
        }

        let output = plan.output().to_path_buf();
        report(out, &format!("✅ full_firmware.bin generated -> {}", output.display()));
        Ok(output)
    }

    /// Run the step and collapse the outcome to a result code.
    pub fn execute(&self, env: &BuildEnv, out: &mut dyn Write) -> i32 {
        match self.run(env, out) {
            Ok(_) => 0,
            Err(e) => e.exit_code(),
        }
    }
}

fn report(out: &mut dyn Write, line: &str) {
    if let Err(e) = writeln!(out, "{}", line) {
        warn!(error = %e, "failed to write progress output");
    }
}
