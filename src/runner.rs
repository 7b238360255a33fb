//! Child-process execution for the merge command.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};

use fw_merge_layout::{Arg, MergeBinArgs};
use serde::Serialize;
use tracing::debug;

/// Exit code reported when the interpreter cannot be spawned at all,
/// matching a shell's "command not found".
pub const SPAWN_FAILURE_CODE: i32 = 127;

/// `<python> <esptool.py> <merge_bin args...>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeCommand {
    pub program: PathBuf,
    pub script: PathBuf,
    pub args: Vec<Arg>,
}

impl MergeCommand {
    pub fn new(program: PathBuf, script: PathBuf, merge: &MergeBinArgs) -> Self {
        Self {
            program,
            script,
            args: merge.to_args(),
        }
    }

    /// Arguments passed to `program`: the script followed by the merge args.
    pub fn argv(&self) -> Vec<OsString> {
        std::iter::once(self.script.clone().into_os_string())
            .chain(self.args.iter().map(|a| a.as_os_str().to_os_string()))
            .collect()
    }

    /// Printable command line with quoted paths.
    pub fn render(&self) -> String {
        std::iter::once(Arg::Path(self.program.clone()))
            .chain(std::iter::once(Arg::Path(self.script.clone())))
            .chain(self.args.iter().cloned())
            .map(|a| a.render())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Executes a merge command and reports its exit code.
pub trait CommandRunner {
    /// Run to completion. `Err` only when the process could not be started.
    fn run(&self, command: &MergeCommand) -> io::Result<i32>;
}

/// Spawns the interpreter directly (no shell) with inherited stdio.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &MergeCommand) -> io::Result<i32> {
        debug!(program = %command.program.display(), "spawning merge command");

        let status = Command::new(&command.program)
            .args(command.argv())
            .status()?;

        Ok(exit_code(status))
    }
}

/// Exit code of a finished child. Signal deaths map to `128 + signal` on Unix.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}
