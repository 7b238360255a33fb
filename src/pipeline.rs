//! Build-pipeline abstraction for post-build hooks.
//!
//! Actions are registered against a target pattern that may reference
//! construction variables (`$BUILD_DIR/${PROGNAME}.bin`). Patterns are
//! expanded against the pipeline's [`BuildEnv`] when an artifact is reported,
//! so registration order and environment setup are independent. Both sides
//! are compared with `.` components removed, so `./build/firmware.bin` and
//! `build/firmware.bin` name the same target.

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};

use crate::build_env::BuildEnv;
use crate::runner::CommandRunner;
use crate::step::MergeStep;
use crate::toolchain::PackageRegistry;

/// Target that triggers the merge step: the main application binary.
pub const APP_BINARY_TARGET: &str = "$BUILD_DIR/${PROGNAME}.bin";

/// A hook run after a target is built. Returns a result code; non-zero fails
/// the build.
pub trait PostAction {
    fn call(&self, sources: &[PathBuf], targets: &[PathBuf], env: &BuildEnv, out: &mut dyn Write)
        -> i32;
}

impl<F> PostAction for F
where
    F: Fn(&[PathBuf], &[PathBuf], &BuildEnv, &mut dyn Write) -> i32,
{
    fn call(&self, sources: &[PathBuf], targets: &[PathBuf], env: &BuildEnv, out: &mut dyn Write) -> i32 {
        self(sources, targets, env, out)
    }
}

impl<R: PackageRegistry, C: CommandRunner> PostAction for MergeStep<R, C> {
    fn call(&self, _sources: &[PathBuf], _targets: &[PathBuf], env: &BuildEnv, out: &mut dyn Write) -> i32 {
        self.execute(env, out)
    }
}

struct Registration {
    pattern: String,
    action: Box<dyn PostAction>,
}

/// Post-action registry bound to one build environment.
pub struct BuildPipeline {
    env: BuildEnv,
    actions: Vec<Registration>,
}

impl BuildPipeline {
    pub fn new(env: BuildEnv) -> Self {
        Self {
            env,
            actions: Vec::new(),
        }
    }

    /// Register `action` to run after `pattern` is built.
    pub fn add_post_action(&mut self, pattern: impl Into<String>, action: impl PostAction + 'static) {
        let pattern = pattern.into();
        debug!(%pattern, "registered post action");
        self.actions.push(Registration {
            pattern,
            action: Box::new(action),
        });
    }

    /// Report that `target` was built from `sources`.
    ///
    /// Runs matching actions in registration order and stops at the first
    /// non-zero result, which is returned. Returns 0 when every matching action
    /// succeeds or nothing matches.
    pub fn artifact_built(&self, target: &Path, sources: &[PathBuf], out: &mut dyn Write) -> i32 {
        let targets = [target.to_path_buf()];
        let wanted = normalize(target);
        let mut matched = false;

        for registration in &self.actions {
            let expanded = self.env.subst(&registration.pattern);
            if normalize(Path::new(&expanded)) != wanted {
                continue;
            }

            matched = true;
            debug!(target = %target.display(), pattern = %registration.pattern, "running post action");
            let code = registration.action.call(sources, &targets, &self.env, out);
            if code != 0 {
                warn!(target = %target.display(), code, "post action failed");
                return code;
            }
        }

        if !matched {
            info!(
                target = %target.display(),
                registered = self.actions.len(),
                "no post action registered for target"
            );
        }
        0
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Register the merge step to run once the application binary is produced.
pub fn register<R, C>(pipeline: &mut BuildPipeline, step: MergeStep<R, C>)
where
    R: PackageRegistry + 'static,
    C: CommandRunner + 'static,
{
    pipeline.add_post_action(APP_BINARY_TARGET, step);
}
