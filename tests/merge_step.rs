//! Merge step end-to-end tests
//!
//! Drives the step from an effective config through to the command it would
//! run, with a recording runner standing in for esptool.

use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use fw_merge::config::ConfigInputs;
use fw_merge::pipeline::{register, BuildPipeline};
use fw_merge::step::TOOL_NOT_FOUND_HINT;
use fw_merge::toolchain::ESPTOOL_PACKAGE;
use fw_merge::{
    BoardConfig, BuildEnv, Chip, CommandRunner, EffectiveConfig, MergeCommand, MergeStep,
    PlatformioRegistry, StaticRegistry,
};
use serde_json::json;
use tempfile::TempDir;

/// Records every command and exits with a fixed code.
struct RecordingRunner {
    code: i32,
    commands: RefCell<Vec<MergeCommand>>,
}

impl RecordingRunner {
    fn exiting(code: i32) -> Self {
        Self {
            code,
            commands: RefCell::new(Vec::new()),
        }
    }

    fn rendered(&self) -> Vec<String> {
        self.commands.borrow().iter().map(MergeCommand::render).collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, command: &MergeCommand) -> io::Result<i32> {
        self.commands.borrow_mut().push(command.clone());
        Ok(self.code)
    }
}

fn esptool_package() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("esptool.py"), "# stub").unwrap();
    dir
}

fn registry(package: &TempDir) -> StaticRegistry {
    StaticRegistry::new().with_package(ESPTOOL_PACKAGE, package.path())
}

fn text(buf: Vec<u8>) -> String {
    String::from_utf8(buf).unwrap()
}

// =============================================================================
// Command construction
// =============================================================================

mod command_tests {
    use super::*;

    #[test]
    fn test_end_to_end_esp32c3_default_flash_size() {
        let package = esptool_package();
        let step = MergeStep::new(registry(&package), RecordingRunner::exiting(0));
        let env = BuildEnv::new("/tmp/build")
            .with_board(BoardConfig::from_pairs([("build.mcu", "ESP32-C3")]));

        let plan = step.plan(&env).unwrap();
        let rendered = plan.command.render();

        assert_eq!(plan.merge.chip, Chip::Esp32c3);
        assert!(rendered.contains("--chip esp32c3 "));
        assert!(rendered.contains("--flash_size 4MB "));
        assert!(rendered.contains("-o \"/tmp/build/full_firmware.bin\""));
        assert!(rendered.contains("0x1000 \"/tmp/build/bootloader.bin\""));
        assert!(rendered.contains("0x8000 \"/tmp/build/partitions.bin\""));
        assert!(rendered.ends_with("0x10000 \"/tmp/build/firmware.bin\""));
    }

    #[test]
    fn test_full_command_line() {
        let package = esptool_package();
        let step = MergeStep::new(registry(&package), RecordingRunner::exiting(0));
        let env = BuildEnv::new("/tmp/build")
            .with_var("PYTHONEXE", "/usr/bin/python3")
            .with_board(BoardConfig::from_pairs([
                ("build.mcu", "esp32s3"),
                ("upload.flash_size", "8MB"),
            ]));

        let plan = step.plan(&env).unwrap();
        let script = package.path().join("esptool.py");

        assert_eq!(
            plan.command.render(),
            format!(
                "\"/usr/bin/python3\" \"{}\" --chip esp32s3 merge_bin -o \"/tmp/build/full_firmware.bin\" \
                 --flash_mode dio --flash_freq 40m --flash_size 8MB \
                 0x1000 \"/tmp/build/bootloader.bin\" \
                 0x8000 \"/tmp/build/partitions.bin\" \
                 0x10000 \"/tmp/build/firmware.bin\"",
                script.display()
            )
        );
    }

    #[test]
    fn test_unknown_mcu_uses_esp32() {
        let package = esptool_package();
        let step = MergeStep::new(registry(&package), RecordingRunner::exiting(0));

        for mcu in ["esp8266", "rp2040", "ESP32", ""] {
            let env = BuildEnv::new("/tmp/build")
                .with_board(BoardConfig::from_pairs([("build.mcu", mcu)]));
            assert_eq!(step.plan(&env).unwrap().merge.chip, Chip::Esp32, "mcu {:?}", mcu);
        }
    }

    #[test]
    fn test_mcu_case_is_ignored() {
        let package = esptool_package();
        let step = MergeStep::new(registry(&package), RecordingRunner::exiting(0));

        for mcu in ["esp32c3", "ESP32C3", "Esp32C3"] {
            let env = BuildEnv::new("/tmp/build")
                .with_board(BoardConfig::from_pairs([("build.mcu", mcu)]));
            assert_eq!(step.plan(&env).unwrap().merge.chip, Chip::Esp32c3);
        }
    }
}

// =============================================================================
// Result codes and console output
// =============================================================================

mod outcome_tests {
    use super::*;

    #[test]
    fn test_success_returns_zero_and_names_output() {
        let package = esptool_package();
        let step = MergeStep::new(registry(&package), RecordingRunner::exiting(0));
        let mut out = Vec::new();

        let code = step.execute(&BuildEnv::new("/tmp/build"), &mut out);
        let out = text(out);

        assert_eq!(code, 0);
        assert!(out.contains("🔧 Merging full firmware..."));
        assert!(out.contains("✅ full_firmware.bin generated -> /tmp/build/full_firmware.bin"));
        assert!(!out.contains("❌"));
        assert_eq!(step.runner().rendered().len(), 1);
    }

    #[test]
    fn test_nonzero_exit_is_returned_unchanged() {
        for exit in [1, 2, 42, 255] {
            let package = esptool_package();
            let step = MergeStep::new(registry(&package), RecordingRunner::exiting(exit));
            let mut out = Vec::new();

            let code = step.execute(&BuildEnv::new("/tmp/build"), &mut out);
            let out = text(out);

            assert_eq!(code, exit);
            assert!(out.contains("❌ merge_bin failed"));
            assert!(!out.contains("✅"));
        }
    }

    #[test]
    fn test_missing_package_returns_one_without_execution() {
        let step = MergeStep::new(StaticRegistry::new(), RecordingRunner::exiting(0));
        let mut out = Vec::new();

        let code = step.execute(&BuildEnv::new("/tmp/build"), &mut out);

        assert_eq!(code, 1);
        assert!(step.runner().rendered().is_empty());
        assert_eq!(text(out).trim_end(), TOOL_NOT_FOUND_HINT);
    }

    #[test]
    fn test_package_without_script_returns_one() {
        let empty = TempDir::new().unwrap();
        let step = MergeStep::new(registry(&empty), RecordingRunner::exiting(0));

        let code = step.execute(&BuildEnv::new("/tmp/build"), &mut Vec::new());

        assert_eq!(code, 1);
        assert!(step.runner().rendered().is_empty());
    }
}

// =============================================================================
// Config -> registry -> step -> pipeline
// =============================================================================

mod integration_tests {
    use super::*;

    fn platformio_core() -> TempDir {
        let core = TempDir::new().unwrap();
        let package = core.path().join("packages/tool-esptoolpy@1.40501.0");
        fs::create_dir_all(&package).unwrap();
        fs::write(package.join("esptool.py"), "# stub").unwrap();
        core
    }

    fn config_for(core: &Path, build_dir: &Path, board_file: Option<PathBuf>) -> EffectiveConfig {
        let inputs = ConfigInputs {
            board_file,
            env: Some(json!({
                "build": {"dir": build_dir.to_string_lossy(), "python": "/usr/bin/python3"},
                "packages": {"core_dir": core.to_string_lossy()}
            })),
            ..Default::default()
        };
        EffectiveConfig::build(&inputs).unwrap()
    }

    #[test]
    fn test_board_manifest_drives_chip_and_size() {
        let core = platformio_core();
        let build = TempDir::new().unwrap();
        let board = build.path().join("esp32-s3-devkitc-1.json");
        fs::write(
            &board,
            r#"{
                "build": {"mcu": "esp32s3", "f_cpu": "240000000L"},
                "upload": {"flash_size": "8MB", "maximum_size": 8388608},
                "name": "Espressif ESP32-S3-DevKitC-1"
            }"#,
        )
        .unwrap();

        let config = config_for(core.path(), build.path(), Some(board));
        let settings = config.package_settings().unwrap();
        let registry = PlatformioRegistry::from_settings(&settings, None);
        let step = MergeStep::new(registry, RecordingRunner::exiting(0));

        let plan = step.plan(&config.build_env()).unwrap();

        assert_eq!(plan.merge.chip, Chip::Esp32s3);
        assert_eq!(plan.merge.flash_size, "8MB");
        assert_eq!(plan.output(), build.path().join("full_firmware.bin"));
        assert!(plan
            .command
            .script
            .ends_with("packages/tool-esptoolpy@1.40501.0/esptool.py"));
    }

    #[test]
    fn test_pipeline_runs_step_for_app_binary_only() {
        let core = platformio_core();
        let build = TempDir::new().unwrap();
        let config = config_for(core.path(), build.path(), None);
        let registry = PlatformioRegistry::from_settings(&config.package_settings().unwrap(), None);

        let mut pipeline = BuildPipeline::new(config.build_env());
        register(&mut pipeline, MergeStep::new(registry, RecordingRunner::exiting(0)));

        let mut out = Vec::new();
        let elf = pipeline.artifact_built(&build.path().join("firmware.elf"), &[], &mut out);
        assert_eq!(elf, 0);
        assert!(out.is_empty());

        let bin = pipeline.artifact_built(
            &build.path().join("firmware.bin"),
            &[build.path().join("firmware.elf")],
            &mut out,
        );
        assert_eq!(bin, 0);
        assert!(text(out).contains("✅ full_firmware.bin generated"));
    }

    #[test]
    fn test_pipeline_propagates_failure() {
        let core = platformio_core();
        let build = TempDir::new().unwrap();
        let config = config_for(core.path(), build.path(), None);
        let registry = PlatformioRegistry::from_settings(&config.package_settings().unwrap(), None);

        let mut pipeline = BuildPipeline::new(config.build_env());
        register(&mut pipeline, MergeStep::new(registry, RecordingRunner::exiting(2)));

        let code = pipeline.artifact_built(&build.path().join("firmware.bin"), &[], &mut Vec::new());
        assert_eq!(code, 2);
    }

    #[test]
    fn test_pipeline_without_esptool_fails_with_one() {
        let empty_core = TempDir::new().unwrap();
        let build = TempDir::new().unwrap();
        let config = config_for(empty_core.path(), build.path(), None);
        let registry = PlatformioRegistry::from_settings(&config.package_settings().unwrap(), None);

        let mut pipeline = BuildPipeline::new(config.build_env());
        register(&mut pipeline, MergeStep::new(registry, RecordingRunner::exiting(0)));

        let mut out = Vec::new();
        let code = pipeline.artifact_built(&build.path().join("firmware.bin"), &[], &mut out);

        assert_eq!(code, 1);
        assert!(text(out).contains("tool-esptoolpy not found"));
    }
}
