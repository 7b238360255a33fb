//! fw-merge CLI
//!
//! Entry point for the `fw-merge` command-line tool.

use clap::{Args, Parser, Subcommand};
use fw_merge::config::{env_layer, DEFAULT_CONFIG_FILE};
use fw_merge::pipeline::{register, BuildPipeline};
use fw_merge::step::TOOL_NOT_FOUND_HINT;
use fw_merge::{
    locate_esptool, CliOverrides, ConfigError, ConfigInputs, EffectiveConfig, MergeStep,
    PlatformioRegistry, SystemRunner,
};
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fw-merge")]
#[command(about = "Merge ESP32 bootloader, partition table and app into one image", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run esptool merge_bin over the current build output
    Merge {
        #[command(flatten)]
        settings: Settings,

        /// Print the command without running it
        #[arg(long)]
        dry_run: bool,

        /// With --dry-run, print the resolved plan as JSON
        #[arg(long, requires = "dry_run")]
        json: bool,
    },

    /// Report a built target; merges when it is $BUILD_DIR/${PROGNAME}.bin
    PostBuild {
        /// The target that was just built
        target: PathBuf,

        /// Sources the target was built from
        #[arg(long = "source")]
        sources: Vec<PathBuf>,

        #[command(flatten)]
        settings: Settings,
    },

    /// Print the resolved esptool.py path
    Locate {
        #[command(flatten)]
        settings: Settings,
    },

    /// Print the effective configuration with provenance
    Config {
        #[command(flatten)]
        settings: Settings,

        /// Also write the JSON to this file
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct Settings {
    /// Path to config file (default: fw-merge.toml if present)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// PlatformIO board manifest (JSON)
    #[arg(long)]
    board: Option<PathBuf>,

    /// Build output directory (overrides BUILD_DIR)
    #[arg(long)]
    build_dir: Option<PathBuf>,

    /// Python interpreter (overrides PYTHONEXE)
    #[arg(long)]
    python: Option<PathBuf>,

    /// Program name (overrides PROGNAME)
    #[arg(long)]
    progname: Option<String>,

    /// MCU identifier (overrides board build.mcu)
    #[arg(long)]
    mcu: Option<String>,

    /// Flash size, e.g. 4MB (overrides board upload.flash_size)
    #[arg(long)]
    flash_size: Option<String>,

    /// Directory of the tool-esptoolpy package
    #[arg(long)]
    esptool_dir: Option<PathBuf>,

    /// PlatformIO core directory (overrides PLATFORMIO_CORE_DIR)
    #[arg(long)]
    core_dir: Option<PathBuf>,
}

impl Settings {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            build_dir: self.build_dir.clone(),
            python: self.python.clone(),
            progname: self.progname.clone(),
            mcu: self.mcu.clone(),
            flash_size: self.flash_size.clone(),
            esptool_dir: self.esptool_dir.clone(),
            core_dir: self.core_dir.clone(),
        }
    }
}

fn main() {
    init_logging();

    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Merge {
            settings,
            dry_run,
            json,
        } => run_merge(&settings, dry_run, json),
        Commands::PostBuild {
            target,
            sources,
            settings,
        } => run_post_build(&settings, &target, &sources),
        Commands::Locate { settings } => run_locate(&settings),
        Commands::Config { settings, output } => run_config(&settings, output.as_deref()),
    };

    process::exit(code);
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("FW_MERGE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(settings: &Settings) -> Result<EffectiveConfig, ConfigError> {
    let config_file = match &settings.config {
        Some(path) if !path.exists() => {
            return Err(ConfigError::Io {
                path: path.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "config file not found"),
            });
        }
        Some(path) => path.clone(),
        None => PathBuf::from(DEFAULT_CONFIG_FILE),
    };

    let inputs = ConfigInputs {
        config_file: Some(config_file),
        board_file: settings.board.clone(),
        env: env_layer(|key| std::env::var(key).ok()),
        cli: settings.overrides().to_value(),
    };

    EffectiveConfig::build(&inputs)
}

fn load_or_exit(settings: &Settings) -> EffectiveConfig {
    match load_config(settings) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    }
}

fn registry_for(config: &EffectiveConfig) -> PlatformioRegistry {
    let settings = match config.package_settings() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };
    let home = std::env::var_os("HOME").map(PathBuf::from);
    PlatformioRegistry::from_settings(&settings, home.as_deref())
}

fn run_merge(settings: &Settings, dry_run: bool, json: bool) -> i32 {
    let config = load_or_exit(settings);
    let env = config.build_env();
    let step = MergeStep::new(registry_for(&config), SystemRunner);

    if dry_run {
        return match step.plan(&env) {
            Ok(plan) if json => match serde_json::to_string_pretty(&plan) {
                Ok(text) => {
                    println!("{}", text);
                    0
                }
                Err(e) => {
                    eprintln!("Error serializing plan: {}", e);
                    1
                }
            },
            Ok(plan) => {
                println!("{}", plan.command.render());
                0
            }
            Err(e) => {
                println!("{}", TOOL_NOT_FOUND_HINT);
                eprintln!("{}", e);
                e.exit_code()
            }
        };
    }

    step.execute(&env, &mut io::stdout().lock())
}

fn run_post_build(settings: &Settings, target: &Path, sources: &[PathBuf]) -> i32 {
    let config = load_or_exit(settings);
    let step = MergeStep::new(registry_for(&config), SystemRunner);

    let mut pipeline = BuildPipeline::new(config.build_env());
    register(&mut pipeline, step);

    pipeline.artifact_built(target, sources, &mut io::stdout().lock())
}

fn run_locate(settings: &Settings) -> i32 {
    let config = load_or_exit(settings);
    let registry = registry_for(&config);

    match locate_esptool(&registry) {
        Ok(path) => {
            println!("{}", path.display());
            0
        }
        Err(e) => {
            println!("{}", TOOL_NOT_FOUND_HINT);
            eprintln!("{}", e);
            1
        }
    }
}

fn run_config(settings: &Settings, output: Option<&Path>) -> i32 {
    let config = load_or_exit(settings);

    match config.to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing config: {}", e);
            return 1;
        }
    }

    if let Some(path) = output {
        if let Err(e) = config.write_to_file(path) {
            eprintln!("Failed to write {}: {}", path.display(), e);
            return 1;
        }
    }

    0
}
