// Licensed under the Apache-2.0 license

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::Command;

mod build;
mod clean;

#[derive(Parser)]
#[command(
    name = "xtask",
    version,
    about = "Command-line toolkit for the virtio-tpm workspace",
    long_about = "Builds, tests and lints the virtio TPM front-end crates and runs the loopback demo."
)]
struct Xtask {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the workspace
    Build {
        /// Build in release mode
        #[arg(short, long)]
        release: bool,
        /// Build specific package(s)
        #[arg(short, long)]
        package: Vec<String>,
    },

    /// Run tests
    Test {
        /// Run tests in release mode
        #[arg(short, long)]
        release: bool,
        /// Run specific test package(s)
        #[arg(short, long)]
        package: Vec<String>,
        /// Run only the integration test crate
        #[arg(long)]
        integration_only: bool,
    },

    /// Clean build artifacts
    Clean {
        /// Only remove release artifacts
        #[arg(long)]
        release: bool,
    },

    /// Format code
    Fmt {
        /// Check formatting without applying changes
        #[arg(long)]
        check: bool,
    },

    /// Run clippy lints
    Clippy {
        /// Fix issues automatically where possible
        #[arg(long)]
        fix: bool,
        /// Fail on warnings
        #[arg(long)]
        deny_warnings: bool,
    },

    /// Run comprehensive checks (format, clippy, build, test)
    Check {
        /// Skip tests
        #[arg(long)]
        quick: bool,
    },

    /// Run pre-check-in checks (format, clippy, build)
    Precheckin,

    /// Run the loopback demo
    Loopback {
        /// Path to TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Command bytes in hex; may be repeated
        #[arg(long)]
        command: Vec<String>,
        /// Enable debug logging
        #[arg(short, long)]
        verbose: bool,
        /// Build in release mode before running
        #[arg(short, long)]
        release: bool,
    },
}

fn main() -> Result<()> {
    let args = Xtask::parse();

    println!("xtask virtio-tpm toolkit");

    match args.command {
        Commands::Build { release, package } => build::run(release, package),
        Commands::Test {
            release,
            package,
            integration_only,
        } => test::run(release, package, integration_only),
        Commands::Clean { release } => clean::run(release),
        Commands::Fmt { check } => run_fmt(check),
        Commands::Clippy { fix, deny_warnings } => run_clippy(fix, deny_warnings),
        Commands::Check { quick } => run_check(quick),
        Commands::Precheckin => run_precheckin(),
        Commands::Loopback {
            config,
            command,
            verbose,
            release,
        } => run_loopback(config, command, verbose, release),
    }
}

pub fn run_command(name: &str, cmd: &mut Command) -> Result<()> {
    println!("Running: {}", name);

    let status = cmd
        .status()
        .with_context(|| format!("Failed to execute command: {}", name))?;

    if status.success() {
        println!("✓ {}", name);
        Ok(())
    } else {
        anyhow::bail!("Command failed: {}", name);
    }
}

fn run_fmt(check: bool) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("fmt");

    if check {
        cmd.arg("--check");
    }

    run_command("cargo fmt", &mut cmd)
}

fn run_clippy(fix: bool, deny_warnings: bool) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.args(["clippy", "--workspace", "--all-targets", "--all-features"]);

    if fix {
        cmd.arg("--fix");
    }

    if deny_warnings {
        cmd.args(["--", "-D", "warnings"]);
    }

    run_command("cargo clippy", &mut cmd)
}

fn run_check(quick: bool) -> Result<()> {
    println!("Starting comprehensive check");

    run_fmt(true)?;
    run_clippy(false, true)?;
    build::run(false, vec![])?;

    if quick {
        println!("ℹ Skipping tests (quick mode)");
    } else {
        test::run(false, vec![], false)?;
    }

    println!("✓ All checks passed!");
    Ok(())
}

fn run_precheckin() -> Result<()> {
    println!("Starting pre-check-in checks");

    run_fmt(true)?;
    run_clippy(false, true)?;
    build::run(false, vec![])?;

    println!("✓ Pre-check-in passed!");
    Ok(())
}

fn run_loopback(
    config: Option<PathBuf>,
    commands: Vec<String>,
    verbose: bool,
    release: bool,
) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.args(["run", "-p", "virtio-tpm-loopback", "--bin", "vtpm-loopback"]);

    if release {
        cmd.arg("--release");
    }

    cmd.arg("--");

    if let Some(config_path) = config {
        let full_config_path = if config_path.is_absolute() {
            config_path
        } else {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        };
        cmd.arg("--config").arg(full_config_path);
    }

    for command in &commands {
        cmd.args(["--command", command]);
    }

    if verbose {
        cmd.arg("--verbose");
    }

    run_command("vtpm-loopback", &mut cmd)
}
