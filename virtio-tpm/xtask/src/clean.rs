// Licensed under the Apache-2.0 license

use anyhow::Result;
use std::process::Command;

use crate::run_command;

pub fn run(release: bool) -> Result<()> {
    println!("Cleaning build artifacts");

    let mut cmd = Command::new("cargo");
    cmd.arg("clean");

    if release {
        cmd.arg("--release");
    }

    run_command("cargo clean", &mut cmd)?;

    println!("✓ Clean completed successfully!");
    Ok(())
}
