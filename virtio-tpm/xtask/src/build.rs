// Licensed under the Apache-2.0 license

use anyhow::Result;
use std::process::Command;

use crate::run_command;

pub fn run(release: bool, packages: Vec<String>) -> Result<()> {
    println!("Building virtio-tpm workspace");

    let mut cmd = Command::new("cargo");
    cmd.arg("build");

    if release {
        cmd.arg("--release");
        println!("Mode: Release");
    } else {
        println!("Mode: Debug");
    }

    if packages.is_empty() {
        cmd.arg("--workspace");
        println!("Target: All workspace packages");
    } else {
        println!("Target: {}", packages.join(", "));
        for package in &packages {
            cmd.args(["-p", package]);
        }
    }

    cmd.args(["--all-targets", "--all-features"]);

    run_command("cargo build", &mut cmd)?;

    println!("✓ Build completed successfully!");
    Ok(())
}
