// Licensed under the Apache-2.0 license

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name searched for by [`LoopbackConfig::load_default`]
pub const CONFIG_FILE_NAME: &str = "loopback-config.toml";

/// Configuration for the loopback demo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoopbackConfig {
    pub device: DeviceConfig,
    pub transport: TransportSettings,
    pub backend: BackendConfig,
}

/// Virtio identity and queue geometry of the loopback device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub device_id: u32,
    pub vendor_id: u32,
    pub queue_size: u16,
}

/// Front-end transport settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub timeout_ms: u32,
    pub response_capacity: usize,
    pub tpm2_probe: bool,
}

/// How the backend answers commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Return the command as the response payload
    Echo,
    /// Return `fixed_payload` for every command
    Fixed,
    /// Never answer
    Silent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub mode: BackendMode,
    pub response_tag: u32,
    /// Hex-encoded payload used in `fixed` mode
    pub fixed_payload: String,
    pub response_delay_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: 41,
            vendor_id: 0x1af4,
            queue_size: 16,
        }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 120_000,
            response_capacity: 512,
            tpm2_probe: true,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            mode: BackendMode::Echo,
            response_tag: 0x8001,
            fixed_payload: String::new(),
            response_delay_ms: 0,
        }
    }
}

impl BackendConfig {
    /// Decode `fixed_payload`
    pub fn fixed_payload_bytes(&self) -> Result<Vec<u8>> {
        parse_hex(&self.fixed_payload).context("Invalid backend.fixed_payload")
    }
}

impl LoopbackConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: LoopbackConfig =
            toml::from_str(&contents).with_context(|| "Failed to parse TOML configuration")?;

        Ok(config)
    }

    /// Load `loopback-config.toml` from the current directory or a parent
    pub fn load_default() -> Result<Self> {
        let mut current_dir = std::env::current_dir()?;

        loop {
            let config_path = current_dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Self::from_file(config_path);
            }

            let app_config = current_dir
                .join("virtio-tpm")
                .join("apps")
                .join("loopback")
                .join(CONFIG_FILE_NAME);
            if app_config.exists() {
                return Self::from_file(app_config);
            }

            // Move up one directory
            if let Some(parent) = current_dir.parent() {
                current_dir = parent.to_path_buf();
            } else {
                break;
            }
        }

        // If no config file found, return default values
        Ok(Self::default())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        std::fs::write(path.as_ref(), contents)
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))?;

        Ok(())
    }
}

/// Parse a hex string, ignoring whitespace and an optional `0x` prefix.
pub fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let digits: String = text
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if !digits.is_ascii() {
        bail!("Non-hex characters in {:?}", text);
    }
    if digits.len() % 2 != 0 {
        bail!("Odd number of hex digits in {:?}", text);
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .with_context(|| format!("Invalid hex byte {:?}", &digits[i..i + 2]))
        })
        .collect()
}
