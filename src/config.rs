//! Board configuration: data directory, RAM size, timer base frequency,
//! and the PRNG seed, persisted as JSON in the platform config directory.
//!
//! Grounded on the teacher's `Config::load`/`save`/`config_dir` shape
//! (platform-specific directory resolution, `eprintln!`-on-failure
//! tolerance); the teacher's hand-rolled line-based JSON parser is
//! replaced with `serde`/`serde_json`, the convention every other JSON
//! consumer in the pack uses.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default base frequency (Hz) the PIT's prescalers divide down from.
const DEFAULT_PIT_FREQUENCY: u32 = 268_111_856 / 2;
const DEFAULT_RAM_SIZE: u32 = 8 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Directory containing `itcm.bin`, `qemu_ctr_bootrom9.bin`,
    /// `sdmmc_info.bin`, `sd.bin`, `nand.bin`, `extcsd.bin`.
    pub data_dir: PathBuf,
    /// Size in bytes of the FCRAM window installed at 0x20000000.
    pub ram_size: u32,
    /// Base clock the PIT's four prescaler divisors count down from.
    pub pit_base_frequency: u32,
    /// Explicit PRNG seed, so a given config reproduces its random stream
    /// across runs (the original seeds libc's `rand()` from wall-clock
    /// time, which this crate deliberately does not replicate).
    pub prng_seed: u64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("3ds-data"),
            ram_size: DEFAULT_RAM_SIZE,
            pit_base_frequency: DEFAULT_PIT_FREQUENCY,
            prng_seed: 0,
        }
    }
}

impl BoardConfig {
    pub fn config_path() -> Option<PathBuf> {
        config_dir().map(|d| d.join("config.json"))
    }

    /// Load config from disk, or return defaults if not found / invalid.
    pub fn load() -> Self {
        let path = match Self::config_path() {
            Some(p) => p,
            None => return Self::default(),
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                eprintln!("[arm9-core] malformed config, using defaults: {e}");
                Self::default()
            }),
            Err(e) => {
                eprintln!("[arm9-core] cannot read config: {e}");
                Self::default()
            }
        }
    }

    pub fn save(&self) {
        let path = match Self::config_path() {
            Some(p) => p,
            None => return,
        };

        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&path, json) {
                    eprintln!("[arm9-core] cannot write config: {e}");
                }
            }
            Err(e) => eprintln!("[arm9-core] cannot serialize config: {e}"),
        }
    }
}

fn config_dir() -> Option<PathBuf> {
    // macOS:   ~/Library/Application Support/arm9-core/
    // Linux:   ~/.config/arm9-core/
    // Windows: %APPDATA%/arm9-core/

    #[cfg(target_os = "macos")]
    {
        let home = std::env::var("HOME").ok()?;
        Some(
            PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("arm9-core"),
        )
    }

    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA").ok()?;
        Some(PathBuf::from(appdata).join("arm9-core"))
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        let home = std::env::var("HOME").ok()?;
        Some(PathBuf::from(home).join(".config").join("arm9-core"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let config = BoardConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: BoardConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.ram_size, config.ram_size);
        assert_eq!(back.pit_base_frequency, config.pit_base_frequency);
        assert_eq!(back.prng_seed, config.prng_seed);
    }

    #[test]
    fn malformed_json_falls_back_to_defaults() {
        let parsed: Result<BoardConfig, _> = serde_json::from_str("not json");
        assert!(parsed.is_err());
    }
}
