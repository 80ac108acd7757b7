//! Boot-time persistence for the two fields the core itself never touches:
//! the user's auto/manual mode preference and the auto-mode configuration.

use anyhow::{anyhow, Result};
use esp_idf_svc::nvs::{EspNvs, EspNvsPartition, NvsDefault};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use ventctl_core::AutoConfig;

const NVS_NAMESPACE: &str = "ventctl";
const NVS_CONFIG_KEY: &str = "config";

static NVS: Mutex<Option<EspNvs<NvsDefault>>> = Mutex::new(None);

pub fn init_nvs(nvs_partition: EspNvsPartition<NvsDefault>) -> Result<()> {
    debug!("Initializing NVS namespace: {NVS_NAMESPACE}");
    let nvs = EspNvs::new(nvs_partition, NVS_NAMESPACE, true)?;
    *NVS.lock().unwrap() = Some(nvs);
    info!("NVS initialized");
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredConfig {
    #[serde(default)]
    auto_mode_preference: bool,
    #[serde(default)]
    auto_config: AutoConfig,
}

impl Default for StoredConfig {
    fn default() -> Self {
        Self {
            auto_mode_preference: false,
            auto_config: AutoConfig::default(),
        }
    }
}

/// The boot preference for `FanControlCore::new` plus the last-saved
/// auto-mode configuration to push into the control handle once it exists.
pub struct BootConfig {
    pub auto_mode_preference: bool,
    pub auto_config: AutoConfig,
}

pub fn load_or_default() -> BootConfig {
    match load() {
        Ok(stored) => {
            info!("Loaded config from NVS");
            BootConfig {
                auto_mode_preference: stored.auto_mode_preference,
                auto_config: stored.auto_config,
            }
        }
        Err(e) => {
            warn!("Failed to load config from NVS: {e}, using defaults");
            let stored = StoredConfig::default();
            BootConfig {
                auto_mode_preference: stored.auto_mode_preference,
                auto_config: stored.auto_config,
            }
        }
    }
}

fn load() -> Result<StoredConfig> {
    debug!("Loading config from NVS");
    let nvs_guard = NVS.lock().unwrap();
    let nvs = nvs_guard
        .as_ref()
        .ok_or_else(|| anyhow!("NVS not initialized"))?;

    let len = nvs.blob_len(NVS_CONFIG_KEY)?;
    if let Some(len) = len {
        debug!("Config blob size: {len} bytes");
        let mut buf = vec![0u8; len];
        nvs.get_blob(NVS_CONFIG_KEY, &mut buf)?;
        let config: StoredConfig = serde_json::from_slice(&buf)?;
        Ok(config)
    } else {
        Err(anyhow!("No config found in NVS"))
    }
}

pub fn save(auto_mode_preference: bool, auto_config: &AutoConfig) -> Result<()> {
    debug!("Saving config to NVS");
    let mut nvs_guard = NVS.lock().unwrap();
    let nvs = nvs_guard
        .as_mut()
        .ok_or_else(|| anyhow!("NVS not initialized"))?;

    let stored = StoredConfig {
        auto_mode_preference,
        auto_config: *auto_config,
    };
    let json = serde_json::to_vec(&stored)?;
    debug!("Config JSON size: {} bytes", json.len());
    nvs.set_blob(NVS_CONFIG_KEY, &json)?;
    info!("Config saved to NVS");
    Ok(())
}
