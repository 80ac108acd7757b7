//! Auto-config codec (C5): sanitization and a text-boundary serialization for
//! the auto-mode configuration.

use serde::{Deserialize, Serialize};

/// Four severity-tier percentages, each sanitized into `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoBand {
    pub green: u8,
    pub yellow: u8,
    pub orange: u8,
    pub red: u8,
}

impl AutoBand {
    const fn new(green: u8, yellow: u8, orange: u8, red: u8) -> Self {
        Self {
            green,
            yellow,
            orange,
            red,
        }
    }

    fn sanitize(&mut self) {
        self.green = self.green.min(100);
        self.yellow = self.yellow.min(100);
        self.orange = self.orange.min(100);
        self.red = self.red.min(100);
    }
}

/// Per-channel enable flag plus its severity band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSensorConfig {
    pub enabled: bool,
    pub band: AutoBand,
}

impl AutoSensorConfig {
    const fn new(enabled: bool, band: AutoBand) -> Self {
        Self { enabled, band }
    }

    fn sanitize(&mut self) {
        self.band.sanitize();
    }
}

/// The full auto-mode configuration: a master enable plus one
/// [`AutoSensorConfig`] per sensor channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoConfig {
    pub enabled: bool,
    pub co2: AutoSensorConfig,
    pub co: AutoSensorConfig,
    pub pm25: AutoSensorConfig,
    pub voc: AutoSensorConfig,
    pub nox: AutoSensorConfig,
}

impl Default for AutoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            co2: AutoSensorConfig::new(true, AutoBand::new(30, 50, 70, 100)),
            co: AutoSensorConfig::new(true, AutoBand::new(20, 50, 100, 100)),
            pm25: AutoSensorConfig::new(true, AutoBand::new(20, 40, 70, 100)),
            voc: AutoSensorConfig::new(true, AutoBand::new(20, 50, 80, 100)),
            nox: AutoSensorConfig::new(true, AutoBand::new(20, 40, 70, 100)),
        }
    }
}

impl AutoConfig {
    /// Clamp every band percent into `[0, 100]` in place.
    pub fn sanitize(&mut self) {
        self.co2.sanitize();
        self.co.sanitize();
        self.pm25.sanitize();
        self.voc.sanitize();
        self.nox.sanitize();
    }

    /// Serialize to the flat JSON form. Always sanitizes first, so the
    /// output is guaranteed to satisfy the band invariant.
    #[must_use]
    pub fn serialize(&self) -> String {
        let mut sanitized = *self;
        sanitized.sanitize();
        // A config built from in-range fields never fails to serialize.
        serde_json::to_string(&sanitized).expect("AutoConfig always serializes")
    }

    /// Deserialize from either the flat form or the legacy `{"auto": {...}}`
    /// wrapper. On malformed input, `self` is left unchanged and `false` is
    /// returned. Fields missing from the source fall back to the field's
    /// current value in `self` rather than to `AutoConfig::default()`, so a
    /// partial update merges onto the existing configuration.
    pub fn deserialize(&mut self, text: &str) -> bool {
        let Ok(root) = serde_json::from_str::<serde_json::Value>(text) else {
            return false;
        };
        let Some(root_obj) = root.as_object() else {
            return false;
        };
        let source = root_obj
            .get("auto")
            .and_then(serde_json::Value::as_object)
            .unwrap_or(root_obj);

        let mut parsed = *self;
        parsed.enabled = bool_field(source, "enabled", parsed.enabled);
        read_sensor(source, "co2", &mut parsed.co2);
        read_sensor(source, "co", &mut parsed.co);
        read_sensor(source, "pm25", &mut parsed.pm25);
        read_sensor(source, "voc", &mut parsed.voc);
        read_sensor(source, "nox", &mut parsed.nox);

        parsed.sanitize();
        *self = parsed;
        true
    }
}

fn bool_field(obj: &serde_json::Map<String, serde_json::Value>, key: &str, default: bool) -> bool {
    obj.get(key).and_then(serde_json::Value::as_bool).unwrap_or(default)
}

fn u8_field(obj: &serde_json::Map<String, serde_json::Value>, key: &str, default: u8) -> u8 {
    obj.get(key)
        .and_then(serde_json::Value::as_u64)
        .and_then(|v| u8::try_from(v).ok())
        .unwrap_or(default)
}

fn read_sensor(
    source: &serde_json::Map<String, serde_json::Value>,
    key: &str,
    sensor: &mut AutoSensorConfig,
) {
    let Some(obj) = source.get(key).and_then(serde_json::Value::as_object) else {
        return;
    };
    sensor.enabled = bool_field(obj, "enabled", sensor.enabled);
    sensor.band.green = u8_field(obj, "green", sensor.band.green).min(100);
    sensor.band.yellow = u8_field(obj, "yellow", sensor.band.yellow).min(100);
    sensor.band.orange = u8_field(obj, "orange", sensor.band.orange).min(100);
    sensor.band.red = u8_field(obj, "red", sensor.band.red).min(100);
}
