//! Auto-demand evaluator (C3): a pure function mapping a sensor snapshot and
//! the auto-mode configuration to a demanded fan output percentage.

use crate::autoconfig::{AutoBand, AutoConfig};

/// Read-only sensor snapshot published by the (external) sensor acquisition
/// drivers. The core never mutates this.
#[derive(Debug, Clone, Copy, Default)]
pub struct SensorData {
    pub co2_valid: bool,
    pub co2: i32,

    pub co_sensor_present: bool,
    pub co_valid: bool,
    pub co_ppm: f32,

    pub pm25_valid: bool,
    pub pm25: f32,

    pub voc_valid: bool,
    pub voc_index: i32,

    pub nox_valid: bool,
    pub nox_index: i32,
}

fn band_percent(band: &AutoBand, tier: Tier) -> u8 {
    match tier {
        Tier::Green => band.green,
        Tier::Yellow => band.yellow,
        Tier::Orange => band.orange,
        Tier::Red => band.red,
    }
}

#[derive(Clone, Copy)]
enum Tier {
    Green,
    Yellow,
    Orange,
    Red,
}

fn co2_tier(co2: i32) -> Tier {
    if co2 < 800 {
        Tier::Green
    } else if co2 < 1000 {
        Tier::Yellow
    } else if co2 < 1500 {
        Tier::Orange
    } else {
        Tier::Red
    }
}

fn co_tier(co_ppm: f32) -> Tier {
    if co_ppm < 9.0 {
        Tier::Green
    } else if co_ppm <= 35.0 {
        Tier::Yellow
    } else if co_ppm <= 100.0 {
        Tier::Orange
    } else {
        Tier::Red
    }
}

fn pm25_tier(pm25: f32) -> Tier {
    if pm25 <= 12.0 {
        Tier::Green
    } else if pm25 <= 35.0 {
        Tier::Yellow
    } else if pm25 <= 55.0 {
        Tier::Orange
    } else {
        Tier::Red
    }
}

fn voc_tier(voc: i32) -> Tier {
    if voc <= 150 {
        Tier::Green
    } else if voc <= 250 {
        Tier::Yellow
    } else if voc <= 350 {
        Tier::Orange
    } else {
        Tier::Red
    }
}

fn nox_tier(nox: i32) -> Tier {
    if nox <= 50 {
        Tier::Green
    } else if nox <= 100 {
        Tier::Yellow
    } else if nox <= 200 {
        Tier::Orange
    } else {
        Tier::Red
    }
}

/// Compute the demanded output percentage, `0..=100`, as the maximum
/// contribution across all enabled and valid sensor channels.
#[must_use]
pub fn evaluate(sensor_data: &SensorData, gas_warmup: bool, config: &AutoConfig) -> u8 {
    let mut demand: u8 = 0;

    let co2_valid = sensor_data.co2_valid && sensor_data.co2 > 0;
    if config.co2.enabled && co2_valid {
        demand = demand.max(band_percent(&config.co2.band, co2_tier(sensor_data.co2)));
    }

    let co_valid = sensor_data.co_sensor_present
        && sensor_data.co_valid
        && sensor_data.co_ppm.is_finite()
        && sensor_data.co_ppm >= 0.0;
    if config.co.enabled && co_valid {
        demand = demand.max(band_percent(&config.co.band, co_tier(sensor_data.co_ppm)));
    }

    let pm25_valid =
        sensor_data.pm25_valid && sensor_data.pm25.is_finite() && sensor_data.pm25 >= 0.0;
    if config.pm25.enabled && pm25_valid {
        demand = demand.max(band_percent(&config.pm25.band, pm25_tier(sensor_data.pm25)));
    }

    let voc_valid = !gas_warmup && sensor_data.voc_valid && sensor_data.voc_index >= 0;
    if config.voc.enabled && voc_valid {
        demand = demand.max(band_percent(&config.voc.band, voc_tier(sensor_data.voc_index)));
    }

    let nox_valid = !gas_warmup && sensor_data.nox_valid && sensor_data.nox_index >= 0;
    if config.nox.enabled && nox_valid {
        demand = demand.max(band_percent(&config.nox.band, nox_tier(sensor_data.nox_index)));
    }

    demand
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autoconfig::AutoConfig;

    fn config() -> AutoConfig {
        AutoConfig::default()
    }

    fn sensors() -> SensorData {
        SensorData::default()
    }

    #[test]
    fn all_invalid_yields_zero_demand() {
        assert_eq!(evaluate(&sensors(), false, &config()), 0);
    }

    #[test]
    fn co2_boundary_799_is_green() {
        let mut s = sensors();
        s.co2_valid = true;
        s.co2 = 799;
        assert_eq!(evaluate(&s, false, &config()), config().co2.band.green);
    }

    #[test]
    fn co2_boundary_800_is_yellow() {
        let mut s = sensors();
        s.co2_valid = true;
        s.co2 = 800;
        assert_eq!(evaluate(&s, false, &config()), config().co2.band.yellow);
    }

    #[test]
    fn co2_zero_is_invalid_despite_valid_flag() {
        let mut s = sensors();
        s.co2_valid = true;
        s.co2 = 0;
        assert_eq!(evaluate(&s, false, &config()), 0);
    }

    #[test]
    fn co_boundary_9_is_yellow() {
        let mut s = sensors();
        s.co_sensor_present = true;
        s.co_valid = true;
        s.co_ppm = 9.0;
        assert_eq!(evaluate(&s, false, &config()), config().co.band.yellow);
    }

    #[test]
    fn co_boundary_35_is_yellow_35_0001_is_orange() {
        let cfg = config();
        let mut s = sensors();
        s.co_sensor_present = true;
        s.co_valid = true;
        s.co_ppm = 35.0;
        assert_eq!(evaluate(&s, false, &cfg), cfg.co.band.yellow);
        s.co_ppm = 35.0001;
        assert_eq!(evaluate(&s, false, &cfg), cfg.co.band.orange);
    }

    #[test]
    fn co_without_sensor_present_is_invalid() {
        let mut s = sensors();
        s.co_valid = true;
        s.co_ppm = 200.0;
        assert_eq!(evaluate(&s, false, &config()), 0);
    }

    #[test]
    fn pm25_boundary_12_is_green_just_above_is_yellow() {
        let cfg = config();
        let mut s = sensors();
        s.pm25_valid = true;
        s.pm25 = 12.0;
        assert_eq!(evaluate(&s, false, &cfg), cfg.pm25.band.green);
        s.pm25 = 12.0001;
        assert_eq!(evaluate(&s, false, &cfg), cfg.pm25.band.yellow);
    }

    #[test]
    fn gas_warmup_zeroes_voc_and_nox_even_when_valid() {
        let mut s = sensors();
        s.voc_valid = true;
        s.voc_index = 9000;
        s.nox_valid = true;
        s.nox_index = 9000;
        assert_eq!(evaluate(&s, true, &config()), 0);
    }

    #[test]
    fn disabled_channel_contributes_nothing() {
        let mut cfg = config();
        cfg.co2.enabled = false;
        let mut s = sensors();
        s.co2_valid = true;
        s.co2 = 5000;
        assert_eq!(evaluate(&s, false, &cfg), 0);
    }

    #[test]
    fn demand_is_max_across_channels() {
        let cfg = config();
        let mut s = sensors();
        s.co2_valid = true;
        s.co2 = 1200; // orange -> cfg.co2.band.orange == 70
        s.pm25_valid = true;
        s.pm25 = 5.0; // green -> cfg.pm25.band.green == 20
        assert_eq!(evaluate(&s, false, &cfg), cfg.co2.band.orange);
    }
}
