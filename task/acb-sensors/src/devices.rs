// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One-time device init state and register configs

use crate::bsp;
use crate::descriptor::InitSlot;
use bitfield::bitfield;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

bitfield! {
    /// INA233 MFR_ADC_CONFIG
    #[derive(Copy, Clone, Eq, PartialEq)]
    pub struct Ina233AdcConfig(u16);
    impl Debug;
    pub reserved, set_reserved: 15, 12;
    pub averaging, set_averaging: 11, 9;
    pub bus_volt_time, set_bus_volt_time: 8, 6;
    pub shunt_volt_time, set_shunt_volt_time: 5, 3;
    pub operating_mode, set_operating_mode: 2, 0;
}

bitfield! {
    /// SQ52205 CONFIGURATION
    #[derive(Copy, Clone, Eq, PartialEq)]
    pub struct Sq52205Config(u16);
    impl Debug;
    pub reset, set_reset: 15;
    pub averaging, set_averaging: 11, 9;
    pub bus_volt_time, set_bus_volt_time: 8, 6;
    pub shunt_volt_time, set_shunt_volt_time: 5, 3;
    pub operating_mode, set_operating_mode: 2, 0;
}

bitfield! {
    /// ADM1272 PMON_CONFIG
    #[derive(Copy, Clone, Eq, PartialEq)]
    pub struct Adm1272PmonConfig(u16);
    impl Debug;
    pub tsfilt, set_tsfilt: 15;
    pub simultaneous, set_simultaneous: 14;
    pub pmon_mode, set_pmon_mode: 13;
    pub temp1_enable, set_temp1_enable: 12;
    pub vin_enable, set_vin_enable: 11;
    pub vout_enable, set_vout_enable: 10;
    pub i_avg, set_i_avg: 9, 8;
    pub p_avg, set_p_avg: 5, 3;
    pub v_avg, set_v_avg: 2, 0;
}

/// Continuous shunt and bus conversions, 1024-sample averaging.
pub const INA233_ADC_CONFIG: Ina233AdcConfig = Ina233AdcConfig(0x4f27);
pub const SQ52205_CONFIG: Sq52205Config = Sq52205Config(0x0f27);
pub const ADM1272_PMON_CONFIG: Adm1272PmonConfig = Adm1272PmonConfig(0x3f3f);
pub const LTC4286_MFR_CONFIG_1: u16 = 0x5572;

/// Register settings a driver applies the first time it sees a device.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum DeviceConfig {
    AdcAsd,
    Adm1272 {
        pmon: Adm1272PmonConfig,
    },
    Ltc4286 {
        r_sense_mohm: f32,
        mfr_config_1: u16,
    },
    Ina233 {
        current_lsb: f32,
        r_shunt: f32,
        adc: Ina233AdcConfig,
    },
    Sq52205 {
        current_lsb: f32,
        r_shunt: f32,
        config: Sq52205Config,
    },
    Pex89000 {
        index: u8,
    },
}

impl DeviceConfig {
    pub const fn ina233() -> Self {
        DeviceConfig::Ina233 {
            current_lsb: 0.001,
            r_shunt: 0.001,
            adc: INA233_ADC_CONFIG,
        }
    }

    pub const fn sq52205() -> Self {
        DeviceConfig::Sq52205 {
            current_lsb: 0.001,
            r_shunt: 0.001,
            config: SQ52205_CONFIG,
        }
    }

    pub const fn adm1272() -> Self {
        DeviceConfig::Adm1272 {
            pmon: ADM1272_PMON_CONFIG,
        }
    }

    pub const fn ltc4286() -> Self {
        DeviceConfig::Ltc4286 {
            r_sense_mohm: 0.3,
            mfr_config_1: LTC4286_MFR_CONFIG_1,
        }
    }
}

/// Init state of one physical device. Shared by every sensor on that
/// device; written only by whoever holds the device's bus.
#[derive(Debug)]
pub struct DeviceInitState {
    initialized: AtomicBool,
    attempts: AtomicU8,
    pub config: DeviceConfig,
}

impl DeviceInitState {
    pub const fn new(config: DeviceConfig) -> Self {
        Self {
            initialized: AtomicBool::new(false),
            attempts: AtomicU8::new(0),
            config,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    pub fn attempts(&self) -> u8 {
        self.attempts.load(Ordering::Acquire)
    }

    /// Count an init attempt; returns the number made so far.
    pub fn note_attempt(&self) -> u8 {
        self.attempts.fetch_add(1, Ordering::AcqRel).saturating_add(1)
    }
}

pub struct DeviceInitTable {
    slots: [DeviceInitState; bsp::DEVICE_INIT_COUNT],
}

impl DeviceInitTable {
    pub fn new() -> Self {
        Self {
            slots: bsp::device_init_states(),
        }
    }

    pub fn get(&self, slot: InitSlot) -> Option<&DeviceInitState> {
        let state = self.slots.get(usize::from(slot.0));
        if state.is_none() {
            log::error!("no device init slot {}", slot.0);
        }
        state
    }
}

impl Default for DeviceInitTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ina233_adc_config_fields() {
        let cfg = INA233_ADC_CONFIG;
        assert_eq!(cfg.operating_mode(), 0b111);
        assert_eq!(cfg.shunt_volt_time(), 0b100);
        assert_eq!(cfg.bus_volt_time(), 0b100);
        assert_eq!(cfg.averaging(), 0b111);
        assert_eq!(cfg.reserved(), 0b0100);
    }

    #[test]
    fn sq52205_config_fields() {
        let mut cfg = SQ52205_CONFIG;
        assert_eq!(cfg.averaging(), 0b111);
        assert!(!cfg.reset());
        cfg.set_reset(true);
        assert_eq!(cfg.0, 0x8f27);
    }

    #[test]
    fn adm1272_monitors_everything() {
        let cfg = ADM1272_PMON_CONFIG;
        assert!(cfg.temp1_enable());
        assert!(cfg.vin_enable());
        assert!(cfg.vout_enable());
        assert_eq!(cfg.i_avg(), 0b11);
    }

    #[test]
    fn attempts_accumulate() {
        let state = DeviceInitState::new(DeviceConfig::Pex89000 { index: 0 });
        assert_eq!(state.note_attempt(), 1);
        assert_eq!(state.note_attempt(), 2);
        assert_eq!(state.attempts(), 2);
        assert!(!state.is_initialized());
        state.mark_initialized();
        assert!(state.is_initialized());
    }

    #[test]
    fn out_of_range_slot() {
        let table = DeviceInitTable::new();
        assert!(table.get(InitSlot(0)).is_some());
        assert!(table.get(InitSlot(bsp::DEVICE_INIT_COUNT as u8)).is_none());
    }
}
