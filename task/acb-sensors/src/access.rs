// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Access gates: whether a sensor can be polled right now

use crate::bsp::{self, BoardRevision};
use crate::descriptor::{AccessGate, SensorDescriptor};
use crate::{Board, Platform};
use bus_mutex::RawBusMutex;
use drv_i2c_types::{read_reg_with_retry, I2cHardware};
use num_traits::FromPrimitive;
use task_sensor_api::{CacheStatus, SensorNum};

/// Standby-powered sensors are always readable.
pub fn stby_access(_desc: &SensorDescriptor) -> bool {
    true
}

impl<H, M, B> Platform<'_, H, M, B>
where
    H: I2cHardware + ?Sized,
    M: RawBusMutex,
    B: Board + ?Sized,
{
    pub fn is_accessible(&self, desc: &SensorDescriptor) -> bool {
        match desc.access {
            AccessGate::Standby => stby_access(desc),
            AccessGate::DcOn => self.is_dc_access(desc),
        }
    }

    pub fn is_dc_access(&self, _desc: &SensorDescriptor) -> bool {
        self.is_acb_power_good()
    }

    /// Early boards don't latch the power-good flag, so it's refreshed
    /// from the CPLD on every check.
    pub fn is_acb_power_good(&self) -> bool {
        let revision = self.board.board_revision();
        match BoardRevision::from_u8(revision) {
            Some(BoardRevision::Poc | BoardRevision::Evt1) => {
                if !self.board.refresh_acb_power_status() {
                    log::error!("failed to refresh acb power status");
                    return false;
                }
                self.board.acb_power_good_flag()
            }
            Some(
                BoardRevision::Evt2
                | BoardRevision::Dvt
                | BoardRevision::Pvt
                | BoardRevision::Mp,
            ) => self.board.acb_power_good_flag(),
            None => {
                log::error!("unknown board revision {:#04x}", revision);
                false
            }
        }
    }

    /// Card power-good bit from the CPLD. A failed read counts as not good.
    pub fn is_accl_power_good(&self, card: u8) -> bool {
        let (reg, bit) = match card {
            0..=5 => (bsp::CPLD_ACCL_1_6_POWER_GOOD_REG, card),
            6..=11 => (
                bsp::CPLD_ACCL_7_12_POWER_GOOD_REG,
                card - bsp::CARDS_PER_POWER_GOOD_REG,
            ),
            _ => {
                log::error!("invalid accl card id: {:#04x}", card);
                return false;
            }
        };

        let mut value = [0u8];
        match read_reg_with_retry(
            self.i2c,
            bsp::CPLD_BUS,
            bsp::CPLD_ADDR,
            reg,
            &mut value,
            self.config.cpld_retries,
        ) {
            Ok(_) => value[0] & (1 << bit) != 0,
            Err(code) => {
                log::error!(
                    "cpld power good read {:#04x} failed: {:?}",
                    reg,
                    code
                );
                false
            }
        }
    }

    /// Gate for a card's monitor table. On the first pass with the card
    /// powered, every card sensor is initialised; the card only counts as
    /// initialised when all of them succeed.
    pub fn is_pcie_device_access(&self, card: u8) -> bool {
        let Some(table) = self.accl.table(card) else {
            return false;
        };
        if !self.fleet.is_present(card) {
            return false;
        }

        if !self.is_accl_power_good(card) {
            for desc in &table.sensors {
                desc.state.set_cache_status(CacheStatus::NotAccessible);
            }
            self.fleet.set_initialized(card, false);
            return false;
        }

        if !self.fleet.is_initialized(card) {
            let all_ok = table
                .sensors
                .iter()
                .all(|desc| self.init_card_sensor(card, desc));
            if all_ok {
                self.fleet.set_initialized(card, true);
            }
        }

        let asic = self.fleet.asic_presence(card);
        for (num, drive) in bsp::ACCL_DRIVE_SENSORS {
            let Some(desc) = table.sensor(SensorNum(num)) else {
                continue;
            };
            if asic[drive] {
                desc.state
                    .swap_cache_status(CacheStatus::NotPresent, CacheStatus::Init);
            } else {
                desc.state.set_cache_status(CacheStatus::NotPresent);
            }
        }

        true
    }

    fn init_card_sensor(&self, card: u8, desc: &SensorDescriptor) -> bool {
        let init = desc.init.and_then(|slot| self.devices.get(slot));
        if init.is_some_and(|i| i.is_initialized()) {
            return true;
        }

        if self.pre_card_mux_switch(desc.num, card).is_err() {
            return false;
        }
        let ok = self.board.init_sensor(desc, init);
        if ok {
            if let Some(init) = init {
                init.mark_initialized();
            }
        } else {
            log::error!("card {} sensor {:#04x} init failed", card, desc.num.0);
        }
        self.post_card_mux_switch(card).is_ok() && ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Rig;
    use core::sync::atomic::Ordering;
    use drv_i2c_types::Controller;

    fn set_power_good(rig: &Rig, reg: u8, bits: u8) {
        rig.i2c
            .set_register(bsp::CPLD_BUS, bsp::CPLD_ADDR, reg, &[bits]);
    }

    #[test]
    fn acb_power_by_revision() {
        let rig = Rig::new();
        let p = rig.platform();
        assert!(p.is_acb_power_good());

        rig.board
            .revision
            .store(BoardRevision::Evt1 as u8, Ordering::Relaxed);
        rig.board.power_status_ok.store(false, Ordering::Relaxed);
        assert!(!p.is_acb_power_good());

        // Later revisions use the flag as is
        rig.board
            .revision
            .store(BoardRevision::Mp as u8, Ordering::Relaxed);
        assert!(p.is_acb_power_good());

        rig.board.revision.store(0x40, Ordering::Relaxed);
        assert!(!p.is_acb_power_good());
    }

    #[test]
    fn dc_gate_follows_power() {
        let rig = Rig::new();
        let p = rig.platform();
        let table = bsp::base_sensor_table();
        let pex = table
            .iter()
            .find(|s| s.num.0 == bsp::SENSOR_NUM_TEMP_PEX_1)
            .unwrap();
        let tmp75 = &table[0];

        rig.board.power_good.store(false, Ordering::Relaxed);
        assert!(!p.is_accessible(pex));
        assert!(p.is_accessible(tmp75));
    }

    #[test]
    fn card_power_good_bits() {
        let rig = Rig::new();
        let p = rig.platform();
        set_power_good(&rig, bsp::CPLD_ACCL_1_6_POWER_GOOD_REG, 0b0000_0100);
        set_power_good(&rig, bsp::CPLD_ACCL_7_12_POWER_GOOD_REG, 0b0010_0000);

        assert!(p.is_accl_power_good(2));
        assert!(!p.is_accl_power_good(3));
        assert!(p.is_accl_power_good(11));
        assert!(!p.is_accl_power_good(6));
        assert!(!p.is_accl_power_good(12));
    }

    #[test]
    fn cpld_read_failure_is_not_good() {
        let rig = Rig::new();
        let p = rig.platform();
        assert!(!p.is_accl_power_good(0));
        assert_eq!(rig.i2c.transaction_count(), 5);
    }

    #[test]
    fn unpowered_card_is_not_accessible() {
        let rig = Rig::new();
        let p = rig.platform();
        rig.fleet.set_present(4, true, [true, true]);
        rig.fleet.set_initialized(4, true);
        set_power_good(&rig, bsp::CPLD_ACCL_1_6_POWER_GOOD_REG, 0);

        assert!(!p.is_pcie_device_access(4));
        assert!(!rig.fleet.is_initialized(4));
        let table = rig.accl.table(4).unwrap();
        assert!(table
            .sensors
            .iter()
            .all(|s| s.state.cache_status() == CacheStatus::NotAccessible));
    }

    #[test]
    fn absent_or_bad_card_is_not_accessible() {
        let rig = Rig::new();
        let p = rig.platform();
        assert!(!p.is_pcie_device_access(0));
        assert!(!p.is_pcie_device_access(30));
        assert_eq!(rig.i2c.transaction_count(), 0);
    }

    #[test]
    fn first_powered_pass_initialises_card() {
        let rig = Rig::new();
        let p = rig.platform();
        rig.fleet.set_present(9, true, [true, false]);
        set_power_good(&rig, bsp::CPLD_ACCL_7_12_POWER_GOOD_REG, 1 << 3);

        assert!(p.is_pcie_device_access(9));
        assert!(rig.fleet.is_initialized(9));
        // Each drive sensor, then one per rail monitor; the other readings
        // of a monitor share its init state
        let calls = rig.board.init_calls.load(Ordering::Relaxed);
        assert_eq!(calls, 6 + 3);
        assert_eq!(rig.outstanding_locks(), 0);
        let bus = rig.locks.mutex_for_bus(Controller::I2C7).unwrap();
        assert_eq!(bus.stats().acquired, calls);

        // Drive 2's ASIC is missing
        let table = rig.accl.table(9).unwrap();
        let drive2 = table
            .sensor(SensorNum(bsp::SENSOR_NUM_TEMP_ACCL_DRIVE_2))
            .unwrap();
        assert_eq!(drive2.state.cache_status(), CacheStatus::NotPresent);

        // Second pass doesn't re-run init; the ASIC coming back restores
        // its drive sensors
        rig.fleet.set_present(9, true, [true, true]);
        assert!(p.is_pcie_device_access(9));
        assert_eq!(rig.board.init_calls.load(Ordering::Relaxed), calls);
        assert_eq!(drive2.state.cache_status(), CacheStatus::Init);
    }

    #[test]
    fn failed_init_is_retried_next_pass() {
        let rig = Rig::new();
        let p = rig.platform();
        rig.fleet.set_present(0, true, [true, true]);
        set_power_good(&rig, bsp::CPLD_ACCL_1_6_POWER_GOOD_REG, 1);
        rig.board.init_ok.store(false, Ordering::Relaxed);

        assert!(p.is_pcie_device_access(0));
        assert!(!rig.fleet.is_initialized(0));
        assert_eq!(rig.outstanding_locks(), 0);

        rig.board.init_ok.store(true, Ordering::Relaxed);
        assert!(p.is_pcie_device_access(0));
        assert!(rig.fleet.is_initialized(0));
    }
}
