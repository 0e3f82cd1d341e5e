// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The read contract, as the polling engine drives it
//!
//! gate, then (table pre), sensor pre, transaction unless skipped, sensor
//! post, (table post). A failed pre-read is not followed by its post-read;
//! a skipped read still runs post-read.

use crate::descriptor::{Location, MonitorTable, SensorDescriptor};
use crate::{Board, ErrorClass, Platform};
use bus_mutex::RawBusMutex;
use drv_i2c_types::{I2cHardware, ResponseCode};
use task_sensor_api::{CacheStatus, NoData, ReadAction, Reading};

impl<H, M, B> Platform<'_, H, M, B>
where
    H: I2cHardware + ?Sized,
    M: RawBusMutex,
    B: Board + ?Sized,
{
    /// One poll of one sensor.
    pub fn read_sensor(&self, desc: &SensorDescriptor) -> Reading {
        if !desc.state.polling_enabled() {
            return Reading::NoData(NoData::DeviceUnavailable);
        }
        if desc.state.cache_status() == CacheStatus::NotPresent {
            return Reading::NoData(NoData::DeviceNotPresent);
        }
        if !self.is_accessible(desc) {
            desc.state.set_cache_status(CacheStatus::NotAccessible);
            return Reading::NoData(NoData::DeviceOff);
        }

        let action = match self.pre_read(desc) {
            Ok(action) => action,
            Err(err) => {
                if err.class() != ErrorClass::Transient {
                    desc.state.set_cache_status(CacheStatus::PreReadError);
                }
                return Reading::NoData(err.into());
            }
        };

        let reading = match action {
            ReadAction::Skip => Reading::Skipped,
            ReadAction::Proceed => self.transact(desc),
        };

        if self.post_read(desc, &reading).is_err() {
            desc.state.set_cache_status(CacheStatus::PostReadError);
        } else if let Reading::Value(_) = reading {
            desc.state.set_cache_status(CacheStatus::ReadSuccess);
        }
        reading
    }

    fn transact(&self, desc: &SensorDescriptor) -> Reading {
        match desc.location {
            Location::I2c {
                bus,
                address,
                offset,
            } => {
                let mut raw = [0u8; 2];
                match self.i2c.write_read(bus, address, &[offset], &mut raw) {
                    Ok(n) => Reading::from_le_bytes(&raw[..n.min(raw.len())]),
                    Err(err) => {
                        let code: ResponseCode = err.into();
                        log::error!(
                            "sensor {:#04x} read failed: {:?}",
                            desc.num.0,
                            code
                        );
                        desc.state.set_cache_status(CacheStatus::FailToAccess);
                        Reading::NoData(code.into())
                    }
                }
            }
            Location::Adc {
                channel,
                multiplier,
                divisor,
            } => match self.board.read_adc(channel) {
                Ok(raw) => {
                    let scaled = u32::from(raw) * u32::from(multiplier)
                        / u32::from(divisor.max(1));
                    Reading::Value(scaled)
                }
                Err(why) => {
                    desc.state.set_cache_status(CacheStatus::FailToAccess);
                    Reading::NoData(why)
                }
            },
        }
    }

    /// One poll of a card sensor, under the card's two-level mux switch.
    pub fn read_monitored_sensor(
        &self,
        table: &MonitorTable,
        desc: &SensorDescriptor,
    ) -> Reading {
        if let Err(err) = self.pre_card_mux_switch(desc.num, table.card) {
            desc.state.set_cache_status(CacheStatus::PreReadError);
            return Reading::NoData(err.into());
        }
        let reading = self.read_sensor(desc);
        if self.post_card_mux_switch(table.card).is_err() {
            desc.state.set_cache_status(CacheStatus::PostReadError);
        }
        reading
    }

    /// Poll every sensor of a card, if the card's gate allows it. Returns
    /// whether the table was polled.
    pub fn poll_monitor_table(
        &self,
        table: &MonitorTable,
        mut report: impl FnMut(&SensorDescriptor, Reading),
    ) -> bool {
        if !self.is_pcie_device_access(table.card) {
            return false;
        }
        for desc in &table.sensors {
            report(desc, self.read_monitored_sensor(table, desc));
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsp;
    use crate::descriptor::SensorHook;
    use crate::nvme;
    use crate::test_support::Rig;
    use core::sync::atomic::Ordering;
    use drv_i2c_types::Controller;
    use std::sync::Arc;
    use std::thread;
    use task_sensor_api::SensorNum;

    fn find(table: &bsp::SensorTable, num: u8) -> &SensorDescriptor {
        table.iter().find(|s| s.num.0 == num).unwrap()
    }

    #[test]
    fn plain_sensor_reads_register() {
        let rig = Rig::new();
        let p = rig.platform();
        let table = bsp::base_sensor_table();
        rig.i2c.set_register(
            Controller::I2C2,
            bsp::TMP75_IN_ADDR,
            0,
            &[0x19, 0x00],
        );
        let tmp75 = find(&table, bsp::SENSOR_NUM_TEMP_TMP75_IN);

        assert_eq!(p.read_sensor(tmp75), Reading::Value(0x19));
        assert_eq!(tmp75.state.cache_status(), CacheStatus::ReadSuccess);
        assert_eq!(rig.total_acquired(), 0);
    }

    #[test]
    fn adc_reading_is_scaled() {
        let rig = Rig::new();
        let p = rig.platform();
        let table = bsp::base_sensor_table();
        // Channel 7 reads 700, scaled by 711/200
        let p5v = find(&table, bsp::SENSOR_NUM_VOL_P5V_AUX);
        assert_eq!(p.read_sensor(p5v), Reading::Value(700 * 711 / 200));
    }

    #[test]
    fn gated_sensor_is_not_touched() {
        let rig = Rig::new();
        let p = rig.platform();
        let table = bsp::base_sensor_table();
        rig.board.power_good.store(false, Ordering::Relaxed);
        let vr = find(&table, bsp::SENSOR_NUM_VOL_P0V8_VDD_1);

        assert_eq!(p.read_sensor(vr), Reading::NoData(NoData::DeviceOff));
        assert_eq!(vr.state.cache_status(), CacheStatus::NotAccessible);
        assert_eq!(rig.i2c.transaction_count(), 0);
    }

    #[test]
    fn failed_pre_read_skips_post_read() {
        let rig = Rig::new();
        let p = rig.platform();
        let table = bsp::base_sensor_table();
        let vr = find(&table, bsp::SENSOR_NUM_TEMP_P0V8_VDD_2);

        assert_eq!(
            p.read_sensor(vr),
            Reading::NoData(NoData::DeviceNotPresent)
        );
        assert_eq!(vr.state.cache_status(), CacheStatus::PreReadError);
        let lock = rig.locks.mutex_for_bus(Controller::I2C1).unwrap();
        assert_eq!(lock.stats().released, 1);
        assert_eq!(lock.stats().rejected, 0);
    }

    #[test]
    fn transaction_failure_still_releases() {
        let rig = Rig::new();
        let p = rig.platform();
        let table = bsp::base_sensor_table();
        let pex = find(&table, bsp::SENSOR_NUM_TEMP_PEX_1);

        // The mux answers, the switch behind it doesn't
        assert_eq!(
            p.read_sensor(pex),
            Reading::NoData(NoData::DeviceNotPresent)
        );
        assert_eq!(pex.state.cache_status(), CacheStatus::FailToAccess);
        assert!(!pex.holds_lock());
        assert_eq!(rig.outstanding_locks(), 0);
    }

    #[test]
    fn card_sensors_poll_through_the_switch() {
        let rig = Rig::new();
        let p = rig.platform();
        rig.fleet.set_present(1, true, [true, true]);
        rig.i2c.set_register(
            bsp::CPLD_BUS,
            bsp::CPLD_ADDR,
            bsp::CPLD_ACCL_1_6_POWER_GOOD_REG,
            &[0b10],
        );
        for addr in [0x6a, 0x6b] {
            rig.i2c.set_register(
                Controller::I2C8,
                addr,
                0,
                &[6, 0, 0, 30, 0, 0, 0, 0],
            );
            rig.i2c.set_register(
                Controller::I2C8,
                addr,
                nvme::FIRMWARE_INFO_OFFSET,
                &[0, 0xff],
            );
        }
        for addr in [
            bsp::ACCL_P12V_EFUSE_ADDR,
            bsp::ACCL_P3V3_1_ADDR,
            bsp::ACCL_P3V3_2_ADDR,
        ] {
            rig.i2c.add_device(Controller::I2C8, addr);
        }

        let table = rig.accl.table(1).unwrap();
        let mut results = Vec::new();
        assert!(p.poll_monitor_table(table, |desc, reading| {
            results.push((desc.num, reading))
        }));

        assert_eq!(results.len(), bsp::ACCL_SENSOR_COUNT);
        assert!(results
            .iter()
            .all(|(_, reading)| matches!(reading, Reading::Value(_))));
        assert_eq!(rig.outstanding_locks(), 0);
        assert_eq!(
            results[0],
            (SensorNum(bsp::SENSOR_NUM_TEMP_ACCL_DRIVE_1), Reading::Value(6))
        );
    }

    #[test]
    fn cold_drive_is_skipped_not_failed() {
        let rig = Rig::new();
        let p = rig.platform();
        rig.i2c.set_register(
            Controller::I2C8,
            0x6a,
            0,
            &[6, 0, 0, 0, 0, 0, 0, 0],
        );
        let table = rig.accl.table(0).unwrap();
        let drive = table
            .sensor(SensorNum(bsp::SENSOR_NUM_TEMP_ACCL_DRIVE_1))
            .unwrap();

        assert_eq!(p.read_monitored_sensor(table, drive), Reading::Skipped);
        assert_eq!(drive.state.cache_status(), CacheStatus::PollingDisabled);
        assert_eq!(rig.outstanding_locks(), 0);
    }

    #[test]
    fn absent_card_monitor_disables_polling() {
        let rig = Rig::new();
        let p = rig.platform();
        let table = bsp::base_sensor_table();
        let monitor = table
            .iter()
            .find(|s| matches!(s.hook, SensorHook::PowerMonitor { card: 3, .. }))
            .unwrap();

        assert_eq!(
            p.read_sensor(monitor),
            Reading::NoData(NoData::DeviceNotPresent)
        );
        assert_eq!(
            p.read_sensor(monitor),
            Reading::NoData(NoData::DeviceUnavailable)
        );
        assert_eq!(rig.total_acquired(), 0);
    }

    #[test]
    fn no_leaked_locks_after_many_cycles() {
        let rig = Arc::new(Rig::new());
        for card in [0u8, 5, 6, 11] {
            rig.fleet.set_present(card, true, [true, true]);
        }
        rig.i2c.add_device(Controller::I2C1, bsp::XDPE15284_ADDR);
        // Every so often the bus 4 mux drops out
        rig.i2c.fail_device(Controller::I2C4, 0x70, 7);

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let rig = Arc::clone(&rig);
                thread::spawn(move || {
                    let mut p = rig.platform();
                    p.config.lock_timeout_ms = 10_000;
                    let table = bsp::base_sensor_table();
                    for _ in 0..20 {
                        for desc in table.iter() {
                            let _ = p.read_sensor(desc);
                        }
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        assert_eq!(rig.outstanding_locks(), 0);
        assert!(rig.locks.iter().all(|l| !l.is_locked()));
        assert!(rig.locks.iter().all(|l| l.stats().rejected == 0));
    }
}
