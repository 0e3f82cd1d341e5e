// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sensors of the accelerator carrier board (ACB)
//!
//! The board's sensor tables, and the pre-/post-read hooks that make the
//! shared I2C topology safe to poll from more than one context: anything
//! behind a mux is read with that bus's lock held, from the mux select in
//! the pre-read hook to the release in the post-read hook.
//!
//! Everything a hook touches is reached through [`Platform`], which borrows
//! the bus locks, the card fleet state, and the device init table. Nothing
//! in here is a process-wide singleton; the firmware image owns one of each
//! and hands out references.

#![cfg_attr(not(test), no_std)]

pub mod access;
pub mod bsp;
pub mod cycle;
pub mod descriptor;
pub mod devices;
pub mod fleet;
pub mod hooks;
pub mod nvme;

use bus_mutex::{BusMutexRegistry, LockError, LockToken, RawBusMutex};
use descriptor::{AcclTables, SensorDescriptor};
use devices::{DeviceInitState, DeviceInitTable};
use drv_i2c_types::{Controller, ResponseCode};
use fleet::FleetState;
use task_sensor_api::{NoData, ReadAction};

/// Bus locks for every bus on this board that fronts a mux.
pub type BusLocks<M> = BusMutexRegistry<M, { bsp::LOCKED_BUS_COUNT }>;

/// Result of a pre-read hook.
pub type HookResult = Result<ReadAction, HookError>;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HookConfig {
    /// How long a hook waits for a bus lock
    pub lock_timeout_ms: u32,
    pub mux_retries: u8,
    /// PMBus PAGE write retries for the VR controller
    pub vr_page_retries: u8,
    /// Device init attempts before a PEX switch is given up on
    pub pex_init_attempts: u8,
    pub cpld_retries: u8,
    pub drive_retries: u8,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 1000,
            mux_retries: 5,
            vr_page_retries: 3,
            pex_init_attempts: 3,
            cpld_retries: 5,
            drive_retries: 3,
        }
    }
}

/// Board services the hooks depend on but don't implement: power and
/// revision state from the board class code, and the sensor drivers.
pub trait Board {
    fn board_revision(&self) -> u8;

    /// Re-read the ACB power status from the CPLD. `false` if the read
    /// failed.
    fn refresh_acb_power_status(&self) -> bool;

    fn acb_power_good_flag(&self) -> bool;

    fn hsc_module(&self) -> u8;

    fn power_brick_module(&self) -> u8;

    /// Program the device behind `desc` (the driver's delayed init).
    /// Returns `true` once the device is usable; the caller records that
    /// in `init`.
    fn init_sensor(
        &self,
        desc: &SensorDescriptor,
        init: Option<&DeviceInitState>,
    ) -> bool;

    /// Sample an ADC channel.
    fn read_adc(&self, channel: u8) -> Result<u16, NoData>;
}

/// Where in the error taxonomy a hook failure falls. This decides how loud
/// the failure is and what the engine does with the sensor.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    /// Board tables are wrong; retrying won't help
    Configuration,
    /// Lost a race for a bus lock; try again next cycle
    Contention,
    /// Device is not ready yet
    Transient,
    /// Device answered, but not in a way we can use
    Protocol,
    /// The bus transaction itself failed after retries
    Bus,
    /// Sensor is unreachable by design right now (absent card, DC off)
    Gated,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HookError {
    CardAbsent(u8),
    PowerOff,
    NoBusLock(Controller),
    LockTimeout(Controller),
    MuxSelect(ResponseCode),
    PageSelect(ResponseCode),
    DeviceInit,
    InitRetriesExhausted,
    Bus(ResponseCode),
    UnknownDevice(u8),
    BadCard(u8),
    UnknownSensor(u8),
    /// Hook attached to a sensor that isn't on an I2C bus
    NotI2c,
    /// Descriptor needs an init slot that the table doesn't provide
    NoInitState,
    DriveNotReady,
    Unlock(LockError),
}

impl HookError {
    pub fn class(self) -> ErrorClass {
        match self {
            HookError::NoBusLock(_)
            | HookError::BadCard(_)
            | HookError::UnknownSensor(_)
            | HookError::NotI2c
            | HookError::NoInitState => ErrorClass::Configuration,
            HookError::LockTimeout(_) | HookError::Unlock(_) => {
                ErrorClass::Contention
            }
            HookError::DriveNotReady => ErrorClass::Transient,
            HookError::UnknownDevice(_)
            | HookError::DeviceInit
            | HookError::InitRetriesExhausted => ErrorClass::Protocol,
            HookError::MuxSelect(_)
            | HookError::PageSelect(_)
            | HookError::Bus(_) => ErrorClass::Bus,
            HookError::CardAbsent(_) | HookError::PowerOff => ErrorClass::Gated,
        }
    }
}

impl From<HookError> for NoData {
    fn from(err: HookError) -> NoData {
        match err {
            HookError::CardAbsent(_) => NoData::DeviceNotPresent,
            HookError::PowerOff => NoData::DeviceOff,
            HookError::LockTimeout(_) => NoData::DeviceTimeout,
            HookError::DriveNotReady => NoData::DeviceUnavailable,
            HookError::MuxSelect(code)
            | HookError::PageSelect(code)
            | HookError::Bus(code) => code.into(),
            _ => NoData::DeviceError,
        }
    }
}

/// Everything a hook needs, borrowed from whoever owns it.
pub struct Platform<'a, H: ?Sized, M, B: ?Sized> {
    pub i2c: &'a H,
    pub locks: &'a BusLocks<M>,
    pub fleet: &'a FleetState,
    pub devices: &'a DeviceInitTable,
    pub accl: &'a AcclTables,
    pub board: &'a B,
    pub config: HookConfig,
}

impl<H: ?Sized, M: RawBusMutex, B: ?Sized> Platform<'_, H, M, B> {
    /// Take the lock for `bus`. A bus without a lock is a table error.
    pub(crate) fn lock_bus(
        &self,
        bus: Controller,
    ) -> Result<LockToken, HookError> {
        let Some(lock) = self.locks.mutex_for_bus(bus) else {
            log::error!("no mux lock for bus {:?}", bus);
            return Err(HookError::NoBusLock(bus));
        };
        lock.acquire(self.config.lock_timeout_ms)
            .map_err(|err| match err {
                LockError::Timeout => HookError::LockTimeout(bus),
                err => HookError::Unlock(err),
            })
    }

    pub(crate) fn unlock_bus(&self, token: LockToken) -> Result<(), HookError> {
        self.locks.release(token).map_err(|err| {
            log::error!("bus unlock failed: {:?}", err);
            HookError::Unlock(err)
        })
    }

    /// Park a lock in the descriptor until its post-read hook runs.
    pub(crate) fn hold(&self, desc: &SensorDescriptor, token: LockToken) {
        if let Some(stale) = desc.stash_token(token) {
            log::warn!(
                "sensor {:#04x}: previous read never released its lock",
                desc.num.0
            );
            let _ = self.unlock_bus(stale);
        }
    }
}
