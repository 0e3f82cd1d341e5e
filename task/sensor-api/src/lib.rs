// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Types shared by the sensor polling engine and platform hooks.

#![no_std]

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use drv_i2c_types::ResponseCode;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use zerocopy_derive::{FromBytes, Immutable, IntoBytes};

/// Platform sensor number, as reported over IPMI/PLDM.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, IntoBytes, FromBytes, Immutable,
)]
#[repr(transparent)]
pub struct SensorNum(pub u8);

impl From<u8> for SensorNum {
    fn from(num: u8) -> Self {
        SensorNum(num)
    }
}

impl From<SensorNum> for u8 {
    fn from(num: SensorNum) -> Self {
        num.0
    }
}

/// Last outcome recorded for a sensor, which also decides whether the
/// engine keeps polling it.
#[derive(Copy, Clone, Debug, FromPrimitive, Eq, PartialEq)]
#[repr(u8)]
pub enum CacheStatus {
    ReadSuccess = 0,
    NotFound = 1,
    NotAccessible = 2,
    FailToAccess = 3,
    Init = 4,
    UnspecifiedError = 5,
    PollingDisabled = 6,
    PreReadError = 7,
    PostReadError = 8,
    NotPresent = 9,
}

/// Runtime state the engine and hooks share for one sensor. Lives inside
/// the (static) sensor descriptor, so it is built in a `const` context and
/// mutated through atomics.
#[derive(Debug)]
pub struct SensorState {
    cache: AtomicU8,
    polling: AtomicBool,
}

impl SensorState {
    pub const fn new() -> Self {
        Self {
            cache: AtomicU8::new(CacheStatus::Init as u8),
            polling: AtomicBool::new(true),
        }
    }

    pub fn cache_status(&self) -> CacheStatus {
        CacheStatus::from_u8(self.cache.load(Ordering::Acquire))
            .unwrap_or(CacheStatus::UnspecifiedError)
    }

    pub fn set_cache_status(&self, status: CacheStatus) {
        self.cache.store(status as u8, Ordering::Release);
    }

    /// Replace `from` with `to`, leaving any other status alone. Returns
    /// whether the swap happened.
    pub fn swap_cache_status(&self, from: CacheStatus, to: CacheStatus) -> bool {
        self.cache
            .compare_exchange(
                from as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn polling_enabled(&self) -> bool {
        self.polling.load(Ordering::Acquire)
    }

    pub fn set_polling(&self, enabled: bool) {
        self.polling.store(enabled, Ordering::Release);
    }
}

impl Default for SensorState {
    fn default() -> Self {
        Self::new()
    }
}

/// Successful outcome of a pre-read hook.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReadAction {
    /// Issue the bus transaction.
    Proceed,
    /// Device is not ready; skip the transaction this cycle. Not an error.
    Skip,
}

#[derive(Copy, Clone, Debug, FromPrimitive, Eq, PartialEq)]
#[repr(u8)]
pub enum NoData {
    DeviceOff = 0,
    DeviceError = 1,
    DeviceNotPresent = 2,
    DeviceUnavailable = 3,
    DeviceTimeout = 4,
}

impl From<ResponseCode> for NoData {
    fn from(code: ResponseCode) -> NoData {
        match code {
            ResponseCode::NoDevice | ResponseCode::MuxMissing => {
                NoData::DeviceNotPresent
            }
            ResponseCode::NoRegister => NoData::DeviceUnavailable,
            ResponseCode::BusLocked
            | ResponseCode::BusLockedMux
            | ResponseCode::ControllerBusy => NoData::DeviceTimeout,
            _ => NoData::DeviceError,
        }
    }
}

/// What the engine hands to a post-read hook.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Reading {
    /// Raw little-endian register value
    Value(u32),
    /// The transaction was skipped at the hook's request
    Skipped,
    NoData(NoData),
}

impl Reading {
    pub fn from_le_bytes(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 4];
        let n = bytes.len().min(raw.len());
        raw[..n].copy_from_slice(&bytes[..n]);
        Reading::Value(u32::from_le_bytes(raw))
    }
}

/// Sensor chip families on this platform.
#[derive(Copy, Clone, Debug, FromPrimitive, Eq, PartialEq)]
#[repr(u8)]
pub enum DeviceType {
    Tmp75 = 0,
    Lm75bd118,
    AstAdc,
    Xdpe15284,
    Pex89000,
    Sq52205,
    Ina233,
    Nvme,
    Adm1272,
    Ltc4286,
    Q50sn120a1,
    Bmr351,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_starts_in_init_with_polling_on() {
        let state = SensorState::new();
        assert_eq!(state.cache_status(), CacheStatus::Init);
        assert!(state.polling_enabled());
    }

    #[test]
    fn swap_only_replaces_expected_status() {
        let state = SensorState::new();
        state.set_cache_status(CacheStatus::NotPresent);
        assert!(!state.swap_cache_status(CacheStatus::PollingDisabled, CacheStatus::Init));
        assert_eq!(state.cache_status(), CacheStatus::NotPresent);
        assert!(state.swap_cache_status(CacheStatus::NotPresent, CacheStatus::Init));
        assert_eq!(state.cache_status(), CacheStatus::Init);
    }

    #[test]
    fn bus_errors_map_to_no_data() {
        assert_eq!(NoData::from(ResponseCode::MuxMissing), NoData::DeviceNotPresent);
        assert_eq!(NoData::from(ResponseCode::BusLockedMux), NoData::DeviceTimeout);
        assert_eq!(NoData::from(ResponseCode::BadResponse), NoData::DeviceError);
    }

    #[test]
    fn short_reads_are_zero_extended() {
        assert_eq!(Reading::from_le_bytes(&[0x34, 0x12]), Reading::Value(0x1234));
        assert_eq!(Reading::from_le_bytes(&[]), Reading::Value(0));
    }
}
