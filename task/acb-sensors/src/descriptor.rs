// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sensor descriptors and the per-card monitor tables
//!
//! A descriptor is static board data (where the sensor lives, how it is
//! gated, which hook family wraps its read) plus the small amount of
//! runtime state the engine and hooks share. Descriptors are built in
//! `const` context; the runtime parts are atomics and a spin mutex.

use crate::bsp;
use crate::HookError;
use bus_mutex::LockToken;
use drv_i2c_mux_core::MuxChannelConfig;
use drv_i2c_types::Controller;
use spin::Mutex;
use task_sensor_api::{DeviceType, SensorNum, SensorState};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Location {
    I2c {
        bus: Controller,
        address: u8,
        offset: u8,
    },
    Adc {
        channel: u8,
        multiplier: u16,
        divisor: u16,
    },
}

/// Predicate the engine checks before polling a sensor.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AccessGate {
    /// Powered from standby; always readable
    Standby,
    /// Needs ACB DC power
    DcOn,
}

/// Hook family wrapping a sensor's read, with that family's arguments.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SensorHook {
    None,
    /// 12 V card rail monitor behind the bus 4 mux
    PowerMonitor { mux: MuxChannelConfig, card: u8 },
    /// VR controller rail; the PMBus page to select
    VrPage(u8),
    /// PCIe switch behind a TCA9543A, initialised on first access
    PexSwitch { mux: MuxChannelConfig },
    /// Drive on an accelerator card; gated on the drive's ready bits
    DriveReady { card: u8 },
}

/// Index into the [`DeviceInitTable`](crate::devices::DeviceInitTable).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct InitSlot(pub u8);

#[derive(Debug)]
pub struct SensorDescriptor {
    pub num: SensorNum,
    pub kind: DeviceType,
    pub location: Location,
    pub access: AccessGate,
    pub hook: SensorHook,
    pub init: Option<InitSlot>,
    /// Per-card channel mux in front of this sensor, for card sensors
    pub channel_mux: Option<MuxChannelConfig>,
    pub state: SensorState,
    /// Lock taken by the pre-read hook, waiting for the post-read hook
    token: Mutex<Option<LockToken>>,
}

impl SensorDescriptor {
    pub const fn i2c(
        num: u8,
        kind: DeviceType,
        bus: Controller,
        address: u8,
        offset: u8,
        access: AccessGate,
    ) -> Self {
        Self::at(
            num,
            kind,
            Location::I2c {
                bus,
                address,
                offset,
            },
            access,
        )
    }

    pub const fn adc(
        num: u8,
        channel: u8,
        multiplier: u16,
        divisor: u16,
        access: AccessGate,
    ) -> Self {
        Self::at(
            num,
            DeviceType::AstAdc,
            Location::Adc {
                channel,
                multiplier,
                divisor,
            },
            access,
        )
    }

    const fn at(
        num: u8,
        kind: DeviceType,
        location: Location,
        access: AccessGate,
    ) -> Self {
        Self {
            num: SensorNum(num),
            kind,
            location,
            access,
            hook: SensorHook::None,
            init: None,
            channel_mux: None,
            state: SensorState::new(),
            token: Mutex::new(None),
        }
    }

    pub const fn with_hook(self, hook: SensorHook) -> Self {
        Self { hook, ..self }
    }

    pub const fn with_init(self, slot: u8) -> Self {
        Self {
            init: Some(InitSlot(slot)),
            ..self
        }
    }

    pub const fn behind(self, mux: MuxChannelConfig) -> Self {
        Self {
            channel_mux: Some(mux),
            ..self
        }
    }

    /// Bus and address of an I2C sensor.
    pub fn i2c_target(&self) -> Result<(Controller, u8), HookError> {
        match self.location {
            Location::I2c { bus, address, .. } => Ok((bus, address)),
            Location::Adc { .. } => {
                log::error!("sensor {:#04x} is not on I2C", self.num.0);
                Err(HookError::NotI2c)
            }
        }
    }

    pub fn address(&self) -> Option<u8> {
        match self.location {
            Location::I2c { address, .. } => Some(address),
            Location::Adc { .. } => None,
        }
    }

    /// Returns whatever token was already parked, which means a read was
    /// never finished.
    pub(crate) fn stash_token(&self, token: LockToken) -> Option<LockToken> {
        self.token.lock().replace(token)
    }

    pub(crate) fn take_token(&self) -> Option<LockToken> {
        self.token.lock().take()
    }

    pub fn holds_lock(&self) -> bool {
        self.token.lock().is_some()
    }
}

/// Sensors of one accelerator card, polled as a group behind the card's
/// two-level mux.
#[derive(Debug)]
pub struct MonitorTable {
    pub name: &'static str,
    pub card: u8,
    pub sensors: [SensorDescriptor; bsp::ACCL_SENSOR_COUNT],
}

impl MonitorTable {
    pub fn sensor(&self, num: SensorNum) -> Option<&SensorDescriptor> {
        self.sensors.iter().find(|s| s.num == num)
    }
}

/// One [`MonitorTable`] per card slot.
#[derive(Debug)]
pub struct AcclTables {
    tables: [MonitorTable; bsp::CARD_COUNT],
}

impl AcclTables {
    pub fn new() -> Self {
        Self {
            tables: core::array::from_fn(|card| {
                // CARD_COUNT fits in a u8; checked in bsp
                let card = card as u8;
                MonitorTable {
                    name: bsp::ACCL_TABLE_NAMES[usize::from(card)],
                    card,
                    sensors: bsp::accl_sensor_table(card),
                }
            }),
        }
    }

    /// The monitor table for `card`.
    pub fn table(&self, card: u8) -> Option<&MonitorTable> {
        let table = self.tables.get(usize::from(card));
        if table.is_none() {
            log::error!("no sensor table for card {:#04x}", card);
        }
        table
    }

    pub fn iter(&self) -> impl Iterator<Item = &MonitorTable> {
        self.tables.iter()
    }

    /// A card sensor's descriptor.
    pub fn sensor(
        &self,
        card: u8,
        num: SensorNum,
    ) -> Result<&SensorDescriptor, HookError> {
        let table = self.table(card).ok_or(HookError::BadCard(card))?;
        table.sensor(num).ok_or_else(|| {
            log::error!("sensor {:#04x} not in card {} table", num.0, card);
            HookError::UnknownSensor(num.0)
        })
    }

    /// The inner (per-card) mux path for a card sensor, reached through
    /// the card's bus.
    pub fn mux_channel_config(
        &self,
        card: u8,
        num: SensorNum,
    ) -> Result<MuxChannelConfig, HookError> {
        let bus = bsp::accl_bus(card).ok_or(HookError::BadCard(card))?;
        let sensor = self.sensor(card, num)?;
        sensor
            .channel_mux
            .map(|mux| mux.on_bus(bus))
            .ok_or_else(|| {
                log::error!("card sensor {:#04x} has no channel mux", num.0);
                HookError::UnknownSensor(num.0)
            })
    }
}

impl Default for AcclTables {
    fn default() -> Self {
        Self::new()
    }
}
