// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Board topology: buses, addresses, muxes and sensor tables

use crate::descriptor::{AccessGate, SensorDescriptor, SensorHook};
use crate::devices::{DeviceConfig, DeviceInitState};
use crate::{Board, BusLocks};
use bus_mutex::{BusMutex, BusMutexRegistry, RawBusMutex};
use drv_i2c_mux_core::{MuxChannelConfig, MuxKind};
use drv_i2c_types::{Controller, Segment};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use static_assertions::const_assert;
use task_sensor_api::DeviceType;

#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(u8)]
pub enum BoardRevision {
    Poc = 0,
    Evt1 = 1,
    Evt2 = 2,
    Dvt = 3,
    Pvt = 4,
    Mp = 5,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(u8)]
pub enum HscModule {
    Adm1272 = 0,
    Ltc4286 = 1,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(u8)]
pub enum PowerBrickModule {
    Q50sn120a1 = 0,
    Bmr351 = 1,
}

//
// PMBus commands
//
pub const PMBUS_PAGE: u8 = 0x00;
pub const PMBUS_READ_VIN: u8 = 0x88;
pub const PMBUS_READ_IIN: u8 = 0x89;
pub const PMBUS_READ_VOUT: u8 = 0x8b;
pub const PMBUS_READ_IOUT: u8 = 0x8c;
pub const PMBUS_READ_TEMPERATURE_1: u8 = 0x8d;
pub const PMBUS_READ_POUT: u8 = 0x96;
pub const PMBUS_READ_PIN: u8 = 0x97;

//
// Device addresses
//
pub const TMP75_IN_ADDR: u8 = 0x48;
pub const TMP75_OUT_ADDR: u8 = 0x4a;
pub const LM75BD118_ADDR: u8 = 0x4d;
pub const XDPE15284_ADDR: u8 = 0x76;
pub const PEX89144_ADDR: u8 = 0x58;
pub const SQ52205_1_ADDR: u8 = 0x40;
pub const SQ52205_2_ADDR: u8 = 0x41;
pub const ADM1272_1_ADDR: u8 = 0x10;
pub const ADM1272_2_ADDR: u8 = 0x13;
pub const LTC4286_1_ADDR: u8 = 0x40;
pub const LTC4286_2_ADDR: u8 = 0x43;
pub const POWER_BRICK_1_ADDR: u8 = 0x69;
pub const POWER_BRICK_2_ADDR: u8 = 0x6a;
pub const ACCL_P12V_EFUSE_ADDR: u8 = 0x41;
pub const ACCL_P3V3_1_ADDR: u8 = 0x44;
pub const ACCL_P3V3_2_ADDR: u8 = 0x45;

pub const CPLD_BUS: Controller = Controller::I2C3;
pub const CPLD_ADDR: u8 = 0x21;
/// Power-good bits of cards 0-5 (bit n = card n)
pub const CPLD_ACCL_1_6_POWER_GOOD_REG: u8 = 0x0b;
/// Power-good bits of cards 6-11 (bit n = card n + 6)
pub const CPLD_ACCL_7_12_POWER_GOOD_REG: u8 = 0x0a;
pub const CARDS_PER_POWER_GOOD_REG: u8 = 6;

const TMP75_TEMP_OFFSET: u8 = 0x00;
const PEX_TEMP_OFFSET: u8 = 0x00;
const SQ52205_READ_VOL_OFFSET: u8 = 0x02;
const SQ52205_READ_PWR_OFFSET: u8 = 0x03;
const SQ52205_READ_CUR_OFFSET: u8 = 0x04;
const NVME_TEMP_OFFSET: u8 = 0x00;
const NVME_P12V_OFFSET: u8 = 0x48;
const NVME_P3V3_OFFSET: u8 = 0x4c;

//
// Sensor numbers
//
pub const SENSOR_NUM_TEMP_TMP75_IN: u8 = 0x01;
pub const SENSOR_NUM_TEMP_TMP75_OUT: u8 = 0x02;
pub const SENSOR_NUM_TEMP_LM75BD118: u8 = 0x03;

pub const SENSOR_NUM_VOL_P3V3_AUX: u8 = 0x10;
pub const SENSOR_NUM_VOL_P1V8_PEX: u8 = 0x11;
pub const SENSOR_NUM_VOL_P1V2_AUX: u8 = 0x12;
pub const SENSOR_NUM_VOL_P5V_AUX: u8 = 0x13;
pub const SENSOR_NUM_VOL_P1V8_VDD_1: u8 = 0x14;
pub const SENSOR_NUM_VOL_P1V8_VDD_2: u8 = 0x15;
pub const SENSOR_NUM_VOL_P1V25_VDD_1: u8 = 0x16;
pub const SENSOR_NUM_VOL_P1V25_VDD_2: u8 = 0x17;

pub const SENSOR_NUM_TEMP_P0V8_VDD_1: u8 = 0x20;
pub const SENSOR_NUM_VOL_P0V8_VDD_1: u8 = 0x21;
pub const SENSOR_NUM_CUR_P0V8_VDD_1: u8 = 0x22;
pub const SENSOR_NUM_PWR_P0V8_VDD_1: u8 = 0x23;
pub const SENSOR_NUM_TEMP_P0V8_VDD_2: u8 = 0x24;
pub const SENSOR_NUM_VOL_P0V8_VDD_2: u8 = 0x25;
pub const SENSOR_NUM_CUR_P0V8_VDD_2: u8 = 0x26;
pub const SENSOR_NUM_PWR_P0V8_VDD_2: u8 = 0x27;

pub const SENSOR_NUM_TEMP_PEX_1: u8 = 0x28;
pub const SENSOR_NUM_TEMP_PEX_2: u8 = 0x29;

pub const SENSOR_NUM_VOL_P12V_AUX_1: u8 = 0x2a;
pub const SENSOR_NUM_CUR_P12V_AUX_1: u8 = 0x2b;
pub const SENSOR_NUM_PWR_P12V_AUX_1: u8 = 0x2c;
pub const SENSOR_NUM_VOL_P12V_AUX_2: u8 = 0x2d;
pub const SENSOR_NUM_CUR_P12V_AUX_2: u8 = 0x2e;
pub const SENSOR_NUM_PWR_P12V_AUX_2: u8 = 0x2f;

/// First of the 12 V card rail monitors: vol/cur/pwr for card 0, then
/// card 1, and so on.
pub const SENSOR_NUM_P12V_ACCL_BASE: u8 = 0x30;

pub const SENSOR_NUM_TEMP_HSC_1: u8 = 0x60;
pub const SENSOR_NUM_VOL_P54V_STBY_1: u8 = 0x61;
pub const SENSOR_NUM_VOL_P54V_AUX_1: u8 = 0x62;
pub const SENSOR_NUM_CUR_P54V_STBY_1: u8 = 0x63;
pub const SENSOR_NUM_CUR_P54V_AUX_1: u8 = 0x64;
pub const SENSOR_NUM_PWR_P54V_STBY_1: u8 = 0x65;
pub const SENSOR_NUM_PWR_P54V_AUX_1: u8 = 0x66;
pub const SENSOR_NUM_TEMP_HSC_2: u8 = 0x67;
pub const SENSOR_NUM_VOL_P54V_STBY_2: u8 = 0x68;
pub const SENSOR_NUM_VOL_P54V_AUX_2: u8 = 0x69;
pub const SENSOR_NUM_CUR_P54V_STBY_2: u8 = 0x6a;
pub const SENSOR_NUM_CUR_P54V_AUX_2: u8 = 0x6b;
pub const SENSOR_NUM_PWR_P54V_STBY_2: u8 = 0x6c;
pub const SENSOR_NUM_PWR_P54V_AUX_2: u8 = 0x6d;

pub const SENSOR_NUM_TEMP_POWER_BRICK_1: u8 = 0x70;
pub const SENSOR_NUM_VOL_P12V_AUX_BRICK_1: u8 = 0x71;
pub const SENSOR_NUM_CUR_P12V_AUX_BRICK_1: u8 = 0x72;
pub const SENSOR_NUM_PWR_P12V_AUX_BRICK_1: u8 = 0x73;
pub const SENSOR_NUM_TEMP_POWER_BRICK_2: u8 = 0x74;
pub const SENSOR_NUM_VOL_P12V_AUX_BRICK_2: u8 = 0x75;
pub const SENSOR_NUM_CUR_P12V_AUX_BRICK_2: u8 = 0x76;
pub const SENSOR_NUM_PWR_P12V_AUX_BRICK_2: u8 = 0x77;

// Card sensors; every card's table uses the same numbers.
pub const SENSOR_NUM_TEMP_ACCL_DRIVE_1: u8 = 0x80;
pub const SENSOR_NUM_TEMP_ACCL_DRIVE_2: u8 = 0x81;
pub const SENSOR_NUM_VOL_ACCL_DRIVE_1_P12V: u8 = 0x82;
pub const SENSOR_NUM_VOL_ACCL_DRIVE_1_P3V3: u8 = 0x83;
pub const SENSOR_NUM_VOL_ACCL_DRIVE_2_P12V: u8 = 0x84;
pub const SENSOR_NUM_VOL_ACCL_DRIVE_2_P3V3: u8 = 0x85;
pub const SENSOR_NUM_VOL_ACCL_P12V_EFUSE: u8 = 0x86;
pub const SENSOR_NUM_CUR_ACCL_P12V_EFUSE: u8 = 0x87;
pub const SENSOR_NUM_PWR_ACCL_P12V_EFUSE: u8 = 0x88;
pub const SENSOR_NUM_VOL_ACCL_P3V3_1: u8 = 0x89;
pub const SENSOR_NUM_CUR_ACCL_P3V3_1: u8 = 0x8a;
pub const SENSOR_NUM_PWR_ACCL_P3V3_1: u8 = 0x8b;
pub const SENSOR_NUM_VOL_ACCL_P3V3_2: u8 = 0x8c;
pub const SENSOR_NUM_CUR_ACCL_P3V3_2: u8 = 0x8d;
pub const SENSOR_NUM_PWR_ACCL_P3V3_2: u8 = 0x8e;

/// Drive sensors, the ones whose ASIC presence gates them.
pub const ACCL_DRIVE_SENSORS: [(u8, usize); 6] = [
    (SENSOR_NUM_TEMP_ACCL_DRIVE_1, 0),
    (SENSOR_NUM_TEMP_ACCL_DRIVE_2, 1),
    (SENSOR_NUM_VOL_ACCL_DRIVE_1_P12V, 0),
    (SENSOR_NUM_VOL_ACCL_DRIVE_1_P3V3, 0),
    (SENSOR_NUM_VOL_ACCL_DRIVE_2_P12V, 1),
    (SENSOR_NUM_VOL_ACCL_DRIVE_2_P3V3, 1),
];

//
// Cards
//
pub const CARD_COUNT: usize = 12;
pub const ACCL_SENSOR_COUNT: usize = 15;

pub const ACCL_TABLE_NAMES: [&str; CARD_COUNT] = [
    "ACCL 1 sensor table",
    "ACCL 2 sensor table",
    "ACCL 3 sensor table",
    "ACCL 4 sensor table",
    "ACCL 5 sensor table",
    "ACCL 6 sensor table",
    "ACCL 7 sensor table",
    "ACCL 8 sensor table",
    "ACCL 9 sensor table",
    "ACCL 10 sensor table",
    "ACCL 11 sensor table",
    "ACCL 12 sensor table",
];

const ACCL_1_6_MUX_ADDR: u8 = 0x74;
const ACCL_7_12_MUX_ADDR: u8 = 0x70;

/// Card-select mux segments, in card order within each half.
const ACCL_MUX_SEGMENTS: [Segment; 6] = [
    Segment::S6,
    Segment::S5,
    Segment::S4,
    Segment::S3,
    Segment::S2,
    Segment::S1,
];

/// Per-card channel mux. The bus is filled in from the card when the path
/// is used.
const ACCL_CHANNEL_MUX_ADDR: u8 = 0x72;
pub const ACCL_DRIVE_MUX: MuxChannelConfig = MuxChannelConfig::new(
    Controller::I2C8,
    ACCL_CHANNEL_MUX_ADDR,
    MuxKind::Pca9546a,
    Segment::S1,
);
pub const ACCL_POWER_MONITOR_MUX: MuxChannelConfig = MuxChannelConfig::new(
    Controller::I2C8,
    ACCL_CHANNEL_MUX_ADDR,
    MuxKind::Pca9546a,
    Segment::S4,
);

/// Bus carrying a card's sensors.
pub fn accl_bus(card: u8) -> Option<Controller> {
    match card {
        0..=5 => Some(Controller::I2C8),
        6..=11 => Some(Controller::I2C7),
        _ => None,
    }
}

/// Card-select mux path for a card.
pub fn accl_mux_config(card: u8) -> Option<MuxChannelConfig> {
    let bus = accl_bus(card)?;
    let address = if card < CARDS_PER_POWER_GOOD_REG {
        ACCL_1_6_MUX_ADDR
    } else {
        ACCL_7_12_MUX_ADDR
    };
    let segment =
        ACCL_MUX_SEGMENTS[usize::from(card % CARDS_PER_POWER_GOOD_REG)];
    Some(MuxChannelConfig::new(bus, address, MuxKind::Pca9548a, segment))
}

/// The 12 V monitor mux on bus 4. Cards 0-5 hang off the second segment.
const fn p12v_accl_mux(card: u8) -> MuxChannelConfig {
    let segment = if card < CARDS_PER_POWER_GOOD_REG {
        Segment::S2
    } else {
        Segment::S1
    };
    // Programmed as a TCA9543A; the PI4MSD5V9542 shares its register
    // layout.
    MuxChannelConfig::new(Controller::I2C4, 0x70, MuxKind::Tca9543a, segment)
}

const fn pex_mux(bus: Controller, address: u8) -> MuxChannelConfig {
    MuxChannelConfig::new(bus, address, MuxKind::Tca9543a, Segment::S2)
}

//
// Bus locks
//
pub const LOCKED_BUS_COUNT: usize = 6;

/// One lock per bus that fronts a mux or paged device.
pub fn bus_locks<M: RawBusMutex>(mut make: impl FnMut() -> M) -> BusLocks<M> {
    BusMutexRegistry::new([
        BusMutex::new(Controller::I2C1, "i2c1-xdpe15284", make()),
        BusMutex::new(Controller::I2C2, "i2c2-tca9543", make()),
        BusMutex::new(Controller::I2C3, "i2c3-tca9543", make()),
        BusMutex::new(Controller::I2C4, "i2c4-pi4msd5v9542", make()),
        BusMutex::new(Controller::I2C7, "i2c7-accl", make()),
        BusMutex::new(Controller::I2C8, "i2c8-accl", make()),
    ])
}

/// Every mux on the board, as (bus, address).
pub fn all_mux_devices() -> [(Controller, u8); 7] {
    [
        (Controller::I2C2, 0x70),
        (Controller::I2C3, 0x71),
        (Controller::I2C4, 0x70),
        (Controller::I2C7, ACCL_7_12_MUX_ADDR),
        (Controller::I2C7, ACCL_CHANNEL_MUX_ADDR),
        (Controller::I2C8, ACCL_1_6_MUX_ADDR),
        (Controller::I2C8, ACCL_CHANNEL_MUX_ADDR),
    ]
}

//
// Device init slots
//
pub const ADC_INIT: u8 = 0;
pub const ADM1272_INIT: u8 = 1;
pub const LTC4286_INIT: u8 = 3;
pub const INA233_P12V_INIT: u8 = 5;
pub const PEX89000_INIT: u8 = INA233_P12V_INIT + CARD_COUNT as u8;
pub const ACCL_INA233_INIT: u8 = PEX89000_INIT + 2;
pub const SQ52205_INIT: u8 = ACCL_INA233_INIT + 3 * CARD_COUNT as u8;
pub const DEVICE_INIT_COUNT: usize = SQ52205_INIT as usize + 2;

const_assert!(DEVICE_INIT_COUNT <= u8::MAX as usize);
const_assert!(CARD_COUNT <= 2 * CARDS_PER_POWER_GOOD_REG as usize);
const_assert!(CARDS_PER_POWER_GOOD_REG <= 8);

fn init_config(slot: u8) -> DeviceConfig {
    match slot {
        ADC_INIT => DeviceConfig::AdcAsd,
        s if s < LTC4286_INIT => DeviceConfig::adm1272(),
        s if s < INA233_P12V_INIT => DeviceConfig::ltc4286(),
        s if s < PEX89000_INIT => DeviceConfig::ina233(),
        s if s < ACCL_INA233_INIT => DeviceConfig::Pex89000 {
            index: s - PEX89000_INIT,
        },
        s if s < SQ52205_INIT => DeviceConfig::ina233(),
        _ => DeviceConfig::sq52205(),
    }
}

pub fn device_init_states() -> [DeviceInitState; DEVICE_INIT_COUNT] {
    core::array::from_fn(|slot| {
        // DEVICE_INIT_COUNT fits in a u8
        DeviceInitState::new(init_config(slot as u8))
    })
}

//
// Sensor tables
//

/// One table row. Everything past the gate is a builder chained on the
/// descriptor.
macro_rules! sensor {
    ($num:expr, $kind:ident, $bus:expr, $addr:expr, $offset:expr, $gate:ident) => {
        SensorDescriptor::i2c(
            $num,
            DeviceType::$kind,
            $bus,
            $addr,
            $offset,
            AccessGate::$gate,
        )
    };
    ($num:expr, $kind:ident, $bus:expr, $addr:expr, $offset:expr, $gate:ident,
     $($builder:ident($($arg:expr),*)).+) => {
        sensor!($num, $kind, $bus, $addr, $offset, $gate)
            $(.$builder($($arg),*))+
    };
}

pub const BASE_SENSOR_COUNT: usize = 63;
pub const HSC_SENSOR_COUNT: usize = 14;
pub const POWER_BRICK_SENSOR_COUNT: usize = 8;
pub const MAX_SENSORS: usize =
    BASE_SENSOR_COUNT + HSC_SENSOR_COUNT + POWER_BRICK_SENSOR_COUNT;

pub type SensorTable = heapless::Vec<SensorDescriptor, MAX_SENSORS>;

fn push(table: &mut SensorTable, desc: SensorDescriptor) {
    if let Err(desc) = table.push(desc) {
        log::error!("sensor table full, dropping {:#04x}", desc.num.0);
    }
}

/// Several readings of one device, as (sensor number, command) pairs.
fn push_readings(
    table: &mut SensorTable,
    readings: &[(u8, u8)],
    make: impl Fn(u8, u8) -> SensorDescriptor,
) {
    for &(num, cmd) in readings {
        push(table, make(num, cmd));
    }
}

struct AdcRail {
    num: u8,
    channel: u8,
    multiplier: u16,
    divisor: u16,
    access: AccessGate,
}

const ADC_RAILS: [AdcRail; 8] = [
    AdcRail {
        num: SENSOR_NUM_VOL_P3V3_AUX,
        channel: 3,
        multiplier: 2,
        divisor: 1,
        access: AccessGate::Standby,
    },
    AdcRail {
        num: SENSOR_NUM_VOL_P1V8_PEX,
        channel: 4,
        multiplier: 1,
        divisor: 1,
        access: AccessGate::DcOn,
    },
    AdcRail {
        num: SENSOR_NUM_VOL_P1V2_AUX,
        channel: 5,
        multiplier: 1,
        divisor: 1,
        access: AccessGate::Standby,
    },
    AdcRail {
        num: SENSOR_NUM_VOL_P5V_AUX,
        channel: 7,
        multiplier: 711,
        divisor: 200,
        access: AccessGate::Standby,
    },
    AdcRail {
        num: SENSOR_NUM_VOL_P1V8_VDD_1,
        channel: 10,
        multiplier: 1,
        divisor: 1,
        access: AccessGate::DcOn,
    },
    AdcRail {
        num: SENSOR_NUM_VOL_P1V8_VDD_2,
        channel: 11,
        multiplier: 1,
        divisor: 1,
        access: AccessGate::DcOn,
    },
    AdcRail {
        num: SENSOR_NUM_VOL_P1V25_VDD_1,
        channel: 12,
        multiplier: 1,
        divisor: 1,
        access: AccessGate::DcOn,
    },
    AdcRail {
        num: SENSOR_NUM_VOL_P1V25_VDD_2,
        channel: 13,
        multiplier: 1,
        divisor: 1,
        access: AccessGate::DcOn,
    },
];

/// Sensor number of a 12 V card rail reading (0 = vol, 1 = cur, 2 = pwr).
pub const fn p12v_accl_sensor_num(card: u8, reading: u8) -> u8 {
    SENSOR_NUM_P12V_ACCL_BASE + card * 3 + reading
}

/// 12 V card rail monitors sit at 0x41..0x46, one address per position
/// within each half of the card array.
const fn p12v_accl_addr(card: u8) -> u8 {
    0x41 + card % CARDS_PER_POWER_GOOD_REG
}

/// Sensors fitted on every board, in poll order.
pub fn base_sensor_table() -> SensorTable {
    let mut table = SensorTable::new();
    let t = &mut table;

    push(
        t,
        sensor!(
            SENSOR_NUM_TEMP_TMP75_IN,
            Tmp75,
            Controller::I2C2,
            TMP75_IN_ADDR,
            TMP75_TEMP_OFFSET,
            Standby
        ),
    );
    push(
        t,
        sensor!(
            SENSOR_NUM_TEMP_TMP75_OUT,
            Tmp75,
            Controller::I2C2,
            TMP75_OUT_ADDR,
            TMP75_TEMP_OFFSET,
            Standby
        ),
    );
    push(
        t,
        sensor!(
            SENSOR_NUM_TEMP_LM75BD118,
            Lm75bd118,
            Controller::I2C10,
            LM75BD118_ADDR,
            TMP75_TEMP_OFFSET,
            Standby
        ),
    );

    for rail in &ADC_RAILS {
        push(
            t,
            SensorDescriptor::adc(
                rail.num,
                rail.channel,
                rail.multiplier,
                rail.divisor,
                rail.access,
            )
            .with_init(ADC_INIT),
        );
    }

    for (page, readings) in [
        [
            (SENSOR_NUM_TEMP_P0V8_VDD_1, PMBUS_READ_TEMPERATURE_1),
            (SENSOR_NUM_VOL_P0V8_VDD_1, PMBUS_READ_VOUT),
            (SENSOR_NUM_CUR_P0V8_VDD_1, PMBUS_READ_IOUT),
            (SENSOR_NUM_PWR_P0V8_VDD_1, PMBUS_READ_POUT),
        ],
        [
            (SENSOR_NUM_TEMP_P0V8_VDD_2, PMBUS_READ_TEMPERATURE_1),
            (SENSOR_NUM_VOL_P0V8_VDD_2, PMBUS_READ_VOUT),
            (SENSOR_NUM_CUR_P0V8_VDD_2, PMBUS_READ_IOUT),
            (SENSOR_NUM_PWR_P0V8_VDD_2, PMBUS_READ_POUT),
        ],
    ]
    .iter()
    .enumerate()
    {
        push_readings(t, readings, |num, cmd| {
            sensor!(
                num,
                Xdpe15284,
                Controller::I2C1,
                XDPE15284_ADDR,
                cmd,
                DcOn,
                with_hook(SensorHook::VrPage(page as u8))
            )
        });
    }

    for (index, (num, bus, mux_addr)) in [
        (SENSOR_NUM_TEMP_PEX_1, Controller::I2C2, 0x70),
        (SENSOR_NUM_TEMP_PEX_2, Controller::I2C3, 0x71),
    ]
    .into_iter()
    .enumerate()
    {
        push(
            t,
            sensor!(
                num,
                Pex89000,
                bus,
                PEX89144_ADDR,
                PEX_TEMP_OFFSET,
                DcOn,
                with_hook(SensorHook::PexSwitch {
                    mux: pex_mux(bus, mux_addr)
                })
                .with_init(PEX89000_INIT + index as u8)
            ),
        );
    }

    for (index, (address, readings)) in [
        (
            SQ52205_1_ADDR,
            [
                (SENSOR_NUM_VOL_P12V_AUX_1, SQ52205_READ_VOL_OFFSET),
                (SENSOR_NUM_CUR_P12V_AUX_1, SQ52205_READ_CUR_OFFSET),
                (SENSOR_NUM_PWR_P12V_AUX_1, SQ52205_READ_PWR_OFFSET),
            ],
        ),
        (
            SQ52205_2_ADDR,
            [
                (SENSOR_NUM_VOL_P12V_AUX_2, SQ52205_READ_VOL_OFFSET),
                (SENSOR_NUM_CUR_P12V_AUX_2, SQ52205_READ_CUR_OFFSET),
                (SENSOR_NUM_PWR_P12V_AUX_2, SQ52205_READ_PWR_OFFSET),
            ],
        ),
    ]
    .iter()
    .enumerate()
    {
        push_readings(t, readings, |num, offset| {
            sensor!(
                num,
                Sq52205,
                Controller::I2C2,
                *address,
                offset,
                Standby,
                with_init(SQ52205_INIT + index as u8)
            )
        });
    }

    for card in 0..CARD_COUNT as u8 {
        let hook = SensorHook::PowerMonitor {
            mux: p12v_accl_mux(card),
            card,
        };
        let readings = [
            (p12v_accl_sensor_num(card, 0), PMBUS_READ_VOUT),
            (p12v_accl_sensor_num(card, 1), PMBUS_READ_IOUT),
            (p12v_accl_sensor_num(card, 2), PMBUS_READ_POUT),
        ];
        push_readings(t, &readings, |num, cmd| {
            sensor!(
                num,
                Ina233,
                Controller::I2C4,
                p12v_accl_addr(card),
                cmd,
                DcOn,
                with_hook(hook).with_init(INA233_P12V_INIT + card)
            )
        });
    }

    table
}

/// Hot-swap controller rows; `chips` gives each chip's address and init
/// slot.
fn push_hsc_sensors(
    table: &mut SensorTable,
    kind: DeviceType,
    chips: [(u8, u8); 2],
) {
    let rows = [
        [
            (SENSOR_NUM_TEMP_HSC_1, PMBUS_READ_TEMPERATURE_1),
            (SENSOR_NUM_VOL_P54V_STBY_1, PMBUS_READ_VIN),
            (SENSOR_NUM_VOL_P54V_AUX_1, PMBUS_READ_VOUT),
            (SENSOR_NUM_CUR_P54V_STBY_1, PMBUS_READ_IIN),
            (SENSOR_NUM_CUR_P54V_AUX_1, PMBUS_READ_IOUT),
            (SENSOR_NUM_PWR_P54V_STBY_1, PMBUS_READ_PIN),
            (SENSOR_NUM_PWR_P54V_AUX_1, PMBUS_READ_POUT),
        ],
        [
            (SENSOR_NUM_TEMP_HSC_2, PMBUS_READ_TEMPERATURE_1),
            (SENSOR_NUM_VOL_P54V_STBY_2, PMBUS_READ_VIN),
            (SENSOR_NUM_VOL_P54V_AUX_2, PMBUS_READ_VOUT),
            (SENSOR_NUM_CUR_P54V_STBY_2, PMBUS_READ_IIN),
            (SENSOR_NUM_CUR_P54V_AUX_2, PMBUS_READ_IOUT),
            (SENSOR_NUM_PWR_P54V_STBY_2, PMBUS_READ_PIN),
            (SENSOR_NUM_PWR_P54V_AUX_2, PMBUS_READ_POUT),
        ],
    ];

    for ((address, slot), readings) in chips.into_iter().zip(rows) {
        push_readings(table, &readings, |num, cmd| {
            SensorDescriptor::i2c(
                num,
                kind,
                Controller::I2C1,
                address,
                cmd,
                AccessGate::Standby,
            )
            .with_init(slot)
        });
    }
}

fn push_power_brick_sensors(table: &mut SensorTable, kind: DeviceType) {
    let bricks = [
        (
            POWER_BRICK_1_ADDR,
            [
                (SENSOR_NUM_TEMP_POWER_BRICK_1, PMBUS_READ_TEMPERATURE_1),
                (SENSOR_NUM_VOL_P12V_AUX_BRICK_1, PMBUS_READ_VOUT),
                (SENSOR_NUM_CUR_P12V_AUX_BRICK_1, PMBUS_READ_IOUT),
                (SENSOR_NUM_PWR_P12V_AUX_BRICK_1, PMBUS_READ_POUT),
            ],
        ),
        (
            POWER_BRICK_2_ADDR,
            [
                (SENSOR_NUM_TEMP_POWER_BRICK_2, PMBUS_READ_TEMPERATURE_1),
                (SENSOR_NUM_VOL_P12V_AUX_BRICK_2, PMBUS_READ_VOUT),
                (SENSOR_NUM_CUR_P12V_AUX_BRICK_2, PMBUS_READ_IOUT),
                (SENSOR_NUM_PWR_P12V_AUX_BRICK_2, PMBUS_READ_POUT),
            ],
        ),
    ];

    for (address, readings) in bricks {
        push_readings(table, &readings, |num, cmd| {
            SensorDescriptor::i2c(
                num,
                kind,
                Controller::I2C1,
                address,
                cmd,
                AccessGate::DcOn,
            )
        });
    }
}

/// Append the sensors of the fitted hot-swap controller and power bricks.
/// An unknown module id is logged and that group skipped.
pub fn extend_sensor_config<B: Board + ?Sized>(
    table: &mut SensorTable,
    board: &B,
) {
    match HscModule::from_u8(board.hsc_module()) {
        Some(HscModule::Adm1272) => push_hsc_sensors(
            table,
            DeviceType::Adm1272,
            [
                (ADM1272_1_ADDR, ADM1272_INIT),
                (ADM1272_2_ADDR, ADM1272_INIT + 1),
            ],
        ),
        Some(HscModule::Ltc4286) => push_hsc_sensors(
            table,
            DeviceType::Ltc4286,
            [
                (LTC4286_1_ADDR, LTC4286_INIT),
                (LTC4286_2_ADDR, LTC4286_INIT + 1),
            ],
        ),
        None => {
            log::error!("unsupported hsc module {:#04x}", board.hsc_module())
        }
    }

    match PowerBrickModule::from_u8(board.power_brick_module()) {
        Some(PowerBrickModule::Q50sn120a1) => {
            push_power_brick_sensors(table, DeviceType::Q50sn120a1)
        }
        Some(PowerBrickModule::Bmr351) => {
            push_power_brick_sensors(table, DeviceType::Bmr351)
        }
        None => log::error!(
            "unsupported power brick module {:#04x}",
            board.power_brick_module()
        ),
    }
}

/// Full sensor table for this board.
pub fn load_sensor_config<B: Board + ?Sized>(board: &B) -> SensorTable {
    let mut table = base_sensor_table();
    extend_sensor_config(&mut table, board);
    table
}

/// Sensors of one card. Everything is reached through the card's bus, behind
/// the card-select mux and then the card's own channel mux.
pub fn accl_sensor_table(card: u8) -> [SensorDescriptor; ACCL_SENSOR_COUNT] {
    // Only called for cards in range; fall back to the low bus so the table
    // is still well formed.
    let bus = accl_bus(card).unwrap_or(Controller::I2C8);
    let drive = SensorHook::DriveReady { card };
    let rail_init = |rail: u8| ACCL_INA233_INIT + card * 3 + rail;

    [
        sensor!(SENSOR_NUM_TEMP_ACCL_DRIVE_1, Nvme, bus, 0x6a, NVME_TEMP_OFFSET,
            DcOn, with_hook(drive).behind(ACCL_DRIVE_MUX)),
        sensor!(SENSOR_NUM_TEMP_ACCL_DRIVE_2, Nvme, bus, 0x6b, NVME_TEMP_OFFSET,
            DcOn, with_hook(drive).behind(ACCL_DRIVE_MUX)),
        sensor!(SENSOR_NUM_VOL_ACCL_DRIVE_1_P12V, Nvme, bus, 0x6a,
            NVME_P12V_OFFSET, DcOn, with_hook(drive).behind(ACCL_DRIVE_MUX)),
        sensor!(SENSOR_NUM_VOL_ACCL_DRIVE_1_P3V3, Nvme, bus, 0x6a,
            NVME_P3V3_OFFSET, DcOn, with_hook(drive).behind(ACCL_DRIVE_MUX)),
        sensor!(SENSOR_NUM_VOL_ACCL_DRIVE_2_P12V, Nvme, bus, 0x6b,
            NVME_P12V_OFFSET, DcOn, with_hook(drive).behind(ACCL_DRIVE_MUX)),
        sensor!(SENSOR_NUM_VOL_ACCL_DRIVE_2_P3V3, Nvme, bus, 0x6b,
            NVME_P3V3_OFFSET, DcOn, with_hook(drive).behind(ACCL_DRIVE_MUX)),
        sensor!(SENSOR_NUM_VOL_ACCL_P12V_EFUSE, Ina233, bus,
            ACCL_P12V_EFUSE_ADDR, PMBUS_READ_VOUT, Standby,
            behind(ACCL_POWER_MONITOR_MUX).with_init(rail_init(0))),
        sensor!(SENSOR_NUM_CUR_ACCL_P12V_EFUSE, Ina233, bus,
            ACCL_P12V_EFUSE_ADDR, PMBUS_READ_IOUT, Standby,
            behind(ACCL_POWER_MONITOR_MUX).with_init(rail_init(0))),
        sensor!(SENSOR_NUM_PWR_ACCL_P12V_EFUSE, Ina233, bus,
            ACCL_P12V_EFUSE_ADDR, PMBUS_READ_POUT, Standby,
            behind(ACCL_POWER_MONITOR_MUX).with_init(rail_init(0))),
        sensor!(SENSOR_NUM_VOL_ACCL_P3V3_1, Ina233, bus, ACCL_P3V3_1_ADDR,
            PMBUS_READ_VOUT, Standby,
            behind(ACCL_POWER_MONITOR_MUX).with_init(rail_init(1))),
        sensor!(SENSOR_NUM_CUR_ACCL_P3V3_1, Ina233, bus, ACCL_P3V3_1_ADDR,
            PMBUS_READ_IOUT, Standby,
            behind(ACCL_POWER_MONITOR_MUX).with_init(rail_init(1))),
        sensor!(SENSOR_NUM_PWR_ACCL_P3V3_1, Ina233, bus, ACCL_P3V3_1_ADDR,
            PMBUS_READ_POUT, Standby,
            behind(ACCL_POWER_MONITOR_MUX).with_init(rail_init(1))),
        sensor!(SENSOR_NUM_VOL_ACCL_P3V3_2, Ina233, bus, ACCL_P3V3_2_ADDR,
            PMBUS_READ_VOUT, Standby,
            behind(ACCL_POWER_MONITOR_MUX).with_init(rail_init(2))),
        sensor!(SENSOR_NUM_CUR_ACCL_P3V3_2, Ina233, bus, ACCL_P3V3_2_ADDR,
            PMBUS_READ_IOUT, Standby,
            behind(ACCL_POWER_MONITOR_MUX).with_init(rail_init(2))),
        sensor!(SENSOR_NUM_PWR_ACCL_P3V3_2, Ina233, bus, ACCL_P3V3_2_ADDR,
            PMBUS_READ_POUT, Standby,
            behind(ACCL_POWER_MONITOR_MUX).with_init(rail_init(2))),
    ]
}
