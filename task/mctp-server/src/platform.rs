// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ports and endpoints of the accelerator carrier board

use crate::Router;
use mctp_api::{BusRef, MctpPort, MediumConfig, RouteEntry};

pub const I3C_BUS_BMC: u8 = 0;
pub const I3C_BUS_CONTROLLER: u8 = 1;
pub const I2C_BUS_PLDM: u8 = 5;
pub const I2C_BUS_CXL: u8 = 6;
pub const SERIAL_PORT: u8 = 0;

pub const I2C_ADDR_BIC: u8 = 0x20;
pub const I2C_ADDR_BMC: u8 = 0x10;
pub const I2C_ADDR_CXL0: u8 = 0x74;
pub const I3C_STATIC_ADDR_BMC: u8 = 0x08;
pub const I3C_STATIC_ADDR_BIC: u8 = 0x09;

pub const EID_BMC_I2C: u8 = 0x08;
pub const EID_BMC_I3C: u8 = 0x09;
pub const EID_BIC_I2C: u8 = 0x0a;
pub const EID_BIC_I3C: u8 = 0x0b;
pub const EID_CXL: u8 = 0x2e;
pub const EID_SERIAL_HOST: u8 = 0xa1;

pub const PORT_COUNT: usize = 4;

pub static PORTS: [MctpPort; PORT_COUNT] = [
    MctpPort {
        name: "i3c-bmc",
        medium: MediumConfig::TargetI3c {
            bus: I3C_BUS_BMC,
            addr: I3C_STATIC_ADDR_BMC,
        },
    },
    MctpPort {
        name: "smbus-cxl",
        medium: MediumConfig::Smbus {
            bus: I2C_BUS_CXL,
            addr: I2C_ADDR_BIC,
        },
    },
    MctpPort {
        name: "smbus-pldm",
        medium: MediumConfig::Smbus {
            bus: I2C_BUS_PLDM,
            addr: I2C_ADDR_BIC,
        },
    },
    MctpPort {
        name: "serial",
        medium: MediumConfig::Serial { port: SERIAL_PORT },
    },
];

pub static ROUTES: [RouteEntry; 6] = [
    RouteEntry::new(EID_CXL, BusRef::I2c(I2C_BUS_CXL), I2C_ADDR_CXL0),
    RouteEntry::new(EID_BMC_I2C, BusRef::I2c(I2C_BUS_PLDM), I2C_ADDR_BMC),
    RouteEntry::new(EID_BIC_I2C, BusRef::I2c(I2C_BUS_PLDM), I2C_ADDR_BIC),
    RouteEntry::new(
        EID_BIC_I3C,
        BusRef::I3c(I3C_BUS_CONTROLLER),
        I3C_STATIC_ADDR_BIC,
    ),
    RouteEntry::new(EID_BMC_I3C, BusRef::I3c(I3C_BUS_BMC), I3C_STATIC_ADDR_BMC),
    RouteEntry::new(EID_SERIAL_HOST, BusRef::Serial(SERIAL_PORT), 0),
];

/// Router over this board's tables. Ports are down until
/// [`Router::init`].
pub fn router() -> Router<'static, PORT_COUNT> {
    Router::new(&PORTS, &ROUTES, I3C_BUS_CONTROLLER)
}
