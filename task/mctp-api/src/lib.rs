// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Types shared between the MCTP router and the code that configures it
//!
//! Bus numbers are only meaningful together with the kind of bus they
//! name, so everything here takes a [`BusRef`] rather than a bare number.

#![no_std]

use mctp::{Eid, MsgType};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Low seven bits of the first message byte; the top bit is the
/// integrity-check flag.
pub const MSG_TYPE_MASK: u8 = 0x7f;

/// MCTP control command codes used by the router.
pub const CTRL_CMD_SET_ENDPOINT_ID: u8 = 0x01;

/// SET_EID operations.
pub const SET_EID_OP_SET: u8 = 0x00;
pub const SET_EID_OP_FORCE: u8 = 0x01;

/// A physical bus, tagged with the kind of controller behind it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BusRef {
    I2c(u8),
    I3c(u8),
    Serial(u8),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MediumKind {
    Smbus,
    TargetI3c,
    ControllerI3c,
    Serial,
}

/// How a port's medium is set up.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MediumConfig {
    /// SMBus on an I2C controller; `addr` is our own target address.
    Smbus { bus: u8, addr: u8 },
    /// We are an I3C target; `addr` is our static address.
    TargetI3c { bus: u8, addr: u8 },
    ControllerI3c { bus: u8, addr: u8 },
    Serial { port: u8 },
}

impl MediumConfig {
    pub fn kind(&self) -> MediumKind {
        match self {
            MediumConfig::Smbus { .. } => MediumKind::Smbus,
            MediumConfig::TargetI3c { .. } => MediumKind::TargetI3c,
            MediumConfig::ControllerI3c { .. } => MediumKind::ControllerI3c,
            MediumConfig::Serial { .. } => MediumKind::Serial,
        }
    }

    /// Whether this medium runs on `bus`. Both I3C roles match an I3C bus
    /// with the same number.
    pub fn matches(&self, bus: BusRef) -> bool {
        match (*self, bus) {
            (MediumConfig::Smbus { bus: mine, .. }, BusRef::I2c(b)) => mine == b,
            (MediumConfig::TargetI3c { bus: mine, .. }, BusRef::I3c(b))
            | (MediumConfig::ControllerI3c { bus: mine, .. }, BusRef::I3c(b)) => {
                mine == b
            }
            (MediumConfig::Serial { port }, BusRef::Serial(b)) => port == b,
            _ => false,
        }
    }
}

/// One MCTP binding the router brings up.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MctpPort {
    pub name: &'static str,
    pub medium: MediumConfig,
}

/// A statically known endpoint.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RouteEntry {
    pub eid: u8,
    pub bus: BusRef,
    /// Endpoint's physical address on `bus`
    pub addr: u8,
    /// Assign `eid` to the endpoint with SET_EID at startup
    pub set_endpoint: bool,
}

impl RouteEntry {
    pub const fn new(eid: u8, bus: BusRef, addr: u8) -> Self {
        Self {
            eid,
            bus,
            addr,
            set_endpoint: false,
        }
    }

    pub const fn assign_eid(mut self) -> Self {
        self.set_endpoint = true;
        self
    }
}

/// Medium-specific addressing for one message, handed to the transport
/// with every send and to the handlers with every receive.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ExtParams {
    pub kind: MediumKind,
    pub addr: u8,
    pub eid: u8,
}

impl ExtParams {
    pub fn remote_eid(&self) -> Eid {
        Eid(self.eid)
    }
}

/// Message types the router has handlers for.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(u8)]
pub enum MessageKind {
    Control = 0x00,
    Pldm = 0x01,
    CxlCci = 0x08,
}

impl MessageKind {
    /// Classify a received message by its first byte.
    pub fn classify(buf: &[u8]) -> Result<Self, RouteError> {
        let first = buf.first().ok_or(RouteError::EmptyMessage)?;
        let typ = first & MSG_TYPE_MASK;
        Self::from_u8(typ).ok_or(RouteError::UnsupportedType(typ))
    }

    pub fn msg_type(self) -> MsgType {
        MsgType(self as u8)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RouteError {
    /// No route entry for this endpoint id
    NoRoute(u8),
    /// No running port is on the route's bus
    NoPort(BusRef),
    EmptyMessage,
    UnsupportedType(u8),
    /// The external stack refused; the cause is logged where it happens
    Transport,
    /// A message handler rejected the message
    Handler,
}

/// Control message header following the message-type byte.
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoBytes, FromBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct ControlHeader {
    /// Rq (bit 7), D (bit 6), instance id (bits 4:0)
    pub flags: u8,
    pub command: u8,
}

impl ControlHeader {
    const RQ: u8 = 1 << 7;
    const INSTANCE_MASK: u8 = 0x1f;

    pub fn request(command: u8, instance: u8) -> Self {
        Self {
            flags: Self::RQ | (instance & Self::INSTANCE_MASK),
            command,
        }
    }

    pub fn is_request(&self) -> bool {
        self.flags & Self::RQ != 0
    }

    pub fn instance(&self) -> u8 {
        self.flags & Self::INSTANCE_MASK
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoBytes, FromBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct SetEidRequest {
    pub header: ControlHeader,
    pub op: u8,
    pub eid: u8,
}

impl SetEidRequest {
    pub fn set(eid: u8, instance: u8) -> Self {
        Self {
            header: ControlHeader::request(CTRL_CMD_SET_ENDPOINT_ID, instance),
            op: SET_EID_OP_SET,
            eid,
        }
    }
}
