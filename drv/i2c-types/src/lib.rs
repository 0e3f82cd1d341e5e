// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Common types for talking to I2C/SMBus devices behind the sensor hooks
//!
//! This crate works on both the host and embedded system, so it can be used in
//! host-side tests.

#![no_std]

use num_derive::FromPrimitive;

/// The response code returned from an I2C transaction. These response codes
/// are pretty specific, not because the caller is expected to necessarily
/// handle them differently, but to give upstack software some modicum of
/// context surrounding the error.
#[derive(Copy, Clone, Debug, FromPrimitive, Eq, PartialEq)]
#[repr(u32)]
pub enum ResponseCode {
    /// Bad response from device
    BadResponse = 1,
    /// Bad argument
    BadArg,
    /// Indicated I2C device is invalid
    NoDevice,
    /// Indicated I2C controller is invalid
    BadController,
    /// Device address is reserved
    ReservedAddress,
    /// Device does not have indicated register
    NoRegister,
    /// Indicated segment does not exist on this mux
    SegmentNotFound,
    /// No device at address used for mux in-band management
    MuxMissing,
    /// I2C bus was spontaneously reset during operation
    BusReset,
    /// I2C bus was reset during a mux in-band management operation
    BusResetMux,
    /// I2C bus locked up and was reset
    BusLocked,
    /// I2C bus locked up during in-band management operation and was reset
    BusLockedMux,
    /// I2C controller appeared to be busy and was reset
    ControllerBusy,
    /// I2C bus error
    BusError,
    /// Requested operation is not supported
    OperationNotSupported,
    /// Too much data -- or not enough buffer
    TooMuchData,
}

///
/// The controller for a given I2C bus. Board schematics number buses from
/// one (`I2C_BUS1`); the numbering here follows the schematic name, so
/// `I2C1` is the schematic's bus 1.
///
#[derive(Copy, Clone, Debug, FromPrimitive, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum Controller {
    I2C0 = 0,
    I2C1 = 1,
    I2C2 = 2,
    I2C3 = 3,
    I2C4 = 4,
    I2C5 = 5,
    I2C6 = 6,
    I2C7 = 7,
    I2C8 = 8,
    I2C9 = 9,
    I2C10 = 10,
    I2C11 = 11,
    I2C12 = 12,
    I2C13 = 13,
    I2C14 = 14,
    I2C15 = 15,
    Mock = 0xff,
}

#[derive(Copy, Clone, Debug, FromPrimitive, Eq, PartialEq)]
#[allow(clippy::unusual_byte_groupings)]
pub enum ReservedAddress {
    GeneralCall = 0b0000_000,
    CBUSAddress = 0b0000_001,
    FutureBus = 0b0000_010,
    FuturePurposes = 0b0000_011,
    HighSpeedReserved00 = 0b0000_100,
    HighSpeedReserved01 = 0b0000_101,
    HighSpeedReserved10 = 0b0000_110,
    HighSpeedReserved11 = 0b0000_111,
    TenBit00 = 0b1111_100,
    TenBit01 = 0b1111_101,
    TenBit10 = 0b1111_110,
    TenBit11 = 0b1111_111,
}

///
/// A segment identifier on a given multiplexer. Segment identifiers start at
/// 1; `S1` is the mux's channel 0.
///
#[derive(Copy, Clone, Debug, FromPrimitive, Eq, PartialEq)]
#[repr(u8)]
pub enum Segment {
    S1 = 1,
    S2 = 2,
    S3 = 3,
    S4 = 4,
    S5 = 5,
    S6 = 6,
    S7 = 7,
    S8 = 8,
}

impl Segment {
    /// Zero-based channel index of this segment.
    pub const fn channel(self) -> u8 {
        self as u8 - 1
    }
}

/// Hardware abstraction for an I2C controller.
///
/// Methods take `&self`: sensor hooks run from several polling contexts at
/// once, so implementations serialize access to a controller internally
/// (the way the I2C server task does for its clients). Mux state is *not*
/// protected by this; that is what the bus locks are for.
pub trait I2cHardware {
    /// Hardware-specific error type that can be converted to ResponseCode
    type Error: Into<ResponseCode>;

    /// Perform a write followed by read operation on the I2C bus.
    ///
    /// An empty `write_data` is a plain read; an empty `read_buffer` is a
    /// plain write. Returns the number of bytes read.
    fn write_read(
        &self,
        controller: Controller,
        addr: u8,
        write_data: &[u8],
        read_buffer: &mut [u8],
    ) -> Result<usize, Self::Error>;

    /// Perform an SMBus block read: the device returns a byte count followed
    /// by that many data bytes. `read_buffer` receives the data without the
    /// length byte; the return value is the number of data bytes.
    fn write_read_block(
        &self,
        controller: Controller,
        addr: u8,
        write_data: &[u8],
        read_buffer: &mut [u8],
    ) -> Result<usize, Self::Error>;
}

fn with_retries<T>(
    attempts: u8,
    mut op: impl FnMut() -> Result<T, ResponseCode>,
) -> Result<T, ResponseCode> {
    let mut last = ResponseCode::BadArg;
    for _ in 0..attempts.max(1) {
        match op() {
            Ok(v) => return Ok(v),
            Err(code) => last = code,
        }
    }
    Err(last)
}

/// Write `data` to a device, retrying the raw transaction up to `attempts`
/// times. Returns the last error on exhaustion.
pub fn write_with_retry<H: I2cHardware + ?Sized>(
    hw: &H,
    controller: Controller,
    addr: u8,
    data: &[u8],
    attempts: u8,
) -> Result<(), ResponseCode> {
    with_retries(attempts, || {
        hw.write_read(controller, addr, data, &mut [])
            .map(|_| ())
            .map_err(Into::into)
    })
}

/// Read `buf.len()` bytes starting at register `reg`, with retries.
pub fn read_reg_with_retry<H: I2cHardware + ?Sized>(
    hw: &H,
    controller: Controller,
    addr: u8,
    reg: u8,
    buf: &mut [u8],
    attempts: u8,
) -> Result<usize, ResponseCode> {
    with_retries(attempts, || {
        hw.write_read(controller, addr, &[reg], buf)
            .map_err(Into::into)
    })
}

/// SMBus block read of register `reg`, with retries.
pub fn read_block_with_retry<H: I2cHardware + ?Sized>(
    hw: &H,
    controller: Controller,
    addr: u8,
    reg: u8,
    buf: &mut [u8],
    attempts: u8,
) -> Result<usize, ResponseCode> {
    with_retries(attempts, || {
        hw.write_read_block(controller, addr, &[reg], buf)
            .map_err(Into::into)
    })
}

/// Mock I2C hardware implementation for testing
pub mod mock;
