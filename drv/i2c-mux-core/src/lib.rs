// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Generic I2C multiplexer drivers
//!
//! The muxes on this board are all single-register parts: whatever byte is
//! written to the mux address becomes the control register, which picks the
//! downstream segment(s) connected to the upstream bus. A driver's only job
//! is to turn a segment into that byte; [`select_channel`] does the write.
//!
//! Selecting a channel changes state that every device on the bus sees.
//! Callers must hold the bus lock for `cfg.bus` across the select and the
//! transaction that depends on it.

#![no_std]

use drv_i2c_types::{write_with_retry, Controller, I2cHardware, ResponseCode, Segment};

pub mod pca954x;
pub mod tca9543a;

/// Generic trait for I2C multiplexer drivers
pub trait I2cMuxDriver {
    /// Number of downstream segments on this part
    fn segments(&self) -> u8;

    /// Control register value that enables `segment`, or disconnects every
    /// segment if `None`.
    fn control_value(&self, segment: Option<Segment>) -> Result<u8, ResponseCode>;
}

/// Mux part fitted at a given position
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MuxKind {
    Tca9543a,
    Pca9546a,
    Pca9548a,
}

impl MuxKind {
    pub fn driver(self) -> &'static dyn I2cMuxDriver {
        match self {
            MuxKind::Tca9543a => &tca9543a::Tca9543a,
            MuxKind::Pca9546a => &pca954x::Pca9546a,
            MuxKind::Pca9548a => &pca954x::Pca9548a,
        }
    }
}

/// One addressable output path of a mux: which bus the mux sits on, its
/// address, and the segment to connect.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MuxChannelConfig {
    pub bus: Controller,
    pub address: u8,
    pub kind: MuxKind,
    pub segment: Segment,
}

impl MuxChannelConfig {
    pub const fn new(
        bus: Controller,
        address: u8,
        kind: MuxKind,
        segment: Segment,
    ) -> Self {
        Self {
            bus,
            address,
            kind,
            segment,
        }
    }

    /// The same mux path, reached through `bus`.
    pub const fn on_bus(self, bus: Controller) -> Self {
        Self { bus, ..self }
    }

    /// Byte written to the mux to select this path.
    pub fn channel_mask(&self) -> Result<u8, ResponseCode> {
        self.kind.driver().control_value(Some(self.segment))
    }
}

/// Errors talking to a mux are reported as mux errors so they can be told
/// apart from errors talking to the device behind it.
pub fn mux_error(code: ResponseCode) -> ResponseCode {
    match code {
        ResponseCode::NoDevice => ResponseCode::MuxMissing,
        ResponseCode::BusLocked => ResponseCode::BusLockedMux,
        ResponseCode::BusReset => ResponseCode::BusResetMux,
        code => code,
    }
}

/// Program the mux described by `cfg`, retrying the raw write up to
/// `attempts` times.
pub fn select_channel<H: I2cHardware + ?Sized>(
    i2c: &H,
    cfg: &MuxChannelConfig,
    attempts: u8,
) -> Result<(), ResponseCode> {
    let value = cfg.channel_mask()?;
    write_with_retry(i2c, cfg.bus, cfg.address, &[value], attempts).map_err(
        |code| {
            let code = mux_error(code);
            log::error!(
                "mux {:?}@{:#04x} select {:?} failed: {:?}",
                cfg.bus,
                cfg.address,
                cfg.segment,
                code
            );
            code
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use drv_i2c_types::mock::MockI2cHardware;

    const CARD_MUX: MuxChannelConfig = MuxChannelConfig::new(
        Controller::I2C8,
        0x74,
        MuxKind::Pca9548a,
        Segment::S6,
    );

    #[test]
    fn select_writes_channel_mask() {
        let hw = MockI2cHardware::new();
        hw.add_device(Controller::I2C8, 0x74);

        select_channel(&hw, &CARD_MUX, 5).unwrap();

        assert_eq!(
            hw.last_write(Controller::I2C8, 0x74).as_deref(),
            Some(&[0b0010_0000][..])
        );
    }

    #[test]
    fn select_retries_transient_failures() {
        let hw = MockI2cHardware::new();
        hw.add_device(Controller::I2C8, 0x74);
        hw.fail_device(Controller::I2C8, 0x74, 4);

        assert!(select_channel(&hw, &CARD_MUX, 5).is_ok());
        assert_eq!(hw.transaction_count(), 5);
    }

    #[test]
    fn select_gives_up_after_retries() {
        let hw = MockI2cHardware::new();
        hw.add_device(Controller::I2C8, 0x74);
        hw.fail_device(Controller::I2C8, 0x74, 10);

        assert_eq!(
            select_channel(&hw, &CARD_MUX, 5),
            Err(ResponseCode::BusError)
        );
        assert_eq!(hw.transaction_count(), 5);
        assert_eq!(hw.write_count(Controller::I2C8, 0x74), 0);
    }

    #[test]
    fn missing_mux_is_a_mux_error() {
        let hw = MockI2cHardware::new();
        assert_eq!(
            select_channel(&hw, &CARD_MUX, 1),
            Err(ResponseCode::MuxMissing)
        );
    }

    #[test]
    fn segment_beyond_part_is_rejected_without_bus_traffic() {
        let hw = MockI2cHardware::new();
        hw.add_device(Controller::I2C2, 0x70);
        let cfg = MuxChannelConfig::new(
            Controller::I2C2,
            0x70,
            MuxKind::Tca9543a,
            Segment::S3,
        );

        assert_eq!(
            select_channel(&hw, &cfg, 5),
            Err(ResponseCode::SegmentNotFound)
        );
        assert_eq!(hw.transaction_count(), 0);
    }

    #[test]
    fn on_bus_keeps_mux_path() {
        let cfg = CARD_MUX.on_bus(Controller::I2C7);
        assert_eq!(cfg.bus, Controller::I2C7);
        assert_eq!(cfg.address, 0x74);
        assert_eq!(cfg.segment, Segment::S6);
    }
}
