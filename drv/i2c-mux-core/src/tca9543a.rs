// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Driver for the TCA9543A two-channel I2C mux
//!
//! Bits 4 and 5 of the control register report the downstream interrupt
//! lines; they are read-only and always written as zero.

use crate::I2cMuxDriver;
use bitfield::bitfield;
use drv_i2c_types::{ResponseCode, Segment};

bitfield! {
    #[derive(Copy, Clone, Eq, PartialEq)]
    pub struct ControlRegister(u8);
    pub int1, _: 5;
    pub int0, _: 4;
    channel1_enabled, set_channel1_enabled: 1;
    channel0_enabled, set_channel0_enabled: 0;
}

pub struct Tca9543a;

impl I2cMuxDriver for Tca9543a {
    fn segments(&self) -> u8 {
        2
    }

    fn control_value(
        &self,
        segment: Option<Segment>,
    ) -> Result<u8, ResponseCode> {
        let mut reg = ControlRegister(0);

        match segment {
            None => {}
            Some(Segment::S1) => reg.set_channel0_enabled(true),
            Some(Segment::S2) => reg.set_channel1_enabled(true),
            Some(_) => return Err(ResponseCode::SegmentNotFound),
        }

        Ok(reg.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_bits() {
        assert_eq!(Tca9543a.control_value(Some(Segment::S1)), Ok(0x01));
        assert_eq!(Tca9543a.control_value(Some(Segment::S2)), Ok(0x02));
        assert_eq!(Tca9543a.control_value(None), Ok(0x00));
    }

    #[test]
    fn interrupt_bits_decode() {
        let reg = ControlRegister(0x31);
        assert!(reg.int0());
        assert!(reg.int1());
        assert!(reg.channel0_enabled());
        assert!(!reg.channel1_enabled());
    }

    #[test]
    fn only_two_segments() {
        assert_eq!(
            Tca9543a.control_value(Some(Segment::S3)),
            Err(ResponseCode::SegmentNotFound)
        );
    }
}
