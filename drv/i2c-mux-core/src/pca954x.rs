// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Drivers for the PCA9546A (4 channel) and PCA9548A (8 channel) I2C muxes

use crate::I2cMuxDriver;
use bitfield::bitfield;
use drv_i2c_types::{ResponseCode, Segment};

bitfield! {
    #[derive(Copy, Clone, Eq, PartialEq)]
    pub struct ControlRegister(u8);
    channel7_enabled, set_channel7_enabled: 7;
    channel6_enabled, set_channel6_enabled: 6;
    channel5_enabled, set_channel5_enabled: 5;
    channel4_enabled, set_channel4_enabled: 4;
    channel3_enabled, set_channel3_enabled: 3;
    channel2_enabled, set_channel2_enabled: 2;
    channel1_enabled, set_channel1_enabled: 1;
    channel0_enabled, set_channel0_enabled: 0;
}

fn control_value(
    segment: Option<Segment>,
    segments: u8,
) -> Result<u8, ResponseCode> {
    let mut reg = ControlRegister(0);

    if let Some(segment) = segment {
        if segment.channel() >= segments {
            return Err(ResponseCode::SegmentNotFound);
        }
        match segment {
            Segment::S1 => reg.set_channel0_enabled(true),
            Segment::S2 => reg.set_channel1_enabled(true),
            Segment::S3 => reg.set_channel2_enabled(true),
            Segment::S4 => reg.set_channel3_enabled(true),
            Segment::S5 => reg.set_channel4_enabled(true),
            Segment::S6 => reg.set_channel5_enabled(true),
            Segment::S7 => reg.set_channel6_enabled(true),
            Segment::S8 => reg.set_channel7_enabled(true),
        }
    }

    Ok(reg.0)
}

pub struct Pca9546a;

impl I2cMuxDriver for Pca9546a {
    fn segments(&self) -> u8 {
        4
    }

    fn control_value(
        &self,
        segment: Option<Segment>,
    ) -> Result<u8, ResponseCode> {
        control_value(segment, self.segments())
    }
}

pub struct Pca9548a;

impl I2cMuxDriver for Pca9548a {
    fn segments(&self) -> u8 {
        8
    }

    fn control_value(
        &self,
        segment: Option<Segment>,
    ) -> Result<u8, ResponseCode> {
        control_value(segment, self.segments())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_hot_channel_bits() {
        assert_eq!(Pca9548a.control_value(Some(Segment::S1)), Ok(0x01));
        assert_eq!(Pca9548a.control_value(Some(Segment::S8)), Ok(0x80));
        assert_eq!(Pca9546a.control_value(Some(Segment::S4)), Ok(0x08));
    }

    #[test]
    fn none_disconnects_everything() {
        assert_eq!(Pca9548a.control_value(None), Ok(0));
        assert_eq!(Pca9546a.control_value(None), Ok(0));
    }

    #[test]
    fn pca9546a_has_four_segments() {
        assert_eq!(
            Pca9546a.control_value(Some(Segment::S5)),
            Err(ResponseCode::SegmentNotFound)
        );
    }
}
