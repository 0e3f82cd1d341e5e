// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Readiness gate for the drives on the accelerator cards
//!
//! A drive that is still booting answers on the bus but reports a zero
//! temperature or sets the not-ready flag. That is not a failure: the
//! sensor is parked (`PollingDisabled`) and the read skipped until the
//! drive says otherwise.

use crate::descriptor::SensorDescriptor;
use crate::fleet::{DriveInfo, FirmwareInfo};
use crate::{Board, HookError, HookResult, Platform};
use bus_mutex::RawBusMutex;
use drv_i2c_types::{
    read_block_with_retry, read_reg_with_retry, Controller, I2cHardware,
    ResponseCode,
};
use task_sensor_api::{CacheStatus, ReadAction};
use zerocopy::FromBytes;
use zerocopy_derive::{FromBytes, Immutable, KnownLayout};

pub const DRIVE_1_ADDR: u8 = 0x6a;
pub const DRIVE_2_ADDR: u8 = 0x6b;

pub const STATUS_OFFSET: u8 = 0x00;
pub const FIRMWARE_INFO_OFFSET: u8 = 0x20;

const NOT_READY: u8 = 1 << 6;

/// NVMe-MI basic management status block.
#[derive(Copy, Clone, Debug, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DriveStatusBlock {
    pub length: u8,
    pub flags: u8,
    pub warnings: u8,
    /// Composite temperature; 0 until the drive has a reading
    pub temperature: u8,
    _reserved: [u8; 4],
}

impl DriveStatusBlock {
    pub fn is_ready(&self) -> bool {
        self.temperature != 0 && self.flags & NOT_READY == 0
    }
}

#[derive(Copy, Clone, Debug, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct FirmwareInfoBlock {
    pub flags: u8,
    pub module_identifier: u8,
    pub vendor_id: [u8; 2],
    pub version: [u8; 4],
    _reserved: [u8; 8],
}

impl FirmwareInfoBlock {
    /// `Ok(None)` if the drive doesn't answer identification at all,
    /// `Err(DriveNotReady)` if it will, but not yet.
    pub fn decode(&self) -> Result<Option<FirmwareInfo>, HookError> {
        if self.flags & NOT_READY != 0 {
            return Err(HookError::DriveNotReady);
        }
        match self.module_identifier {
            0x00 | 0xff => Ok(None),
            module_identifier => Ok(Some(FirmwareInfo {
                module_identifier,
                vendor_id: u16::from_be_bytes(self.vendor_id),
                version: self.version,
            })),
        }
    }
}

/// Drive index on a card for a drive address.
pub fn drive_index(address: u8) -> Option<usize> {
    match address {
        DRIVE_1_ADDR => Some(0),
        DRIVE_2_ADDR => Some(1),
        _ => None,
    }
}

impl<H, M, B> Platform<'_, H, M, B>
where
    H: I2cHardware + ?Sized,
    M: RawBusMutex,
    B: Board + ?Sized,
{
    /// Runs with the card's mux path already selected and held.
    pub fn pre_drive_read(
        &self,
        desc: &SensorDescriptor,
        card: u8,
    ) -> HookResult {
        let (bus, address) = desc.i2c_target()?;
        let Some(drive) = drive_index(address) else {
            log::error!("unknown drive address {:#04x}", address);
            return Err(HookError::UnknownDevice(address));
        };

        let mut raw = [0u8; core::mem::size_of::<DriveStatusBlock>()];
        read_reg_with_retry(
            self.i2c,
            bus,
            address,
            STATUS_OFFSET,
            &mut raw,
            self.config.drive_retries,
        )
        .map_err(|code| {
            log::error!(
                "card {} drive {} status read failed: {:?}",
                card,
                drive + 1,
                code
            );
            HookError::Bus(code)
        })?;
        let status = DriveStatusBlock::read_from_bytes(&raw)
            .map_err(|_| HookError::Bus(ResponseCode::BadResponse))?;

        if !status.is_ready() {
            desc.state.set_cache_status(CacheStatus::PollingDisabled);
            self.fleet.update_drive(card, drive, |d| d.ready = false);
            log::debug!("card {} drive {} not ready", card, drive + 1);
            return Ok(ReadAction::Skip);
        }

        desc.state
            .swap_cache_status(CacheStatus::PollingDisabled, CacheStatus::Init);
        self.fleet.update_drive(card, drive, |d| d.ready = true);

        let cached = self
            .fleet
            .drive(card, drive)
            .is_some_and(|d| d.info.is_some());
        if !cached {
            let info = self.read_firmware_info(bus, address)?;
            self.fleet.update_drive(card, drive, |d| d.info = Some(info));
        }

        Ok(ReadAction::Proceed)
    }

    fn read_firmware_info(
        &self,
        bus: Controller,
        address: u8,
    ) -> Result<DriveInfo, HookError> {
        let mut raw = [0u8; core::mem::size_of::<FirmwareInfoBlock>()];
        read_block_with_retry(
            self.i2c,
            bus,
            address,
            FIRMWARE_INFO_OFFSET,
            &mut raw,
            self.config.drive_retries,
        )
        .map_err(|code| {
            log::error!("drive {:#04x} firmware info read failed", address);
            HookError::Bus(code)
        })?;
        let block = FirmwareInfoBlock::read_from_bytes(&raw)
            .map_err(|_| HookError::Bus(ResponseCode::BadResponse))?;

        match block.decode()? {
            Some(info) => {
                log::info!(
                    "drive {:#04x}: module {:#04x} vendor {:#06x}",
                    address,
                    info.module_identifier,
                    info.vendor_id
                );
                Ok(DriveInfo::Known(info))
            }
            None => Ok(DriveInfo::NotSupported),
        }
    }
}
