// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pre-/post-read hooks
//!
//! A pre-read hook that returns `Ok` may leave a bus lock parked in the
//! descriptor; the matching [`Platform::post_read`] takes it back out and
//! releases it. A pre-read hook that fails has already released anything
//! it took, so the engine must not run post-read after a failed pre-read
//! (running it anyway is harmless: the slot is empty).

use crate::bsp;
use crate::descriptor::{SensorDescriptor, SensorHook};
use crate::{Board, HookError, HookResult, Platform};
use bus_mutex::RawBusMutex;
use drv_i2c_mux_core::{select_channel, MuxChannelConfig};
use drv_i2c_types::{write_with_retry, I2cHardware};
use task_sensor_api::{ReadAction, Reading, SensorNum};

impl<H, M, B> Platform<'_, H, M, B>
where
    H: I2cHardware + ?Sized,
    M: RawBusMutex,
    B: Board + ?Sized,
{
    pub fn pre_read(&self, desc: &SensorDescriptor) -> HookResult {
        match desc.hook {
            SensorHook::None => Ok(ReadAction::Proceed),
            SensorHook::PowerMonitor { mux, card } => {
                self.pre_ina233_read(desc, mux, card)
            }
            SensorHook::VrPage(page) => self.pre_xdpe15284_read(desc, page),
            SensorHook::PexSwitch { mux } => self.pre_pex89000_read(desc, mux),
            SensorHook::DriveReady { card } => self.pre_drive_read(desc, card),
        }
    }

    /// Release whatever the pre-read hook left held. Safe to call when
    /// nothing is held.
    pub fn post_read(
        &self,
        desc: &SensorDescriptor,
        _reading: &Reading,
    ) -> Result<(), HookError> {
        match desc.take_token() {
            Some(token) => self.unlock_bus(token).map_err(|err| {
                log::error!(
                    "sensor {:#04x}: post-read unlock failed",
                    desc.num.0
                );
                err
            }),
            None => Ok(()),
        }
    }

    /// 12 V card rail monitors on bus 4. An absent card turns polling off
    /// for the sensor without touching the bus.
    pub fn pre_ina233_read(
        &self,
        desc: &SensorDescriptor,
        mux: MuxChannelConfig,
        card: u8,
    ) -> HookResult {
        let (bus, _) = desc.i2c_target()?;

        if !self.fleet.is_present(card) {
            desc.state.set_polling(false);
            log::debug!("sensor {:#04x}: card {} absent", desc.num.0, card);
            return Err(HookError::CardAbsent(card));
        }

        let token = self.lock_bus(bus)?;
        if let Err(code) =
            select_channel(self.i2c, &mux.on_bus(bus), self.config.mux_retries)
        {
            log::error!("sensor {:#04x}: ina233 mux switch failed", desc.num.0);
            let _ = self.unlock_bus(token);
            return Err(HookError::MuxSelect(code));
        }

        self.hold(desc, token);
        Ok(ReadAction::Proceed)
    }

    /// VR controller: select the PMBus page for this rail. The page stays
    /// selected until the post-read hook gives the bus back.
    pub fn pre_xdpe15284_read(
        &self,
        desc: &SensorDescriptor,
        page: u8,
    ) -> HookResult {
        let (bus, address) = desc.i2c_target()?;
        let token = self.lock_bus(bus)?;

        if let Err(code) = write_with_retry(
            self.i2c,
            bus,
            address,
            &[bsp::PMBUS_PAGE, page],
            self.config.vr_page_retries,
        ) {
            log::error!("set xdpe15284 page {} failed: {:?}", page, code);
            let _ = self.unlock_bus(token);
            return Err(HookError::PageSelect(code));
        }

        self.hold(desc, token);
        Ok(ReadAction::Proceed)
    }

    /// PCIe switch behind a TCA9543A. Needs DC power for both the mux and
    /// the switch; the switch is initialised on first access, with a
    /// bounded number of attempts per device.
    pub fn pre_pex89000_read(
        &self,
        desc: &SensorDescriptor,
        mux: MuxChannelConfig,
    ) -> HookResult {
        if !self.is_acb_power_good() {
            return Err(HookError::PowerOff);
        }

        let (bus, _) = desc.i2c_target()?;
        let Some(init) = desc.init.and_then(|slot| self.devices.get(slot))
        else {
            log::error!("pex sensor {:#04x} has no init state", desc.num.0);
            return Err(HookError::NoInitState);
        };

        let token = self.lock_bus(bus)?;
        if let Err(code) =
            select_channel(self.i2c, &mux.on_bus(bus), self.config.mux_retries)
        {
            log::error!("pex switch mux fail");
            let _ = self.unlock_bus(token);
            return Err(HookError::MuxSelect(code));
        }

        if !init.is_initialized() {
            if init.attempts() >= self.config.pex_init_attempts {
                let _ = self.unlock_bus(token);
                return Err(HookError::InitRetriesExhausted);
            }

            let attempt = init.note_attempt();
            if !self.board.init_sensor(desc, Some(init)) {
                log::error!(
                    "pex init failed (attempt {}/{})",
                    attempt,
                    self.config.pex_init_attempts
                );
                let _ = self.unlock_bus(token);
                return Err(HookError::DeviceInit);
            }
            init.mark_initialized();
        }

        self.hold(desc, token);
        Ok(ReadAction::Proceed)
    }

    /// Route the card bus to one card sensor: the card-select mux, then
    /// the channel mux on the card, under the card bus lock. The lock stays
    /// held (parked in the fleet state) until
    /// [`post_card_mux_switch`](Self::post_card_mux_switch).
    pub fn pre_card_mux_switch(
        &self,
        sensor: SensorNum,
        card: u8,
    ) -> Result<(), HookError> {
        let Some(card_mux) = bsp::accl_mux_config(card) else {
            log::error!("invalid accl card id: {:#04x}", card);
            return Err(HookError::BadCard(card));
        };
        let channel_mux = self.accl.mux_channel_config(card, sensor)?;

        let token = self.lock_bus(card_mux.bus)?;
        for mux in [card_mux, channel_mux] {
            if let Err(code) =
                select_channel(self.i2c, &mux, self.config.mux_retries)
            {
                log::error!("card {} mux switch failed", card);
                let _ = self.unlock_bus(token);
                return Err(HookError::MuxSelect(code));
            }
        }

        match self.fleet.stash_mux_token(card, token) {
            Ok(None) => Ok(()),
            Ok(Some(stale)) => {
                log::warn!("card {}: previous mux switch never released", card);
                let _ = self.unlock_bus(stale);
                Ok(())
            }
            Err(token) => {
                let _ = self.unlock_bus(token);
                Err(HookError::BadCard(card))
            }
        }
    }

    pub fn post_card_mux_switch(&self, card: u8) -> Result<(), HookError> {
        if bsp::accl_mux_config(card).is_none() {
            log::error!("invalid accl card id: {:#04x}", card);
            return Err(HookError::BadCard(card));
        }
        match self.fleet.take_mux_token(card) {
            Some(token) => self.unlock_bus(token),
            None => Ok(()),
        }
    }
}
