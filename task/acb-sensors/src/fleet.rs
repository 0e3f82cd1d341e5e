// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Presence and init state of the accelerator cards
//!
//! Presence is written by the presence/power-good poller; init state and
//! drive readiness by the access gate and the drive hook. Each card has its
//! own slot, so work on different cards never contends.

use crate::bsp::CARD_COUNT;
use bus_mutex::LockToken;
use spin::Mutex;

/// Identification a drive reports once, cached after the first read.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FirmwareInfo {
    pub module_identifier: u8,
    pub vendor_id: u16,
    pub version: [u8; 4],
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DriveInfo {
    Known(FirmwareInfo),
    /// Drive doesn't implement the identification block
    NotSupported,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DriveSlot {
    pub ready: bool,
    pub info: Option<DriveInfo>,
}

#[derive(Debug)]
pub struct CardPresence {
    pub present: bool,
    /// Per-ASIC presence; ASIC n carries drive n
    pub asic: [bool; 2],
    /// Every sensor on the card has been through device init
    pub init_done: bool,
    pub drives: [DriveSlot; 2],
    /// Card bus lock held between the two halves of a mux switch
    mux_token: Option<LockToken>,
}

impl CardPresence {
    const fn absent() -> Self {
        Self {
            present: false,
            asic: [false; 2],
            init_done: false,
            drives: [DriveSlot {
                ready: false,
                info: None,
            }; 2],
            mux_token: None,
        }
    }
}

pub struct FleetState {
    cards: [Mutex<CardPresence>; CARD_COUNT],
}

impl FleetState {
    pub const fn new() -> Self {
        #[allow(clippy::declare_interior_mutable_const)]
        const EMPTY: Mutex<CardPresence> = Mutex::new(CardPresence::absent());
        Self {
            cards: [EMPTY; CARD_COUNT],
        }
    }

    /// Run `f` on a card's slot. `None` for a card number past the end.
    pub fn with_card<R>(
        &self,
        card: u8,
        f: impl FnOnce(&mut CardPresence) -> R,
    ) -> Option<R> {
        self.cards
            .get(usize::from(card))
            .map(|slot| f(&mut *slot.lock()))
    }

    pub fn set_present(&self, card: u8, present: bool, asic: [bool; 2]) {
        self.with_card(card, |c| {
            c.present = present;
            c.asic = asic;
            if !present {
                c.init_done = false;
                c.drives = [DriveSlot::default(); 2];
            }
        });
    }

    pub fn is_present(&self, card: u8) -> bool {
        self.with_card(card, |c| c.present).unwrap_or(false)
    }

    pub fn asic_presence(&self, card: u8) -> [bool; 2] {
        self.with_card(card, |c| c.asic).unwrap_or([false; 2])
    }

    pub fn is_initialized(&self, card: u8) -> bool {
        self.with_card(card, |c| c.init_done).unwrap_or(false)
    }

    pub fn set_initialized(&self, card: u8, done: bool) {
        self.with_card(card, |c| c.init_done = done);
    }

    pub fn drive(&self, card: u8, drive: usize) -> Option<DriveSlot> {
        self.with_card(card, |c| c.drives.get(drive).copied())
            .flatten()
    }

    pub(crate) fn update_drive(
        &self,
        card: u8,
        drive: usize,
        f: impl FnOnce(&mut DriveSlot),
    ) {
        self.with_card(card, |c| {
            if let Some(slot) = c.drives.get_mut(drive) {
                f(slot);
            }
        });
    }

    /// Park the card bus lock. Returns a token that was already parked.
    pub(crate) fn stash_mux_token(
        &self,
        card: u8,
        token: LockToken,
    ) -> Result<Option<LockToken>, LockToken> {
        match self.cards.get(usize::from(card)) {
            Some(slot) => Ok(slot.lock().mux_token.replace(token)),
            None => Err(token),
        }
    }

    pub(crate) fn take_mux_token(&self, card: u8) -> Option<LockToken> {
        self.with_card(card, |c| c.mux_token.take()).flatten()
    }
}

impl Default for FleetState {
    fn default() -> Self {
        Self::new()
    }
}
