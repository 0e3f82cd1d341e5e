// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::RawBusMutex;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Bus lock for host builds, where waiters sleep on a condition variable
/// instead of spinning.
#[derive(Debug, Default)]
pub struct HostBusMutex {
    locked: Mutex<bool>,
    freed: Condvar,
}

impl HostBusMutex {
    pub const fn new() -> Self {
        Self {
            locked: Mutex::new(false),
            freed: Condvar::new(),
        }
    }
}

impl RawBusMutex for HostBusMutex {
    fn try_lock_for(&self, timeout_ms: u32) -> bool {
        let guard = self.locked.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut locked, _) = self
            .freed
            .wait_timeout_while(
                guard,
                Duration::from_millis(u64::from(timeout_ms)),
                |locked| *locked,
            )
            .unwrap_or_else(PoisonError::into_inner);

        if *locked {
            return false;
        }
        *locked = true;
        true
    }

    fn unlock(&self) {
        *self.locked.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.freed.notify_one();
    }
}
