// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::RawBusMutex;
use core::sync::atomic::{AtomicBool, Ordering};

/// Millisecond time source used to bound lock waits.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Bus lock for the firmware image: an atomic flag polled until it can be
/// taken or the clock says the wait is over.
pub struct SpinBusMutex<C> {
    locked: AtomicBool,
    clock: C,
}

impl<C> SpinBusMutex<C> {
    pub const fn new(clock: C) -> Self {
        Self {
            locked: AtomicBool::new(false),
            clock,
        }
    }
}

impl<C: Clock> RawBusMutex for SpinBusMutex<C> {
    fn try_lock_for(&self, timeout_ms: u32) -> bool {
        let start = self.clock.now_ms();
        loop {
            if self
                .locked
                .compare_exchange_weak(
                    false,
                    true,
                    Ordering::Acquire,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                return true;
            }
            let waited = self.clock.now_ms().saturating_sub(start);
            if waited >= u64::from(timeout_ms) {
                return false;
            }
            core::hint::spin_loop();
        }
    }

    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BusMutex, LockError};
    use core::sync::atomic::AtomicU64;
    use drv_i2c_types::Controller;

    /// Advances one millisecond every time it's read.
    #[derive(Default)]
    struct TickingClock(AtomicU64);

    impl Clock for &TickingClock {
        fn now_ms(&self) -> u64 {
            self.0.fetch_add(1, Ordering::Relaxed)
        }
    }

    #[test]
    fn free_lock_is_taken_immediately() {
        let clock = TickingClock::default();
        let lock = SpinBusMutex::new(&clock);
        assert!(lock.try_lock_for(0));
        lock.unlock();
        assert!(lock.try_lock_for(0));
    }

    #[test]
    fn held_lock_times_out_on_clock() {
        let clock = TickingClock::default();
        let lock = SpinBusMutex::new(&clock);
        assert!(lock.try_lock_for(10));

        assert!(!lock.try_lock_for(100));
        assert!(clock.0.load(Ordering::Relaxed) >= 100);
    }

    #[test]
    fn bus_mutex_over_spin_lock() {
        let clock = TickingClock::default();
        let bus = BusMutex::new(
            Controller::I2C1,
            "i2c1-xdpe15284",
            SpinBusMutex::new(&clock),
        );

        let token = bus.acquire(50).unwrap();
        assert_eq!(bus.acquire(50), Err(LockError::Timeout));
        bus.release(token).unwrap();
        let token = bus.acquire(50).unwrap();
        bus.release(token).unwrap();

        let stats = bus.stats();
        assert_eq!(stats.acquired, 2);
        assert_eq!(stats.timeouts, 1);
    }
}
