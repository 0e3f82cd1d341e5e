// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-bus locks for buses that front an I2C mux.
//!
//! Programming a mux changes what every other device on that bus sees, so
//! a mux select and the transaction that depends on it have to happen under
//! one lock. The registry holds one [`BusMutex`] per contended bus, built
//! once at startup from the board's table and handed to the hook layer by
//! reference.
//!
//! Ownership is explicit: [`BusMutex::acquire`] hands out a [`LockToken`]
//! stamped with a fresh generation, and only that token can release the
//! lock. A token from an earlier acquisition (or another bus) is rejected
//! and the lock stays with its current owner, so a second release from a
//! failure path can never unlock somebody else's critical section.
//!
//! The blocking primitive underneath is abstracted by [`RawBusMutex`]:
//! [`SpinBusMutex`] for the firmware image, `HostBusMutex` (feature `std`)
//! for simulation and tests.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

use core::sync::atomic::{AtomicU32, Ordering};
use drv_i2c_types::Controller;

mod spin_lock;
pub use spin_lock::{Clock, SpinBusMutex};

#[cfg(any(test, feature = "std"))]
mod host;
#[cfg(any(test, feature = "std"))]
pub use host::HostBusMutex;

/// A lock that can be taken with a bounded wait and released from a
/// different call than the one that took it.
pub trait RawBusMutex {
    /// Take the lock, waiting at most `timeout_ms`. Returns `false` on
    /// timeout.
    fn try_lock_for(&self, timeout_ms: u32) -> bool;

    /// Release the lock. Only called by [`BusMutex`] on behalf of the
    /// current owner.
    fn unlock(&self);
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LockError {
    /// Lock not acquired within the timeout
    Timeout,
    /// Lock is not held; there is nothing to release
    NotHeld,
    /// Token is from an earlier acquisition or for a different bus
    NotOwner,
}

/// Proof of ownership of one bus lock, returned by
/// [`BusMutex::acquire`] and consumed by release.
#[must_use = "dropping a token without releasing it leaves the bus locked"]
#[derive(Debug, Eq, PartialEq)]
pub struct LockToken {
    bus: Controller,
    generation: u32,
}

impl LockToken {
    pub fn bus(&self) -> Controller {
        self.bus
    }
}

/// Snapshot of a lock's counters.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LockStats {
    pub acquired: u32,
    pub timeouts: u32,
    pub released: u32,
    /// Releases refused because the lock wasn't held or the token was stale
    pub rejected: u32,
}

impl LockStats {
    /// Number of acquisitions not yet released.
    pub fn outstanding(&self) -> u32 {
        self.acquired.wrapping_sub(self.released)
    }
}

pub struct BusMutex<M> {
    bus: Controller,
    name: &'static str,
    raw: M,
    /// Generation of the current owner's token, 0 when free
    holder: AtomicU32,
    next_generation: AtomicU32,
    acquired: AtomicU32,
    timeouts: AtomicU32,
    released: AtomicU32,
    rejected: AtomicU32,
}

impl<M: RawBusMutex> BusMutex<M> {
    pub const fn new(bus: Controller, name: &'static str, raw: M) -> Self {
        Self {
            bus,
            name,
            raw,
            holder: AtomicU32::new(0),
            next_generation: AtomicU32::new(1),
            acquired: AtomicU32::new(0),
            timeouts: AtomicU32::new(0),
            released: AtomicU32::new(0),
            rejected: AtomicU32::new(0),
        }
    }

    pub fn bus(&self) -> Controller {
        self.bus
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Take the lock, blocking for at most `timeout_ms`.
    pub fn acquire(&self, timeout_ms: u32) -> Result<LockToken, LockError> {
        if !self.raw.try_lock_for(timeout_ms) {
            self.timeouts.fetch_add(1, Ordering::Relaxed);
            log::error!("{}: lock timed out after {} ms", self.name, timeout_ms);
            return Err(LockError::Timeout);
        }

        let generation = self.fresh_generation();
        self.holder.store(generation, Ordering::Release);
        self.acquired.fetch_add(1, Ordering::Relaxed);
        log::trace!("{}: locked (gen {})", self.name, generation);

        Ok(LockToken {
            bus: self.bus,
            generation,
        })
    }

    /// Release the lock held by `token`. A stale token or a lock that is
    /// already free is refused without touching the lock.
    pub fn release(&self, token: LockToken) -> Result<(), LockError> {
        if token.bus != self.bus {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            log::error!(
                "{}: refusing release with token for {:?}",
                self.name,
                token.bus
            );
            return Err(LockError::NotOwner);
        }

        match self.holder.compare_exchange(
            token.generation,
            0,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                self.raw.unlock();
                self.released.fetch_add(1, Ordering::Relaxed);
                log::trace!("{}: unlocked (gen {})", self.name, token.generation);
                Ok(())
            }
            Err(0) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                log::warn!("{}: release of a lock that isn't held", self.name);
                Err(LockError::NotHeld)
            }
            Err(current) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                log::error!(
                    "{}: stale release (gen {}, held by gen {})",
                    self.name,
                    token.generation,
                    current
                );
                Err(LockError::NotOwner)
            }
        }
    }

    pub fn is_locked(&self) -> bool {
        self.holder.load(Ordering::Acquire) != 0
    }

    pub fn stats(&self) -> LockStats {
        LockStats {
            acquired: self.acquired.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    fn fresh_generation(&self) -> u32 {
        loop {
            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
            if generation != 0 {
                return generation;
            }
        }
    }
}

/// Fixed map from bus to its lock.
pub struct BusMutexRegistry<M, const N: usize> {
    locks: [BusMutex<M>; N],
}

impl<M: RawBusMutex, const N: usize> BusMutexRegistry<M, N> {
    pub const fn new(locks: [BusMutex<M>; N]) -> Self {
        Self { locks }
    }

    /// The lock for `bus`, or `None` if the bus has no mux contention
    /// point. A `None` here is a board configuration error; callers report
    /// it and don't retry.
    pub fn mutex_for_bus(&self, bus: Controller) -> Option<&BusMutex<M>> {
        self.locks.iter().find(|l| l.bus == bus)
    }

    /// Release a token without first looking up its lock.
    pub fn release(&self, token: LockToken) -> Result<(), LockError> {
        match self.mutex_for_bus(token.bus) {
            Some(lock) => lock.release(token),
            None => {
                log::error!("release for bus {:?} with no lock", token.bus);
                Err(LockError::NotOwner)
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &BusMutex<M>> {
        self.locks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn registry() -> BusMutexRegistry<HostBusMutex, 2> {
        BusMutexRegistry::new([
            BusMutex::new(Controller::I2C2, "i2c2", HostBusMutex::new()),
            BusMutex::new(Controller::I2C8, "i2c8", HostBusMutex::new()),
        ])
    }

    #[test]
    fn unknown_bus_has_no_lock() {
        let locks = registry();
        assert!(locks.mutex_for_bus(Controller::I2C5).is_none());
        assert!(locks.mutex_for_bus(Controller::I2C8).is_some());
    }

    #[test]
    fn acquire_then_release() {
        init_logging();
        let locks = registry();
        let lock = locks.mutex_for_bus(Controller::I2C2).unwrap();

        let token = lock.acquire(10).unwrap();
        assert!(lock.is_locked());
        assert_eq!(token.bus(), Controller::I2C2);
        lock.release(token).unwrap();
        assert!(!lock.is_locked());

        let stats = lock.stats();
        assert_eq!(stats.acquired, 1);
        assert_eq!(stats.released, 1);
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn stale_token_does_not_unlock_new_owner() {
        init_logging();
        let locks = registry();
        let lock = locks.mutex_for_bus(Controller::I2C2).unwrap();

        let first = lock.acquire(10).unwrap();
        let stale = LockToken {
            bus: first.bus,
            generation: first.generation,
        };
        lock.release(first).unwrap();

        let second = lock.acquire(10).unwrap();
        assert_eq!(lock.release(stale), Err(LockError::NotOwner));
        assert!(lock.is_locked());

        lock.release(second).unwrap();
        assert_eq!(lock.stats().rejected, 1);
    }

    #[test]
    fn release_of_free_lock_is_refused() {
        init_logging();
        let locks = registry();
        let lock = locks.mutex_for_bus(Controller::I2C8).unwrap();
        let token = lock.acquire(10).unwrap();
        let copy = LockToken {
            bus: token.bus,
            generation: token.generation,
        };
        lock.release(token).unwrap();

        assert_eq!(lock.release(copy), Err(LockError::NotHeld));
        assert!(!lock.is_locked());
        assert_eq!(lock.stats().released, 1);
    }

    #[test]
    fn token_for_other_bus_is_refused() {
        init_logging();
        let locks = registry();
        let i2c2 = locks.mutex_for_bus(Controller::I2C2).unwrap();
        let i2c8 = locks.mutex_for_bus(Controller::I2C8).unwrap();

        let token = i2c8.acquire(10).unwrap();
        assert_eq!(i2c2.release(token), Err(LockError::NotOwner));
        assert!(i2c8.is_locked());
    }

    #[test]
    fn registry_release_routes_by_bus() {
        let locks = registry();
        let token = locks
            .mutex_for_bus(Controller::I2C8)
            .unwrap()
            .acquire(10)
            .unwrap();
        locks.release(token).unwrap();
        assert!(locks.iter().all(|l| !l.is_locked()));
    }

    #[test]
    fn contended_acquire_times_out_then_succeeds() {
        init_logging();
        let locks = Arc::new(registry());
        let held = locks
            .mutex_for_bus(Controller::I2C2)
            .unwrap()
            .acquire(10)
            .unwrap();

        let waiter = {
            let locks = Arc::clone(&locks);
            thread::spawn(move || {
                let lock = locks.mutex_for_bus(Controller::I2C2).unwrap();
                let start = Instant::now();
                let r = lock.acquire(100);
                (r.is_err(), start.elapsed())
            })
        };
        let (timed_out, elapsed) = waiter.join().unwrap();
        assert!(timed_out);
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(1000));

        let waiter = {
            let locks = Arc::clone(&locks);
            thread::spawn(move || {
                let lock = locks.mutex_for_bus(Controller::I2C2).unwrap();
                let start = Instant::now();
                let token = lock.acquire(5_000).unwrap();
                let elapsed = start.elapsed();
                lock.release(token).unwrap();
                elapsed
            })
        };
        thread::sleep(Duration::from_millis(50));
        locks.release(held).unwrap();
        let elapsed = waiter.join().unwrap();
        assert!(elapsed < Duration::from_millis(2_000));

        let stats = locks.mutex_for_bus(Controller::I2C2).unwrap().stats();
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn mutual_exclusion_under_load() {
        let locks = Arc::new(registry());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    let lock = locks.mutex_for_bus(Controller::I2C8).unwrap();
                    for _ in 0..200 {
                        let token = lock.acquire(10_000).unwrap();
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                        lock.release(token).unwrap();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        let stats = locks.mutex_for_bus(Controller::I2C8).unwrap().stats();
        assert_eq!(stats.acquired, 1600);
        assert_eq!(stats.outstanding(), 0);
        assert_eq!(stats.rejected, 0);
    }
}
