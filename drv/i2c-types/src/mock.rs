// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scriptable mock I2C hardware for host-side tests
//!
//! Devices are registered by (controller, address). Reads of a register
//! that has canned contents return those contents; any other read returns
//! the predictable pattern `addr + index + 0x10`. Pure writes are counted
//! per device and the last one is kept, which is how tests observe mux
//! programming and PMBus page selects.

use crate::{Controller, I2cHardware, ReservedAddress, ResponseCode};
use heapless::Vec;
use num_traits::FromPrimitive;
use spin::Mutex;

const MAX_DEVICES: usize = 32;
const MAX_REGISTERS: usize = 64;
const MAX_WRITE: usize = 8;
const MAX_REGISTER_DATA: usize = 32;

#[derive(Debug)]
struct Device {
    controller: Controller,
    addr: u8,
    /// Number of upcoming transactions that fail with `BusError`
    fail_budget: u32,
    writes: u32,
    last_write: Vec<u8, MAX_WRITE>,
}

#[derive(Debug)]
struct Register {
    controller: Controller,
    addr: u8,
    reg: u8,
    data: Vec<u8, MAX_REGISTER_DATA>,
}

#[derive(Debug, Default)]
struct MockState {
    devices: Vec<Device, MAX_DEVICES>,
    registers: Vec<Register, MAX_REGISTERS>,
    force_error: Option<ResponseCode>,
    transactions: u32,
}

impl MockState {
    fn device_mut(
        &mut self,
        controller: Controller,
        addr: u8,
    ) -> Option<&mut Device> {
        self.devices
            .iter_mut()
            .find(|d| d.controller == controller && d.addr == addr)
    }

    fn register(
        &self,
        controller: Controller,
        addr: u8,
        reg: u8,
    ) -> Option<&Register> {
        self.registers.iter().find(|r| {
            r.controller == controller && r.addr == addr && r.reg == reg
        })
    }
}

/// Mock I2C hardware
///
/// All methods take `&self` so one instance can be shared by concurrently
/// running hooks, exactly like a real controller handle.
#[derive(Debug, Default)]
pub struct MockI2cHardware {
    state: Mutex<MockState>,
}

impl MockI2cHardware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device that will respond to I2C operations
    pub fn add_device(&self, controller: Controller, addr: u8) {
        let mut state = self.state.lock();
        if state.device_mut(controller, addr).is_some() {
            return;
        }
        let _ = state.devices.push(Device {
            controller,
            addr,
            fail_budget: 0,
            writes: 0,
            last_write: Vec::new(),
        });
    }

    /// Set the bytes returned when register `reg` of a device is read. The
    /// device is added if it isn't present yet.
    pub fn set_register(
        &self,
        controller: Controller,
        addr: u8,
        reg: u8,
        data: &[u8],
    ) {
        self.add_device(controller, addr);
        let mut state = self.state.lock();
        let mut contents = Vec::new();
        let _ = contents.extend_from_slice(
            &data[..data.len().min(MAX_REGISTER_DATA)],
        );
        if let Some(r) = state.registers.iter_mut().find(|r| {
            r.controller == controller && r.addr == addr && r.reg == reg
        }) {
            r.data = contents;
            return;
        }
        let _ = state.registers.push(Register {
            controller,
            addr,
            reg,
            data: contents,
        });
    }

    /// Make next operation fail with specified error
    pub fn inject_error(&self, error: ResponseCode) {
        self.state.lock().force_error = Some(error);
    }

    /// Make the next `count` transactions addressed to one device fail with
    /// `BusError`.
    pub fn fail_device(&self, controller: Controller, addr: u8, count: u32) {
        if let Some(d) = self.state.lock().device_mut(controller, addr) {
            d.fail_budget = count;
        }
    }

    /// Number of successful pure writes (no read phase) to a device.
    pub fn write_count(&self, controller: Controller, addr: u8) -> u32 {
        self.state
            .lock()
            .device_mut(controller, addr)
            .map(|d| d.writes)
            .unwrap_or(0)
    }

    /// Payload of the most recent successful pure write to a device.
    pub fn last_write(
        &self,
        controller: Controller,
        addr: u8,
    ) -> Option<Vec<u8, MAX_WRITE>> {
        self.state
            .lock()
            .device_mut(controller, addr)
            .filter(|d| d.writes > 0)
            .map(|d| d.last_write.clone())
    }

    /// Total number of transactions attempted, failed ones included.
    pub fn transaction_count(&self) -> u32 {
        self.state.lock().transactions
    }

    fn transfer(
        &self,
        controller: Controller,
        addr: u8,
        write_data: &[u8],
        read_buffer: &mut [u8],
    ) -> Result<usize, ResponseCode> {
        let mut state = self.state.lock();
        state.transactions = state.transactions.wrapping_add(1);

        if let Some(error) = state.force_error.take() {
            return Err(error);
        }

        if ReservedAddress::from_u8(addr).is_some() {
            return Err(ResponseCode::ReservedAddress);
        }

        let Some(device) = state.device_mut(controller, addr) else {
            return Err(ResponseCode::NoDevice);
        };

        if device.fail_budget > 0 {
            device.fail_budget -= 1;
            return Err(ResponseCode::BusError);
        }

        if read_buffer.is_empty() {
            device.writes += 1;
            device.last_write.clear();
            let _ = device.last_write.extend_from_slice(
                &write_data[..write_data.len().min(MAX_WRITE)],
            );
            return Ok(0);
        }

        let canned = write_data
            .first()
            .and_then(|&reg| state.register(controller, addr, reg));

        match canned {
            Some(r) => {
                read_buffer.fill(0);
                let n = r.data.len().min(read_buffer.len());
                read_buffer[..n].copy_from_slice(&r.data[..n]);
                Ok(n)
            }
            None => {
                for (i, slot) in read_buffer.iter_mut().enumerate() {
                    *slot = (addr.wrapping_add(i as u8)).wrapping_add(0x10);
                }
                Ok(read_buffer.len())
            }
        }
    }
}

impl I2cHardware for MockI2cHardware {
    type Error = ResponseCode;

    fn write_read(
        &self,
        controller: Controller,
        addr: u8,
        write_data: &[u8],
        read_buffer: &mut [u8],
    ) -> Result<usize, Self::Error> {
        self.transfer(controller, addr, write_data, read_buffer)
    }

    fn write_read_block(
        &self,
        controller: Controller,
        addr: u8,
        write_data: &[u8],
        read_buffer: &mut [u8],
    ) -> Result<usize, Self::Error> {
        // Canned register contents are the block payload, without the
        // length byte.
        self.transfer(controller, addr, write_data, read_buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_mock_functionality() {
        let mock = MockI2cHardware::new();
        mock.add_device(Controller::I2C0, 0x50);

        let mut buf = [0u8; 4];
        let bytes_read =
            mock.write_read(Controller::I2C0, 0x50, &[], &mut buf).unwrap();

        assert_eq!(bytes_read, 4);
        assert_eq!(buf, [0x60, 0x61, 0x62, 0x63]); // 0x50 + 0x10 + index
    }

    #[test]
    fn test_error_injection() {
        let mock = MockI2cHardware::new();
        mock.add_device(Controller::I2C0, 0x50);

        mock.inject_error(ResponseCode::BusLocked);

        let mut buf = [0u8; 1];
        let result = mock.write_read(Controller::I2C0, 0x50, &[], &mut buf);
        assert_eq!(result, Err(ResponseCode::BusLocked));

        // Only the next operation fails.
        assert!(mock.write_read(Controller::I2C0, 0x50, &[], &mut buf).is_ok());
    }

    #[test]
    fn test_no_device_error() {
        let mock = MockI2cHardware::new();

        let mut buf = [0u8; 1];
        let result = mock.write_read(Controller::I2C0, 0x50, &[], &mut buf);

        assert_eq!(result, Err(ResponseCode::NoDevice));
    }

    #[test]
    fn test_reserved_address() {
        let mock = MockI2cHardware::new();
        let result = mock.write_read(Controller::I2C2, 0x00, &[1], &mut []);
        assert_eq!(result, Err(ResponseCode::ReservedAddress));
    }

    #[test]
    fn canned_register_contents() {
        let mock = MockI2cHardware::new();
        mock.set_register(Controller::I2C8, 0x6a, 0x00, &[7, 0, 0, 35]);

        let mut buf = [0xffu8; 6];
        let n = mock
            .write_read(Controller::I2C8, 0x6a, &[0x00], &mut buf)
            .unwrap();
        assert_eq!(n, 4);
        assert_eq!(buf, [7, 0, 0, 35, 0, 0]);

        mock.set_register(Controller::I2C8, 0x6a, 0x00, &[7, 0, 0, 36]);
        mock.write_read(Controller::I2C8, 0x6a, &[0x00], &mut buf)
            .unwrap();
        assert_eq!(buf[3], 36);
    }

    #[test]
    fn writes_are_recorded() {
        let mock = MockI2cHardware::new();
        mock.add_device(Controller::I2C4, 0x70);

        assert_eq!(mock.last_write(Controller::I2C4, 0x70), None);
        mock.write_read(Controller::I2C4, 0x70, &[0x02], &mut [])
            .unwrap();
        mock.write_read(Controller::I2C4, 0x70, &[0x01], &mut [])
            .unwrap();

        assert_eq!(mock.write_count(Controller::I2C4, 0x70), 2);
        assert_eq!(
            mock.last_write(Controller::I2C4, 0x70).as_deref(),
            Some(&[0x01][..])
        );
    }

    #[test]
    fn fail_budget_is_per_device() {
        let mock = MockI2cHardware::new();
        mock.add_device(Controller::I2C2, 0x70);
        mock.add_device(Controller::I2C2, 0x71);
        mock.fail_device(Controller::I2C2, 0x70, 2);

        for _ in 0..2 {
            assert_eq!(
                mock.write_read(Controller::I2C2, 0x70, &[1], &mut []),
                Err(ResponseCode::BusError)
            );
        }
        assert!(mock.write_read(Controller::I2C2, 0x71, &[1], &mut []).is_ok());
        assert!(mock.write_read(Controller::I2C2, 0x70, &[1], &mut []).is_ok());
        assert_eq!(mock.write_count(Controller::I2C2, 0x70), 1);
        assert_eq!(mock.transaction_count(), 4);
    }
}
