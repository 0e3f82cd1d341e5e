// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MCTP routing for the board management controller
//!
//! The router owns no transport of its own. Bindings are brought up, and
//! messages sent, through an [`MctpTransport`]; received messages are
//! classified and handed to a [`MessageHandler`]. What the router does own
//! is the static knowledge: which ports exist, and which endpoint lives
//! behind which bus.

#![cfg_attr(not(test), no_std)]

pub mod platform;

use mctp::MsgType;
use mctp_api::{
    BusRef, ExtParams, MctpPort, MediumConfig, MediumKind, MessageKind,
    RouteEntry, RouteError, SetEidRequest,
};
use zerocopy::IntoBytes;

/// The external MCTP stack, one binding per port index.
pub trait MctpTransport {
    /// Create the binding for `port` and apply its medium configuration.
    fn configure(&mut self, index: usize, port: &MctpPort) -> mctp::Result<()>;

    /// Start receiving on a configured binding.
    fn start(&mut self, index: usize) -> mctp::Result<()>;

    fn send(
        &mut self,
        index: usize,
        ext: &ExtParams,
        typ: MsgType,
        payload: &[u8],
    ) -> mctp::Result<()>;
}

/// Receivers for the message types the board speaks.
pub trait MessageHandler {
    fn control(&mut self, port: usize, buf: &[u8], ext: ExtParams) -> Result<(), RouteError>;
    fn pldm(&mut self, port: usize, buf: &[u8], ext: ExtParams) -> Result<(), RouteError>;
    fn cxl_cci(&mut self, port: usize, buf: &[u8], ext: ExtParams) -> Result<(), RouteError>;
}

pub struct Router<'a, const N: usize> {
    ports: &'a [MctpPort; N],
    routes: &'a [RouteEntry],
    /// I3C bus we are the controller on
    controller_i3c_bus: u8,
    running: [bool; N],
}

impl<'a, const N: usize> Router<'a, N> {
    pub fn new(
        ports: &'a [MctpPort; N],
        routes: &'a [RouteEntry],
        controller_i3c_bus: u8,
    ) -> Self {
        Self {
            ports,
            routes,
            controller_i3c_bus,
            running: [false; N],
        }
    }

    pub fn ports(&self) -> &'a [MctpPort; N] {
        self.ports
    }

    pub fn is_running(&self, index: usize) -> bool {
        self.running.get(index).copied().unwrap_or(false)
    }

    /// Bring up every port. A port whose binding can't be configured or
    /// started is logged and left down; the rest still come up. Returns
    /// how many ports are running.
    pub fn init(&mut self, transport: &mut impl MctpTransport) -> usize {
        for (index, port) in self.ports.iter().enumerate() {
            if let Err(e) = transport.configure(index, port) {
                log::error!("mctp port {} configure failed: {:?}", port.name, e);
                continue;
            }
            match transport.start(index) {
                Ok(()) => {
                    log::info!("mctp port {} up", port.name);
                    self.running[index] = true;
                }
                Err(e) => {
                    log::error!("mctp port {} start failed: {:?}", port.name, e)
                }
            }
        }
        self.running.iter().filter(|&&up| up).count()
    }

    /// Index of the configured port whose medium runs on `bus`.
    pub fn find_port_by_bus(&self, bus: BusRef) -> Option<usize> {
        self.ports.iter().position(|p| p.medium.matches(bus))
    }

    /// Medium and addressing for a route entry.
    pub fn ext_params(&self, entry: &RouteEntry) -> ExtParams {
        let kind = match entry.bus {
            BusRef::I3c(bus) if bus == self.controller_i3c_bus => {
                MediumKind::ControllerI3c
            }
            BusRef::I3c(_) => MediumKind::TargetI3c,
            BusRef::I2c(_) => MediumKind::Smbus,
            BusRef::Serial(_) => MediumKind::Serial,
        };
        ExtParams {
            kind,
            addr: entry.addr,
            eid: entry.eid,
        }
    }

    /// Where to send a message for endpoint `eid`: a running port and the
    /// addressing to use on it.
    pub fn resolve_route(&self, eid: u8) -> Result<(usize, ExtParams), RouteError> {
        let entry = self
            .routes
            .iter()
            .find(|r| r.eid == eid)
            .ok_or(RouteError::NoRoute(eid))?;
        let port = self
            .find_port_by_bus(entry.bus)
            .filter(|&i| self.is_running(i))
            .ok_or(RouteError::NoPort(entry.bus))?;
        Ok((port, self.ext_params(entry)))
    }

    /// Hand a received message to the handler for its type.
    pub fn dispatch(
        &self,
        port: usize,
        buf: &[u8],
        ext: ExtParams,
        handler: &mut impl MessageHandler,
    ) -> Result<(), RouteError> {
        let kind = MessageKind::classify(buf).map_err(|e| {
            log::warn!("no receiver for message from eid {:#04x}: {:?}", ext.eid, e);
            e
        })?;
        match kind {
            MessageKind::Control => handler.control(port, buf, ext),
            MessageKind::Pldm => handler.pldm(port, buf, ext),
            MessageKind::CxlCci => handler.cxl_cci(port, buf, ext),
        }
    }

    /// Send SET_EID to every route flagged for assignment that sits
    /// behind a running SMBus port. Failures are logged per endpoint.
    /// Returns how many requests went out.
    pub fn assign_endpoints(&self, transport: &mut impl MctpTransport) -> usize {
        let mut sent = 0;
        let flagged = self.routes.iter().filter(|r| r.set_endpoint);
        for (instance, entry) in flagged.enumerate() {
            let port = self.ports.iter().enumerate().position(|(i, p)| {
                matches!(p.medium, MediumConfig::Smbus { .. })
                    && p.medium.matches(entry.bus)
                    && self.is_running(i)
            });
            let Some(port) = port else {
                log::error!(
                    "no smbus port for endpoint {:#04x} on {:?}",
                    entry.eid,
                    entry.bus
                );
                continue;
            };

            let ext = ExtParams {
                kind: MediumKind::Smbus,
                addr: entry.addr,
                eid: entry.eid,
            };
            let req = SetEidRequest::set(entry.eid, instance as u8);
            match transport.send(
                port,
                &ext,
                MessageKind::Control.msg_type(),
                req.as_bytes(),
            ) {
                Ok(()) => sent += 1,
                Err(e) => {
                    log::error!("failed to set endpoint {:#04x}: {:?}", entry.eid, e)
                }
            }
        }
        sent
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    const PORTS: [MctpPort; 2] = [
        MctpPort {
            name: "smbus-cxl",
            medium: MediumConfig::Smbus { bus: 6, addr: 0x20 },
        },
        MctpPort {
            name: "smbus-pldm",
            medium: MediumConfig::Smbus { bus: 5, addr: 0x20 },
        },
    ];

    #[test]
    fn failed_port_is_skipped() {
        init_logger();
        let routes = [
            RouteEntry::new(0x2e, BusRef::I2c(6), 0x74),
            RouteEntry::new(0x08, BusRef::I2c(5), 0x10),
        ];
        let mut router = Router::new(&PORTS, &routes, 1);
        let mut transport = FakeTransport {
            fail_configure: vec![0],
            ..Default::default()
        };

        assert_eq!(router.init(&mut transport), 1);
        assert_eq!(transport.configured, vec![1]);
        assert_eq!(
            router.resolve_route(0x2e),
            Err(RouteError::NoPort(BusRef::I2c(6)))
        );
        assert_eq!(router.resolve_route(0x08).map(|(p, _)| p), Ok(1));
    }

    #[test]
    fn start_failure_leaves_port_down() {
        init_logger();
        let mut router = Router::new(&PORTS, &[], 1);
        let mut transport = FakeTransport {
            fail_start: vec![1],
            ..Default::default()
        };
        assert_eq!(router.init(&mut transport), 1);
        assert!(router.is_running(0));
        assert!(!router.is_running(1));
        assert!(!router.is_running(7));
    }

    #[test]
    fn dispatch_by_message_type() {
        init_logger();
        let router = Router::new(&PORTS, &[], 1);
        let ext = ExtParams {
            kind: MediumKind::Smbus,
            addr: 0x74,
            eid: 0x2e,
        };
        let mut handler = Recorder::default();

        router.dispatch(0, &[0x00, 0x80, 0x02], ext, &mut handler).unwrap();
        router.dispatch(1, &[0x81, 0x00], ext, &mut handler).unwrap();
        router.dispatch(0, &[0x08], ext, &mut handler).unwrap();
        assert_eq!(
            handler.seen,
            vec![
                (MessageKind::Control, 0, 0x2e),
                (MessageKind::Pldm, 1, 0x2e),
                (MessageKind::CxlCci, 0, 0x2e),
            ]
        );

        assert_eq!(
            router.dispatch(0, &[0x7e], ext, &mut handler),
            Err(RouteError::UnsupportedType(0x7e))
        );
        assert_eq!(
            router.dispatch(0, &[], ext, &mut handler),
            Err(RouteError::EmptyMessage)
        );
        assert_eq!(handler.seen.len(), 3);
    }

    #[test]
    fn assign_endpoints_sends_set_eid() {
        init_logger();
        let routes = [
            RouteEntry::new(0x2e, BusRef::I2c(6), 0x74).assign_eid(),
            RouteEntry::new(0x08, BusRef::I2c(5), 0x10),
            RouteEntry::new(0x0b, BusRef::I3c(1), 0x09).assign_eid(),
        ];
        let mut router = Router::new(&PORTS, &routes, 1);
        let mut transport = FakeTransport::default();
        router.init(&mut transport);

        // The I3C entry has no SMBus port and is skipped
        assert_eq!(router.assign_endpoints(&mut transport), 1);
        let (port, ext, typ, payload) = &transport.sent[0];
        assert_eq!(*port, 0);
        assert_eq!(
            *ext,
            ExtParams {
                kind: MediumKind::Smbus,
                addr: 0x74,
                eid: 0x2e
            }
        );
        assert_eq!(*typ, 0x00);
        assert_eq!(payload.as_slice(), &[0x80, 0x01, 0x00, 0x2e]);
    }

    #[test]
    fn assign_failure_is_not_fatal() {
        init_logger();
        let routes = [
            RouteEntry::new(0x2e, BusRef::I2c(6), 0x74).assign_eid(),
            RouteEntry::new(0x0a, BusRef::I2c(5), 0x20).assign_eid(),
        ];
        let mut router = Router::new(&PORTS, &routes, 1);
        let mut transport = FakeTransport::default();
        router.init(&mut transport);
        transport.fail_send = true;

        assert_eq!(router.assign_endpoints(&mut transport), 0);
        assert!(transport.sent.is_empty());
    }
}
