#![allow(dead_code)]

use core::net::Ipv4Addr;
use picolink_net_stack::{DeviceError, Host, HostConfig, NetDevice, StaticIpv4};
use picolink_packetlib::{ethernet, ipv4, udp, EtherType, EthernetFrame, MacAddr};
use std::collections::VecDeque;

pub const HOST_MAC: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
pub const PEER_MAC: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0xFE]);
pub const HOST_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
pub const PEER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

/// In-memory NIC double: injected frames queue up for `receive`, sent
/// frames are captured for inspection.
pub struct TestNic {
    pub mac: [u8; 6],
    pub link_up: bool,
    pub link_changed: bool,
    pub rx: VecDeque<Vec<u8>>,
    pub tx: Vec<Vec<u8>>,
    pub fail_send: Option<DeviceError>,
}

impl TestNic {
    pub fn new(mac: MacAddr) -> TestNic {
        TestNic {
            mac: mac.0,
            link_up: true,
            link_changed: false,
            rx: VecDeque::new(),
            tx: Vec::new(),
            fail_send: None,
        }
    }

    pub fn inject(&mut self, frame: &[u8]) {
        self.rx.push_back(frame.to_vec());
    }

    pub fn take_tx(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.tx)
    }
}

impl NetDevice for TestNic {
    fn mac_addr(&self) -> [u8; 6] {
        self.mac
    }

    fn send(&mut self, chunks: &[&[u8]]) -> Result<usize, DeviceError> {
        if let Some(err) = self.fail_send {
            return Err(err);
        }
        if !self.link_up {
            return Err(DeviceError::LinkDown);
        }
        let frame: Vec<u8> = chunks.concat();
        if frame.len() > ethernet::MAX_FRAME_LEN {
            return Err(DeviceError::FrameTooLong);
        }
        let len = frame.len();
        self.tx.push(frame);
        Ok(len)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        match self.rx.pop_front() {
            Some(frame) => {
                let len = frame.len().min(buf.len());
                buf[..len].copy_from_slice(&frame[..len]);
                Ok(len)
            }
            None => Ok(0),
        }
    }

    fn is_link_up(&mut self) -> bool {
        self.link_up
    }

    fn link_state_changed(&mut self) -> bool {
        std::mem::take(&mut self.link_changed)
    }
}

/// A host at 10.0.0.2/24 with gateway 10.0.0.1, on a [`TestNic`].
pub fn test_host() -> Host<TestNic> {
    Host::new(
        TestNic::new(HOST_MAC),
        HostConfig {
            static_ipv4: Some(StaticIpv4 {
                addr: HOST_IP,
                mask: Ipv4Addr::new(255, 255, 255, 0),
                gateway: PEER_IP,
            }),
            dns_server: None,
        },
    )
}

/// An unconfigured host (0.0.0.0), as a DHCP client starts out.
pub fn unconfigured_host() -> Host<TestNic> {
    Host::new(TestNic::new(HOST_MAC), HostConfig::default())
}

pub fn udp_frame(
    src_mac: MacAddr,
    dst_mac: MacAddr,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let datagram = udp::serialize(src_ip, src_port, dst_ip, dst_port, payload);
    let packet = ipv4::serialize(src_ip, dst_ip, 1, ipv4::PROTO_UDP, &datagram);
    EthernetFrame::serialize(dst_mac, src_mac, EtherType::IPV4, &packet)
}
