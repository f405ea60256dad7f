use core::net::Ipv4Addr;
use picolink_packetlib::*;

#[test]
fn ethernet_roundtrip() {
    let payload = [1u8, 2, 3, 4];
    let frame = EthernetFrame::serialize(
        MacAddr([0, 1, 2, 3, 4, 5]),
        MacAddr([6, 7, 8, 9, 10, 11]),
        EtherType::IPV4,
        &payload,
    );
    let parsed = EthernetFrame::parse(&frame).unwrap();
    assert_eq!(parsed.dst, MacAddr([0, 1, 2, 3, 4, 5]));
    assert_eq!(parsed.src, MacAddr([6, 7, 8, 9, 10, 11]));
    assert_eq!(parsed.ethertype, EtherType::IPV4);
    assert_eq!(parsed.payload_offset, ethernet::HEADER_LEN);
    assert_eq!(parsed.payload, payload);
}

#[test]
fn ethernet_vlan_tag_is_skipped() {
    let mut frame = Vec::new();
    frame.extend_from_slice(&[0xff; 6]);
    frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 1]);
    frame.extend_from_slice(&0x8100u16.to_be_bytes());
    frame.extend_from_slice(&0x0800u16.to_be_bytes()); // inner EtherType
    frame.extend_from_slice(&[0u8, 0]); // rest of the tag region
    frame.extend_from_slice(b"payload");

    let parsed = EthernetFrame::parse(&frame).unwrap();
    assert_eq!(parsed.ethertype, EtherType::IPV4);
    assert_eq!(parsed.payload_offset, ethernet::HEADER_LEN + 4);
    assert_eq!(parsed.payload, b"payload");
}

#[test]
fn arp_roundtrip() {
    let pkt = ArpPacket {
        op: arp::OP_REQUEST,
        sender_mac: MacAddr([1, 2, 3, 4, 5, 6]),
        sender_ip: Ipv4Addr::new(10, 0, 0, 1),
        target_mac: MacAddr::ZERO,
        target_ip: Ipv4Addr::new(10, 0, 0, 2),
    };
    let bytes = pkt.serialize();
    let parsed = ArpPacket::parse(&bytes).unwrap();
    assert_eq!(parsed, pkt);
}

#[test]
fn arp_rejects_non_ethernet_ipv4() {
    let pkt = ArpPacket::request(
        MacAddr([1, 2, 3, 4, 5, 6]),
        Ipv4Addr::new(10, 0, 0, 1),
        Ipv4Addr::new(10, 0, 0, 2),
    );
    let mut bytes = pkt.serialize();
    bytes[4] = 8; // bogus hardware address length
    assert_eq!(ArpPacket::parse(&bytes), Err(ParseError::Malformed));
}

#[test]
fn ipv4_udp_roundtrip() {
    let src = Ipv4Addr::new(10, 0, 0, 1);
    let dst = Ipv4Addr::new(10, 0, 0, 2);
    let udp = udp::serialize(src, 1234, dst, 5678, b"hello");
    let ip = ipv4::serialize(src, dst, 42, ipv4::PROTO_UDP, &udp);

    let parsed_ip = Ipv4Packet::parse(&ip).unwrap();
    assert_eq!(parsed_ip.version, 4);
    assert_eq!(parsed_ip.header_len, ipv4::HEADER_LEN);
    assert_eq!(parsed_ip.ident, 42);
    assert_eq!(parsed_ip.ttl, 128);
    assert_eq!(parsed_ip.src, src);
    assert_eq!(parsed_ip.dst, dst);
    assert_eq!(parsed_ip.protocol, ipv4::PROTO_UDP);
    assert!(!parsed_ip.more_fragments);
    assert_eq!(parsed_ip.fragment_offset, 0);

    let parsed_udp = UdpDatagram::parse(parsed_ip.payload).unwrap();
    assert_eq!(parsed_udp.src_port, 1234);
    assert_eq!(parsed_udp.dst_port, 5678);
    assert_eq!(parsed_udp.payload, b"hello");
    assert!(parsed_udp.verify_checksum(src, dst));
}

#[test]
fn ipv4_header_checksum_sums_to_zero() {
    let hdr = ipv4::header(
        Ipv4Addr::new(192, 0, 2, 1),
        Ipv4Addr::new(192, 0, 2, 2),
        7,
        ipv4::PROTO_ICMP,
        32,
        false,
        0,
    );
    assert_eq!(checksum::checksum(&hdr, 0), 0);
}

#[test]
fn udp_corrupted_checksum_fails_verification() {
    let src = Ipv4Addr::new(10, 0, 0, 1);
    let dst = Ipv4Addr::new(10, 0, 0, 2);
    let mut bytes = udp::serialize(src, 1000, dst, 2000, b"data");
    bytes[6] ^= 0x40;
    let parsed = UdpDatagram::parse(&bytes).unwrap();
    assert!(!parsed.verify_checksum(src, dst));
}

#[test]
fn udp_zero_checksum_is_accepted_unverified() {
    let src = Ipv4Addr::new(10, 0, 0, 1);
    let dst = Ipv4Addr::new(10, 0, 0, 2);
    let mut bytes = udp::serialize(src, 1000, dst, 2000, b"data");
    bytes[6] = 0;
    bytes[7] = 0;
    let parsed = UdpDatagram::parse(&bytes).unwrap();
    assert!(parsed.verify_checksum(src, dst));
}

#[test]
fn icmp_echo_reply_from_request() {
    // Echo Request: id 0x1234, seq 1, ascending payload.
    let mut req = vec![icmp::ECHO_REQUEST, 0, 0, 0, 0x12, 0x34, 0, 1];
    req.extend((0u8..32).collect::<Vec<u8>>());
    let sum = checksum::checksum(&req, 0);
    req[2..4].copy_from_slice(&sum.to_be_bytes());

    let reply = icmp::echo_reply(&req);
    let parsed = IcmpMessage::parse(&reply).unwrap();
    assert_eq!(parsed.icmp_type, icmp::ECHO_REPLY);
    assert_eq!(parsed.body, &req[4..]);
    assert_eq!(
        checksum::checksum(&reply, 0),
        0,
        "reply checksum must verify"
    );
}

#[test]
fn tcp_roundtrip() {
    let src = Ipv4Addr::new(192, 0, 2, 1);
    let dst = Ipv4Addr::new(198, 51, 100, 2);
    let mut seg = tcp::header(
        src,
        1111,
        dst,
        2222,
        1,
        2,
        TcpFlags::PSH | TcpFlags::ACK,
        4096,
        &[],
        b"payload",
    );
    seg.extend_from_slice(b"payload");

    let parsed = TcpSegment::parse(&seg).unwrap();
    assert_eq!(parsed.src_port, 1111);
    assert_eq!(parsed.dst_port, 2222);
    assert_eq!(parsed.seq, 1);
    assert_eq!(parsed.ack, 2);
    assert_eq!(parsed.flags, TcpFlags::PSH | TcpFlags::ACK);
    assert_eq!(parsed.window, 4096);
    assert_eq!(parsed.payload, b"payload");
    assert!(TcpSegment::verify_checksum(&seg, src, dst));
}

#[test]
fn dhcp_roundtrip_preserves_option_order() {
    let mut msg = DhcpMessage {
        xid: 0xdead_beef,
        flags: dhcp::FLAG_BROADCAST,
        ..DhcpMessage::default()
    };
    msg.chaddr[..6].copy_from_slice(&[0x0e, 0x5f, 0x5f, 1, 2, 3]);
    msg.set_option(dhcp::opt::MESSAGE_TYPE, &[dhcp::msg_type::DISCOVER]);
    msg.set_option(dhcp::opt::MAX_MSG_SIZE, &1500u16.to_be_bytes());
    msg.set_option(
        dhcp::opt::PARAM_REQUEST,
        &[
            dhcp::opt::SUBNET_MASK,
            dhcp::opt::ROUTER,
            dhcp::opt::DNS_SERVERS,
        ],
    );

    let bytes = msg.serialize();
    assert_eq!(bytes.len(), msg.encoded_len());
    assert_eq!(&bytes[236..240], &dhcp::MAGIC_COOKIE);
    assert_eq!(*bytes.last().unwrap(), dhcp::opt::END);

    let parsed = DhcpMessage::parse(&bytes).unwrap();
    assert_eq!(parsed, msg);
    assert_eq!(parsed.message_type(), Some(dhcp::msg_type::DISCOVER));
    let codes: Vec<u8> = parsed.options.iter().map(|(c, _)| *c).collect();
    assert_eq!(
        codes,
        vec![
            dhcp::opt::MESSAGE_TYPE,
            dhcp::opt::MAX_MSG_SIZE,
            dhcp::opt::PARAM_REQUEST
        ]
    );
}

#[test]
fn dhcp_parse_skips_pad_and_stops_at_end() {
    let mut msg = DhcpMessage::default();
    msg.set_option(dhcp::opt::MESSAGE_TYPE, &[dhcp::msg_type::OFFER]);
    let mut bytes = msg.serialize();

    // Splice a PAD byte in front of the first option and append trailing
    // garbage after END; both must be ignored.
    bytes.insert(240, dhcp::opt::PAD);
    bytes.extend_from_slice(&[0xaa, 0xbb]);

    let parsed = DhcpMessage::parse(&bytes).unwrap();
    assert_eq!(parsed.message_type(), Some(dhcp::msg_type::OFFER));
    assert_eq!(parsed.options.len(), 1);
}

#[test]
fn dhcp_set_option_replaces_in_place() {
    let mut msg = DhcpMessage::default();
    msg.set_option(dhcp::opt::MESSAGE_TYPE, &[dhcp::msg_type::DISCOVER]);
    msg.set_option(dhcp::opt::REQUESTED_IP, &[192, 0, 2, 50]);
    msg.set_option(dhcp::opt::MESSAGE_TYPE, &[dhcp::msg_type::REQUEST]);
    assert_eq!(msg.message_type(), Some(dhcp::msg_type::REQUEST));
    assert_eq!(msg.options[0].0, dhcp::opt::MESSAGE_TYPE);
    assert_eq!(
        msg.option_ip(dhcp::opt::REQUESTED_IP),
        Some(Ipv4Addr::new(192, 0, 2, 50))
    );
}
