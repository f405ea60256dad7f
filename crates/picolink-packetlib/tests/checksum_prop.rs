use core::net::Ipv4Addr;
use picolink_packetlib::{checksum, udp, UdpDatagram};
use proptest::prelude::*;

proptest! {
    // Appending the computed checksum (at a 16-bit-aligned position, as in
    // every real header) makes the whole buffer sum to zero.
    #[test]
    fn checksum_over_data_and_own_checksum_is_zero(
        data in proptest::collection::vec(any::<u8>(), 0usize..=1024),
    ) {
        let mut buf = data;
        buf.truncate(buf.len() & !1);
        let sum = checksum::checksum(&buf, 0);
        buf.extend_from_slice(&sum.to_be_bytes());
        prop_assert_eq!(checksum::checksum(&buf, 0), 0);
    }

    #[test]
    fn udp_emit_parse_roundtrip(
        src in any::<u32>(),
        dst in any::<u32>(),
        src_port in any::<u16>(),
        dst_port in any::<u16>(),
        payload in proptest::collection::vec(any::<u8>(), 0usize..=1024),
    ) {
        let src = Ipv4Addr::from(src);
        let dst = Ipv4Addr::from(dst);
        let bytes = udp::serialize(src, src_port, dst, dst_port, &payload);

        let parsed = UdpDatagram::parse(&bytes).unwrap();
        prop_assert_eq!(parsed.src_port, src_port);
        prop_assert_eq!(parsed.dst_port, dst_port);
        prop_assert_eq!(parsed.payload, &payload[..]);
        prop_assert_ne!(parsed.checksum, 0, "emitted checksum must never be the 'absent' value");
        prop_assert!(parsed.verify_checksum(src, dst));
    }

    // The Internet checksum detects every single-bit error, so flipping any
    // payload bit must fail verification.
    #[test]
    fn udp_bit_flip_detected(
        payload in proptest::collection::vec(any::<u8>(), 1usize..=256),
        flip_idx in any::<proptest::sample::Index>(),
        flip_bit in 0u8..8,
    ) {
        let src = Ipv4Addr::new(10, 0, 0, 1);
        let dst = Ipv4Addr::new(10, 0, 0, 2);
        let mut bytes = udp::serialize(src, 7, dst, 7, &payload);
        let idx = udp::HEADER_LEN + flip_idx.index(payload.len());
        bytes[idx] ^= 1 << flip_bit;

        let parsed = UdpDatagram::parse(&bytes).unwrap();
        prop_assert!(!parsed.verify_checksum(src, dst));
    }
}

#[test]
fn checksum_odd_trailing_byte_is_high_padded() {
    // 0x01 alone must count as the word 0x0100.
    assert_eq!(checksum::checksum(&[0x01], 0), !0x0100u16);
    assert_eq!(checksum::checksum(&[0xab, 0xcd, 0x01], 0), !(0xabcd + 0x0100));
}

#[test]
fn checksum_folds_carries_twice() {
    // Two words that overflow 16 bits twice over.
    let data = [0xff, 0xff, 0xff, 0xff, 0x00, 0x02];
    // 0xffff + 0xffff + 0x0002 = 0x20000 -> fold -> 0x0002 -> ~ = 0xfffd
    assert_eq!(checksum::checksum(&data, 0), 0xfffd);
}
