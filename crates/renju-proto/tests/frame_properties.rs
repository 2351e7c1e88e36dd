//! Property tests for the wire codecs: encode/decode must be the identity
//! over every legal frame and packet, and truncated input must never panic
//! or produce a frame.

use bytes::BytesMut;
use proptest::prelude::*;
use renju_proto::{Frame, MsgType, Packet, ProtocolError, Status, Value, IV_LEN};

fn arb_status() -> impl Strategy<Value = Status> {
    prop_oneof![
        Just(Status::Hello),
        Just(Status::NewSession),
        Just(Status::Pending),
        Just(Status::Activated),
        Just(Status::Inactive),
        Just(Status::Error),
        Just(Status::InvalidRequest),
    ]
}

fn arb_frame() -> impl Strategy<Value = Frame> {
    let control = (arb_status(), any::<u64>(), prop::collection::vec(any::<u8>(), 0..512))
        .prop_map(|(status, session_id, payload)| Frame::control(status, session_id, payload));

    let active = (any::<u64>(), any::<[u8; IV_LEN]>(), prop::collection::vec(any::<u8>(), 0..512))
        .prop_map(|(session_id, iv, payload)| Frame::active(session_id, iv, payload));

    prop_oneof![control, active]
}

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<u32>().prop_map(Value::U32),
        any::<u64>().prop_map(Value::U64),
        any::<i32>().prop_map(Value::I32),
        "[a-zA-Z0-9 _!?,.]{0,64}".prop_map(Value::Str),
    ]
}

fn arb_packet() -> impl Strategy<Value = Packet> {
    (
        any::<u16>(),
        prop::collection::vec(("[a-zA-Z][a-zA-Z0-9]{0,15}", arb_value()), 0..8),
    )
        .prop_map(|(msg_type, raw_params)| {
            let mut packet = Packet::new(0, MsgType::Heartbeat);
            packet.msg_type = msg_type;
            // Duplicate names would collapse under `set`; keep the raw list
            // deduplicated so the round trip is exact.
            for (name, value) in raw_params {
                if packet.get(&name).is_none() {
                    packet.params.push((name, value));
                }
            }
            packet
        })
}

proptest! {
    #[test]
    fn frame_round_trip(frame in arb_frame()) {
        let encoded = frame.to_bytes().expect("should encode");

        let mut buf = BytesMut::from(&encoded[..]);
        let decoded = Frame::decode(&mut buf).expect("should decode").expect("complete frame");

        prop_assert_eq!(decoded, frame);
        prop_assert!(buf.is_empty());
    }

    #[test]
    fn truncated_frame_never_completes(frame in arb_frame(), cut in 0usize..64) {
        let encoded = frame.to_bytes().expect("should encode");
        prop_assume!(cut < encoded.len());

        let mut buf = BytesMut::from(&encoded[..encoded.len() - cut - 1]);
        let result = Frame::decode(&mut buf).expect("truncation is not an error");
        prop_assert!(result.is_none());
    }

    #[test]
    fn frame_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let mut buf = BytesMut::from(&bytes[..]);
        let _ = Frame::decode(&mut buf);
    }

    #[test]
    fn packet_round_trip(packet in arb_packet()) {
        let encoded = packet.to_bytes().expect("should encode");
        let decoded = Packet::decode(packet.session_id, &encoded).expect("should decode");
        prop_assert_eq!(decoded, packet);
    }

    #[test]
    fn packet_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = Packet::decode(0, &bytes);
    }

    #[test]
    fn oversize_length_prefix_is_fatal(declared in 0x0010_0001u32..0x2000_0000) {
        // Hand-build a header claiming more payload than the cap allows.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&renju_proto::MAGIC.to_be_bytes());
        bytes.push(Status::Active.to_u8());
        bytes.extend_from_slice(&1u64.to_be_bytes());
        bytes.push(IV_LEN as u8);
        bytes.extend_from_slice(&[0u8; IV_LEN]);
        bytes.extend_from_slice(&declared.to_be_bytes());

        let mut buf = BytesMut::from(&bytes[..]);
        let err = Frame::decode(&mut buf).expect_err("must be rejected");
        let is_payload_too_large = matches!(err, ProtocolError::PayloadTooLarge { .. });
        prop_assert!(is_payload_too_large);
        prop_assert!(err.is_fatal());
    }
}
