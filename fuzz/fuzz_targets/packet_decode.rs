//! Fuzz target for Packet::decode
//!
//! Arbitrary bytes as a packet body: must never panic, and anything that
//! decodes must re-encode to the exact same bytes (the codec is a
//! bijection over its valid range).

#![no_main]

use libfuzzer_sys::fuzz_target;
use renju_proto::Packet;

fuzz_target!(|data: &[u8]| {
    if let Ok(packet) = Packet::decode(0, data) {
        let bytes = packet.to_bytes().expect("decoded packet must re-encode");
        assert_eq!(bytes, data, "decode/encode must round-trip");
    }
});
