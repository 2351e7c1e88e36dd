//! Fuzz target for Frame::decode
//!
//! Feeds arbitrary byte sequences through the stream splitter to find:
//! - Parser crashes or panics
//! - Integer overflows in length handling
//! - Buffer over-reads
//! - Headers that bypass validation
//!
//! The fuzzer should NEVER panic: invalid input returns an error, an
//! incomplete frame returns None.

#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use renju_proto::Frame;

fuzz_target!(|data: &[u8]| {
    let mut buf = BytesMut::from(data);

    // Drain every frame the input happens to contain; stop on the first
    // error or incomplete tail.
    while let Ok(Some(_)) = Frame::decode(&mut buf) {}
});
