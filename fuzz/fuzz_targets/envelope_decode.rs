//! Fuzz target for envelope and payload decoding.
//!
//! Every input line must either decode or be rejected with an error, and
//! whatever decodes must encode back to a single line.

#![no_main]

use libfuzzer_sys::fuzz_target;
use maelstrom_broadcast::maelstrom::{decode_envelope, encode_envelope, parse_payload, Payload};

fuzz_target!(|data: &[u8]| {
    let Ok(envelope) = decode_envelope(data) else {
        return;
    };

    if let Ok(line) = encode_envelope(&envelope) {
        assert_eq!(line.iter().filter(|&&b| b == b'\n').count(), 1);
    }

    match parse_payload(&envelope.body) {
        Ok(Payload::Broadcast(message)) => {
            let _ = message.kind();
        }
        Ok(Payload::Control(_)) | Err(_) => {}
    }
});
