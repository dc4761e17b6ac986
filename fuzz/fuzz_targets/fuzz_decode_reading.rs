#![no_main]
use libfuzzer_sys::fuzz_target;
use weigh_core::protocol::decode_reading;

fuzz_target!(|data: &[u8]| {
    // Arbitrary notification payloads either decode to a finite weight or
    // are rejected; they never panic.
    if let Ok(weight) = decode_reading(data) {
        assert!(weight.is_finite());
    }
});
