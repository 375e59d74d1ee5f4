#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    for node in baml::decode_iter(data) {
        if node.is_err() {
            break;
        }
    }
});
