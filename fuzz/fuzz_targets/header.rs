#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut reader = baml::bytestream::ByteReader::new(data);
    let _ = baml::header::decode(&mut reader);
});
