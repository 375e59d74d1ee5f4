#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data)
        && let Ok(nodes) = baml::json::markup_from_json(text)
        && let Ok(bytes) = baml::encode(&nodes, &baml::EncoderConfig::default())
    {
        let _ = baml::decode(&bytes).expect("encoder output must decode");
    }
});
