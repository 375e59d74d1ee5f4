#![no_main]
use libfuzzer_sys::fuzz_target;

use baml::{BracketCharacters, LineInfo};

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = baml::extension::parse(text, &BracketCharacters::new(), LineInfo::default());
    }
});
