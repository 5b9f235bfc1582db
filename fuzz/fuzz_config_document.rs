//! Fuzz target for the daemon configuration document projections.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_document
//!
//! Parses arbitrary bytes as a `/rest/config` body and runs every projection
//! and a mutation over it. None of them may panic; a successful array write
//! must read back as the same tokens.

#![no_main]

use libfuzzer_sys::fuzz_target;
use syncmate_core::rest::Section;
use syncmate_core::rest::document;

fuzz_target!(|data: &[u8]| {
    let Ok(body) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(mut doc) = document::parse_document(body) else {
        return;
    };

    let _ = document::nodes(&doc, "LOCAL");
    let _ = document::repositories(&doc, "LOCAL");
    for section in [Section::Options, Section::Gui] {
        let _ = document::get_value(&doc, section, "ListenAddress");
    }

    let tokens = "0.0.0.0:22000 :22001";
    let value = serde_json::Value::String(tokens.to_string());
    if document::set_value(&mut doc, Section::Options, "ListenAddress", value, true).is_ok() {
        let read = document::get_value(&doc, Section::Options, "ListenAddress");
        assert_eq!(read.ok().as_deref(), Some(tokens));
    }
});
