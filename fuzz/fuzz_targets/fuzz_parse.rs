#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(source) = std::str::from_utf8(data) {
        // WGSL parsing and lowering to IR should never panic.
        let _ = kiln_parser::parse(source);
    }
});
