#![no_main]

use kiln_backend_spirv::{Options, write_module};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(module) = kiln_parser::parse(source) else {
        return;
    };
    // Anything the front end accepts either lowers or reports an error.
    if let Ok(words) = write_module(&module, &Options::default()) {
        assert_eq!(words[0], spirv::MAGIC_NUMBER);
        assert!(words.len() >= 5);
    }
});
