//! End-to-end tests for kiln. The tests live in `tests/`; this crate has no
//! library code of its own.
