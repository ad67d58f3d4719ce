//! End-to-end tests live in `tests/`. This crate has no runtime code.
