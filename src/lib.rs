//! Workspace test shim: cross-crate integration tests live in `tests/`.
//! The real crates are `vigil-context` and `vigil-core` under `crates/`.
