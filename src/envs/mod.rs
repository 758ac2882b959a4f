//! Synthetic environments used by the binaries and the test suite.

pub mod walker;
