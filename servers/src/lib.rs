//! Server binaries for the feedrelay workspace. The gateway's wiring lives in
//! [`gateway_logic`] so integration tests can run it in-process.

pub mod gateway_logic;
