//! Integration tests for shared context negotiation

mod config_integration;
mod marshal_roundtrip;
mod remote_bridge;
pub mod test_utils;
mod transaction;
