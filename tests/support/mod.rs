//! Helpers shared by the integration tests.

#![allow(dead_code)]

pub mod raw_server;
pub mod socket_guard;
