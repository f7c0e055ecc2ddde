//! Per-user point balances with serialized mutations
//!
//! Charges and uses for the same user are applied one at a time, in the order their lock
//! was granted. Different users never wait on each other.

pub mod adapters;
pub mod commands;
pub mod domain;
pub mod locks;
pub mod ports;
