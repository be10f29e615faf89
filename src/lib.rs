//! Hercules GW - Hercules DJ Console gateway
//!
//! Reads jog wheels, pitch knobs, faders and buttons from Hercules DJ
//! consoles and turns them into application control writes.

pub mod config;
pub mod drivers;
pub mod hercules;
pub mod paths;
pub mod session;
pub mod sink;
pub mod sniffer;
