//! Domain types and the ports the application layer depends on.

pub mod address;
pub mod coins;
pub mod command;
pub mod events;
pub mod order;
pub mod payment;
pub mod ports;
pub mod state;
