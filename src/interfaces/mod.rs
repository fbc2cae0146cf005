//! Wire formats the binary reads commands from and writes payments to.

pub mod csv;
