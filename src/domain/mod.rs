//! Domain model: payments, the aggregates they fund, and the ports the
//! application layer talks to.

pub mod adoption;
pub mod fees;
pub mod gateway;
pub mod history;
pub mod money;
pub mod payment;
pub mod ports;
pub mod project;
pub mod stats;
