//! Domain layer: flow state values, payment data and the ports the
//! orchestration core talks to.

pub mod payment;
pub mod ports;
pub mod state;
pub mod validation;
