//! Application layer orchestrating checkout flows.
//!
//! [`scope::FlowStateMachine`] owns one bank-debit flow and serializes every
//! mutation behind a single lock, publishing each new state through an
//! ordered [`channel::StateChannel`]. Vendor callbacks are funneled into it
//! through a queue so they can arrive from any thread.

pub mod bridge;
pub mod channel;
pub mod observer;
pub mod scope;
pub mod wallet;
