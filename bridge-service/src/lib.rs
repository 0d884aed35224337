//! Service layer of the custody bridge: event-loop wiring over
//! `bridge-core`, the operator HTTP API and the `btc-bridge-service`
//! binary.

pub mod api;
pub mod service;
