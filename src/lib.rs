//! Delivers purchased kits to players on a game server over the
//! [Source RCON protocol](https://developer.valvesoftware.com/wiki/Source_RCON_Protocol).
//!
//! [client::Client] does the protocol work: one connection per delivery,
//! log in, run one command, hang up. [fulfillment::Fulfillment] sits on top
//! of it and turns paid orders into deliveries, recording each outcome in a
//! [store::DeliveryStore].
pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod fulfillment;
pub mod packet;
pub mod server;
pub mod store;
