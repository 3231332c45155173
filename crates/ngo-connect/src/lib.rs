//! NGO Connect: a marketplace where NGOs post volunteer opportunities and volunteers apply.

pub mod auth;
pub mod config;
pub mod error;
pub mod marketplace;
pub mod telemetry;

pub use marketplace::{marketplace_router, Marketplace};
