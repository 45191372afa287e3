// Dealer Communication Worker - core library
//
// This crate drives outbound customer messages (email and SMS) for a fleet
// of equipment-dealership tenants: a durable central job queue is drained by
// the job engine and refilled by periodic per-tenant sweeps of each
// tenant's DMS database.

pub mod config;
pub mod kernel;

pub use config::*;
