//! SeaORM entities for the timelock tables.
//!
//! `compound_timelock` and `openzeppelin_timelock` are written by the chain
//! listener and only read here.

pub mod compound_timelock;
pub mod notification_config;
pub mod notification_log;
pub mod openzeppelin_timelock;
pub mod timelock_transaction;
