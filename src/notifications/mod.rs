pub mod encryption;
pub mod models;
pub mod senders;
pub mod service;
