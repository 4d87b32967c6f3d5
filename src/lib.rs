pub mod db;
pub mod error;
pub mod lifecycle;
pub mod notifications;
pub mod server;
pub mod services;
