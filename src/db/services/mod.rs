//! Database-backed services, one module per table family.

pub mod contract_mirror_service;
pub mod notification_config_service;
pub mod notification_log_service;
pub mod transaction_service;

pub use contract_mirror_service::SeaOrmContractMirror;
pub use notification_config_service::NotificationConfigService;
pub use notification_log_service::NotificationLogService;
pub use transaction_service::TransactionStore;
