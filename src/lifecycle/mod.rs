pub mod events;
pub mod state_machine;
pub mod sweep_service;
pub mod timelock_service;

pub use events::{EventPublisher, StatusChangeEvent};
pub use sweep_service::{SweepReport, SweepService};
pub use timelock_service::TimelockService;
