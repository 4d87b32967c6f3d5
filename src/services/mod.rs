pub mod clock;
pub mod contract_mirror;
pub mod permission_service;
pub mod validation;
