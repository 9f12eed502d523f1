pub mod governance_service;

pub use governance_service::GovernanceService;
