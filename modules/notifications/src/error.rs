use event_bus::BusError;
use rate_guard::GuardError;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Alert guard error: {0}")]
    Guard(#[from] GuardError),

    #[error("Event bus error: {0}")]
    Bus(#[from] BusError),
}

pub type NotifyResult<T> = Result<T, NotifyError>;
