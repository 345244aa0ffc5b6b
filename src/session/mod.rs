//! Client-side session core: capacity admission, password retries and the
//! editing state machine. Nothing in here performs I/O against the service.

pub mod capacity;
pub mod error;
pub mod retry;
pub mod state;

pub use capacity::{AdmissionPolicy, AdmissionReport, CandidateFile, CapacityLedger, Urgency};
pub use error::SessionError;
pub use retry::{PasswordRetryPolicy, RetryDecision};
pub use state::{
    CarrierImage, Completion, EditingSession, ExtractOutcome, ExtractStart, Operation, SessionView,
    Stage,
};
