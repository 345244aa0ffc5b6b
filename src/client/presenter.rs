//! # Presentation Seam
//!
//! The coordinators never draw anything themselves. They report through a
//! [`Presenter`]: busy indication, blocking warnings, password prompts and a
//! fresh [`SessionView`] whenever the session changed.

use std::cell::Cell;
use std::fmt;

use crate::session::capacity::AdmissionReport;
use crate::session::error::SessionError;
use crate::session::retry::RetryDecision;
use crate::session::state::{Operation, SessionView};

/// Why a password is being asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordPurpose {
    /// Optional password protecting the files about to be embedded
    Embed,
    /// Password of the carrier's existing payload
    Extract,
}

impl fmt::Display for PasswordPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PasswordPurpose::Embed => f.write_str("Password to protect embedded files (leave blank for none)"),
            PasswordPurpose::Extract => f.write_str("Password to extract files"),
        }
    }
}

/// A blocking notice for the user.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// The action was refused before anything was sent.
    Rejected(SessionError),
    /// Part of a file batch did not fit the remaining capacity.
    CapacityExceeded { rejected: Vec<String>, remaining: i64 },
    /// The service rejected the extraction password.
    WrongPassword(RetryDecision),
    /// The request failed in transport.
    Failed(Operation),
}

impl Warning {
    pub(crate) fn capacity_exceeded(report: &AdmissionReport) -> Self {
        Warning::CapacityExceeded {
            rejected: report.rejected.iter().map(|f| f.name.clone()).collect(),
            remaining: report.summary.remaining,
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::Rejected(err) => write!(f, "{}", err),
            Warning::CapacityExceeded { rejected, remaining } if rejected.is_empty() => write!(
                f,
                "Selected files exceed the remaining capacity ({} bytes).",
                remaining
            ),
            Warning::CapacityExceeded { rejected, remaining } => write!(
                f,
                "Selected files exceed the remaining capacity ({} bytes). Skipped: {}",
                remaining,
                rejected.join(", ")
            ),
            Warning::WrongPassword(RetryDecision::Reprompt { attempt, max }) => {
                write!(f, "Wrong password entered, attempt ({} of {})", attempt, max)
            }
            Warning::WrongPassword(RetryDecision::Exhausted { attempt, max }) => write!(
                f,
                "Wrong password entered, attempt ({} of {}). Start extraction again to retry.",
                attempt, max
            ),
            Warning::Failed(Operation::Upload) => f.write_str("Failed to upload file."),
            Warning::Failed(Operation::Embed) => f.write_str("Failed to embed data."),
            Warning::Failed(Operation::Extract) => f.write_str("Failed to extract data."),
        }
    }
}

/// Whatever shows the session to the user.
#[allow(async_fn_in_trait)]
pub trait Presenter {
    /// Shows or hides the busy indicator.
    fn busy(&self, visible: bool);

    fn warn(&self, warning: &Warning);

    /// Asks for a password. `None` means the prompt was dismissed.
    async fn prompt_password(&self, purpose: PasswordPurpose) -> Option<String>;

    fn session_changed(&self, _view: &SessionView) {}
}

/// Keeps the busy indicator up while at least one request is outstanding.
///
/// The indicator is hidden when the last guard drops, whichever path the
/// request took.
pub struct BusyGuard<'a, P: Presenter> {
    presenter: &'a P,
    depth: &'a Cell<u32>,
}

impl<'a, P: Presenter> BusyGuard<'a, P> {
    pub fn new(presenter: &'a P, depth: &'a Cell<u32>) -> Self {
        let previous = depth.get();
        depth.set(previous + 1);
        if previous == 0 {
            presenter.busy(true);
        }
        Self { presenter, depth }
    }
}

impl<P: Presenter> Drop for BusyGuard<'_, P> {
    fn drop(&mut self) {
        let remaining = self.depth.get().saturating_sub(1);
        self.depth.set(remaining);
        if remaining == 0 {
            self.presenter.busy(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        busy: RefCell<Vec<bool>>,
    }

    impl Presenter for Recorder {
        fn busy(&self, visible: bool) {
            self.busy.borrow_mut().push(visible);
        }

        fn warn(&self, _warning: &Warning) {}

        async fn prompt_password(&self, _purpose: PasswordPurpose) -> Option<String> {
            None
        }
    }

    #[test]
    fn test_nested_guards_toggle_once() {
        let presenter = Recorder::default();
        let depth = Cell::new(0);

        {
            let _outer = BusyGuard::new(&presenter, &depth);
            {
                let _inner = BusyGuard::new(&presenter, &depth);
                assert_eq!(depth.get(), 2);
            }
            assert_eq!(*presenter.busy.borrow(), vec![true]);
        }

        assert_eq!(depth.get(), 0);
        assert_eq!(*presenter.busy.borrow(), vec![true, false]);
    }

    #[test]
    fn test_warning_text() {
        let warning = Warning::WrongPassword(RetryDecision::Reprompt { attempt: 2, max: 3 });
        assert_eq!(warning.to_string(), "Wrong password entered, attempt (2 of 3)");

        let warning = Warning::CapacityExceeded {
            rejected: vec!["big.bin".to_string()],
            remaining: 120,
        };
        assert_eq!(
            warning.to_string(),
            "Selected files exceed the remaining capacity (120 bytes). Skipped: big.bin"
        );

        assert_eq!(
            Warning::Rejected(SessionError::EmptySelection).to_string(),
            "Please select at least one file to embed."
        );
        assert_eq!(Warning::Failed(Operation::Embed).to_string(), "Failed to embed data.");
    }
}
