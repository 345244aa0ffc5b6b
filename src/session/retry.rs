//! Bounded password retry policy for extraction.
//!
//! Wrong extraction passwords are counted per extraction sub-flow. The first
//! attempts re-open the password prompt automatically; once the bound is hit
//! the prompt stays closed until the user triggers extraction again by hand.
//! Embedding has no such bound.

use serde::Serialize;

/// Wrong passwords tolerated before automatic re-prompting stops.
pub const MAX_PASSWORD_ATTEMPTS: u32 = 3;

/// What to do after the service reported a wrong password.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RetryDecision {
    /// Warn with the attempt count and re-open the prompt.
    Reprompt { attempt: u32, max: u32 },
    /// Final warning; the user must re-trigger extraction manually.
    Exhausted { attempt: u32, max: u32 },
}

impl RetryDecision {
    pub fn attempt(&self) -> u32 {
        match self {
            RetryDecision::Reprompt { attempt, .. } | RetryDecision::Exhausted { attempt, .. } => {
                *attempt
            }
        }
    }

    pub fn reprompts(&self) -> bool {
        matches!(self, RetryDecision::Reprompt { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct PasswordRetryPolicy {
    attempts: u32,
}

impl PasswordRetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrong passwords counted in the current cycle.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= MAX_PASSWORD_ATTEMPTS
    }

    /// Counts one wrong password and decides whether to re-prompt.
    ///
    /// Saturates at the bound; only [`manual_retrigger`](Self::manual_retrigger)
    /// or [`reset`](Self::reset) start a new cycle.
    pub fn record_wrong_password(&mut self) -> RetryDecision {
        self.attempts = (self.attempts + 1).min(MAX_PASSWORD_ATTEMPTS);

        if self.attempts < MAX_PASSWORD_ATTEMPTS {
            RetryDecision::Reprompt {
                attempt: self.attempts,
                max: MAX_PASSWORD_ATTEMPTS,
            }
        } else {
            RetryDecision::Exhausted {
                attempt: self.attempts,
                max: MAX_PASSWORD_ATTEMPTS,
            }
        }
    }

    /// Called when the user invokes extraction by hand.
    ///
    /// Starts a fresh local counting cycle if the previous one was exhausted.
    /// Any lockout kept by the service is unaffected. Returns whether a new
    /// cycle was started.
    pub fn manual_retrigger(&mut self) -> bool {
        if self.is_exhausted() {
            self.attempts = 0;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
