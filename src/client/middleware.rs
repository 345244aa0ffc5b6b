//! # Session Middleware
//!
//! This module contains the middleware layer that coordinates every user
//! action against the remote service and the local editing session.
//!
//! ## Responsibilities
//!
//! The [`SessionMiddleware`] struct handles the coordination concerns:
//! - **Pre-flight validation**: refuses actions the session cannot take, with a warning
//! - **Dispatch**: hands the request to the [`StegoService`]
//! - **Busy indication**: shown on dispatch and hidden on every completion path
//! - **Stale responses**: results for a reset session are dropped
//! - **Password prompts**: optional on embed, bounded re-prompting on extract
//! - **Metrics**: optional per-request timing and outcome
//!
//! ## Architecture
//!
//! The session lives in an `Rc<RefCell<_>>` on a single cooperative task.
//! Borrows are only taken between awaits, so a reset issued while a request
//! is outstanding is applied immediately and the late response is detected
//! through the session generation.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let service = HttpStegoClient::new(&config.service)?;
//! let middleware = SessionMiddleware::new(config.session, service, TerminalPresenter);
//!
//! middleware.select_image(CarrierImage::from_path("cat.png").await?)?;
//! middleware.upload().await?;
//! middleware.queue_files(files)?;
//! middleware.embed().await?;
//! ```

use log::{debug, info};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Instant;

use super::client::{StegoService, TransportError};
use super::metrics::{Outcome, SessionMetrics};
use super::presenter::{BusyGuard, PasswordPurpose, Presenter, Warning};
use crate::common::config::SessionConfig;
use crate::common::messages::{EmbedResponse, UploadResponse};
use crate::session::capacity::{AdmissionReport, CandidateFile};
use crate::session::error::SessionError;
use crate::session::state::{
    CarrierImage, Completion, EditingSession, ExtractOutcome, ExtractStart, ExtractTicket,
    Operation,
};

/// Coordinates the upload, embed and extract operations of one session.
///
/// # Fields
///
/// * `session` - Shared editing session state
/// * `service` - Remote steganography service
/// * `presenter` - Presentation layer receiving warnings, prompts and updates
/// * `busy_depth` - Outstanding requests holding the busy indicator
/// * `metrics` - Optional per-request records
pub struct SessionMiddleware<S, P> {
    session: Rc<RefCell<EditingSession>>,
    service: S,
    presenter: P,
    busy_depth: Cell<u32>,
    metrics: Option<RefCell<SessionMetrics>>,
}

impl<S: StegoService, P: Presenter> SessionMiddleware<S, P> {
    /// Creates a middleware around a fresh, empty session.
    ///
    /// # Arguments
    ///
    /// * `config` - Session policy (carrier type, admission policy)
    /// * `service` - Remote service implementation
    /// * `presenter` - Presentation layer
    pub fn new(config: SessionConfig, service: S, presenter: P) -> Self {
        Self {
            session: Rc::new(RefCell::new(EditingSession::new(config))),
            service,
            presenter,
            busy_depth: Cell::new(0),
            metrics: None,
        }
    }

    /// Enables per-request metrics.
    pub fn with_metrics(mut self, metrics: SessionMetrics) -> Self {
        self.metrics = Some(RefCell::new(metrics));
        self
    }

    /// Shared handle to the session, for read access by the presentation layer.
    pub fn session(&self) -> Rc<RefCell<EditingSession>> {
        Rc::clone(&self.session)
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// Takes the recorded metrics back out of the middleware.
    pub fn into_metrics(self) -> Option<SessionMetrics> {
        self.metrics.map(RefCell::into_inner)
    }

    /// Selects a new carrier image, discarding the current session first.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnsupportedImage`] if the image is not a PNG; a warning
    /// is shown and the upload control stays disabled.
    pub fn select_image(&self, image: CarrierImage) -> Result<(), SessionError> {
        let selected = self.session.borrow_mut().select_image(image);
        self.notify();
        selected.map_err(|err| self.rejected(err))
    }

    /// Clears the session. Outstanding requests will complete as stale.
    pub fn reset(&self) {
        self.session.borrow_mut().reset();
        self.notify();
    }

    /// Uploads the staged carrier for analysis.
    ///
    /// # Returns
    ///
    /// * `Ok(Completion::Applied(analysis))` - The carrier session was seeded
    /// * `Ok(Completion::Stale)` - The session was reset while the request was outstanding
    /// * `Err(SessionError)` - Pre-flight refusal or transport failure (warning shown)
    pub async fn upload(&self) -> Result<Completion<UploadResponse>, SessionError> {
        let begun = self.session.borrow_mut().begin_upload();
        let ticket = begun.map_err(|err| self.rejected(err))?;
        self.notify();

        let _busy = BusyGuard::new(&self.presenter, &self.busy_depth);
        let started = Instant::now();
        let result = self.service.upload(ticket.image()).await;

        let completed = self.session.borrow_mut().complete_upload(ticket, result);
        self.finish(Operation::Upload, started, completed)
    }

    /// Offers candidate files to the capacity ledger.
    ///
    /// Files that did not fit are reported with a capacity warning; the
    /// admitted ones are kept.
    pub fn queue_files(&self, batch: Vec<CandidateFile>) -> Result<AdmissionReport, SessionError> {
        let queued = self.session.borrow_mut().queue_files(batch);
        let report = queued.map_err(|err| self.rejected(err))?;

        if report.exceeded {
            self.presenter.warn(&Warning::capacity_exceeded(&report));
        }
        self.notify();
        Ok(report)
    }

    /// Embeds the admitted files, asking for an optional password first.
    ///
    /// Dismissing the prompt cancels the embed; an empty answer embeds
    /// without a password.
    pub async fn embed(&self) -> Result<Completion<EmbedResponse>, SessionError> {
        let checked = self.session.borrow().embed_preflight();
        checked.map_err(|err| self.rejected(err))?;

        let generation = self.session.borrow().generation();
        let Some(password) = self.presenter.prompt_password(PasswordPurpose::Embed).await else {
            debug!("Embed password prompt dismissed");
            return Ok(Completion::Cancelled);
        };
        if self.session.borrow().generation() != generation {
            return Ok(Completion::Stale);
        }

        self.embed_with_password(Some(password)).await
    }

    /// Embeds the admitted files with the given password, without prompting.
    pub async fn embed_with_password(
        &self,
        password: Option<String>,
    ) -> Result<Completion<EmbedResponse>, SessionError> {
        let begun = self.session.borrow_mut().begin_embed(password);
        let ticket = begun.map_err(|err| self.rejected(err))?;
        self.notify();

        let _busy = BusyGuard::new(&self.presenter, &self.busy_depth);
        let started = Instant::now();
        let result = self.service.embed(ticket.batch()).await;

        let completed = self.session.borrow_mut().complete_embed(ticket, result);
        self.finish(Operation::Embed, started, completed)
    }

    /// Extracts the carrier's payload, prompting for a password if needed.
    ///
    /// A wrong password re-opens the prompt until the retry policy is
    /// exhausted; the final wrong-password outcome is returned as applied.
    pub async fn extract(&self) -> Result<Completion<ExtractOutcome>, SessionError> {
        self.extract_with_password(None).await
    }

    /// Like [`extract`](Self::extract), using `password` for the first attempt
    /// instead of prompting.
    pub async fn extract_with_password(
        &self,
        password: Option<String>,
    ) -> Result<Completion<ExtractOutcome>, SessionError> {
        let requested = self.session.borrow_mut().request_extract();
        let start = requested.map_err(|err| self.rejected(err))?;
        self.notify();

        let mut ticket = match (start, password) {
            (ExtractStart::Dispatch(ticket), _) => ticket,
            (ExtractStart::PromptPassword, Some(password)) => {
                let submitted = self.session.borrow_mut().submit_extract_password(password);
                submitted.map_err(|err| self.rejected(err))?
            }
            (ExtractStart::PromptPassword, None) => match self.prompt_extract_password().await? {
                Completion::Applied(ticket) => ticket,
                Completion::Stale => return Ok(Completion::Stale),
                Completion::Cancelled => return Ok(Completion::Cancelled),
            },
        };

        loop {
            let completion = self.extract_once(ticket).await?;
            let decision = match completion {
                Completion::Applied(ExtractOutcome::WrongPassword(decision)) => decision,
                other => return Ok(other),
            };

            self.presenter.warn(&Warning::WrongPassword(decision));
            if !decision.reprompts() {
                return Ok(Completion::Applied(ExtractOutcome::WrongPassword(decision)));
            }

            ticket = match self.prompt_extract_password().await? {
                Completion::Applied(ticket) => ticket,
                Completion::Stale => return Ok(Completion::Stale),
                Completion::Cancelled => return Ok(Completion::Cancelled),
            };
        }
    }

    async fn extract_once(
        &self,
        ticket: ExtractTicket,
    ) -> Result<Completion<ExtractOutcome>, SessionError> {
        self.notify();

        let _busy = BusyGuard::new(&self.presenter, &self.busy_depth);
        let started = Instant::now();
        let result = self.service.extract(ticket.password()).await;

        let completed = self.session.borrow_mut().complete_extract(ticket, result);
        self.finish(Operation::Extract, started, completed)
    }

    /// Opens the extraction password prompt and submits the answer.
    async fn prompt_extract_password(&self) -> Result<Completion<ExtractTicket>, SessionError> {
        let generation = self.session.borrow().generation();
        let answer = self.presenter.prompt_password(PasswordPurpose::Extract).await;

        if self.session.borrow().generation() != generation {
            debug!("Session changed while the password prompt was open");
            return Ok(Completion::Stale);
        }

        let Some(password) = answer else {
            self.session.borrow_mut().cancel_password_prompt();
            self.notify();
            return Ok(Completion::Cancelled);
        };

        let submitted = self.session.borrow_mut().submit_extract_password(password);
        submitted
            .map(Completion::Applied)
            .map_err(|err| self.rejected(err))
    }

    /// Records the outcome of a completed request and reports it.
    fn finish<T>(
        &self,
        operation: Operation,
        started: Instant,
        completed: Result<Completion<T>, SessionError>,
    ) -> Result<Completion<T>, SessionError> {
        let (outcome, reason) = match &completed {
            Ok(Completion::Stale) => (Outcome::Stale, None),
            Ok(_) => (Outcome::Applied, None),
            Err(SessionError::Transport { source, .. }) => (Outcome::Failed, Some(failure_reason(source))),
            Err(err) => (Outcome::Failed, Some(err.to_string())),
        };
        if let Some(metrics) = &self.metrics {
            metrics
                .borrow_mut()
                .record_request(operation, started.elapsed(), outcome, reason);
        }

        match completed {
            Ok(Completion::Stale) => {
                info!("Ignored late {} response", operation);
                Ok(Completion::Stale)
            }
            Ok(completion) => {
                self.notify();
                Ok(completion)
            }
            Err(err) => {
                self.presenter.warn(&Warning::Failed(operation));
                self.notify();
                Err(err)
            }
        }
    }

    fn rejected(&self, err: SessionError) -> SessionError {
        self.presenter.warn(&Warning::Rejected(err.clone()));
        err
    }

    fn notify(&self) {
        let view = self.session.borrow().view();
        self.presenter.session_changed(&view);
    }
}

/// Short failure category for metrics.
fn failure_reason(err: &TransportError) -> String {
    match err {
        TransportError::Request(_) => "request".to_string(),
        TransportError::Status { status, .. } => format!("status {}", status),
        TransportError::Malformed(_) => "malformed".to_string(),
        TransportError::LocalFile { .. } => "local file".to_string(),
    }
}
