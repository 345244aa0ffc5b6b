//! # Editing Session
//!
//! Finite-state machine around one carrier image:
//!
//! ```text
//! NoImage → ImageStaged{valid} → Uploaded → EmbedPending → Completed(Embedded)
//!                                        ↘ ExtractPending → Completed(Extracted)
//! ```
//!
//! with `reset` leading back to `NoImage` from anywhere.
//!
//! ## Dispatch and completion
//!
//! Remote operations are split in two halves so the cooperative loop can
//! keep handling user input while a request is outstanding:
//! - `begin_*` validates the request, marks it in flight and returns a ticket
//!   carrying the session generation at dispatch time
//! - `complete_*` takes the ticket back with the service result and applies it
//!
//! A reset (or a new selection) bumps the generation. A ticket from an older
//! generation completes as [`Completion::Stale`] without touching the session.

use log::{info, warn};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::capacity::{AdmissionReport, CandidateFile, CapacityLedger, CapacitySummary};
use super::error::SessionError;
use super::retry::{PasswordRetryPolicy, RetryDecision};
use crate::client::client::TransportError;
use crate::common::config::SessionConfig;
use crate::common::messages::{
    EmbedResponse, ExtractResponse, ExtractStatus, UploadResponse,
};

/// The three operations offered by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Upload,
    Embed,
    Extract,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Upload => "upload",
            Operation::Embed => "embed",
            Operation::Extract => "extract",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Completed {
    Embedded,
    Extracted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    NoImage,
    ImageStaged { valid: bool },
    Uploaded,
    EmbedPending,
    ExtractPending { password_required: bool },
    Completed(Completed),
}

impl Stage {
    /// Stages in which the carrier can take a new payload selection.
    ///
    /// A finished embed leaves the carrier as good as freshly uploaded.
    pub fn accepts_payload(&self) -> bool {
        matches!(self, Stage::Uploaded | Stage::Completed(Completed::Embedded))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::NoImage => f.write_str("without an image"),
            Stage::ImageStaged { valid: true } => f.write_str("staged"),
            Stage::ImageStaged { valid: false } => f.write_str("staged with an unsupported image"),
            Stage::Uploaded => f.write_str("uploaded"),
            Stage::EmbedPending => f.write_str("embedding"),
            Stage::ExtractPending { .. } => f.write_str("extracting"),
            Stage::Completed(Completed::Embedded) => f.write_str("embedded"),
            Stage::Completed(Completed::Extracted) => f.write_str("extracted"),
        }
    }
}

/// The image selected to carry the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CarrierImage {
    pub name: String,
    pub path: PathBuf,
    /// MIME type declared for the file (derived from its extension)
    pub mime_type: String,
}

impl CarrierImage {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Describes an image file on disk.
    ///
    /// # Errors
    ///
    /// Fails if the path does not exist or is not a regular file.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a file", path.display()),
            ));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        Ok(Self::new(name, path, declared_mime(path)))
    }
}

/// MIME type implied by a file's extension.
pub fn declared_mime(path: &Path) -> &'static str {
    use image::ImageFormat;

    match ImageFormat::from_path(path) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Bmp) => "image/bmp",
        Ok(ImageFormat::Tiff) => "image/tiff",
        Ok(ImageFormat::Ico) => "image/x-icon",
        _ => "application/octet-stream",
    }
}

/// Everything known about an uploaded carrier.
///
/// Owns the capacity ledger and the extraction retry policy; both die with it.
#[derive(Debug, Clone)]
pub struct CarrierSession {
    id: Uuid,
    image: CarrierImage,
    coded: bool,
    password_protected: bool,
    ledger: CapacityLedger,
    retry: PasswordRetryPolicy,
}

impl CarrierSession {
    fn new(image: CarrierImage, response: &UploadResponse, config: &SessionConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            image,
            coded: response.coded_already,
            password_protected: response.password_protected,
            ledger: CapacityLedger::new(
                response.capacity_bytes,
                response.overhead_per_file_bytes,
                config.admission,
            ),
            retry: PasswordRetryPolicy::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn image(&self) -> &CarrierImage {
        &self.image
    }

    pub fn is_coded(&self) -> bool {
        self.coded
    }

    pub fn is_password_protected(&self) -> bool {
        self.password_protected
    }

    pub fn ledger(&self) -> &CapacityLedger {
        &self.ledger
    }

    pub fn retry_policy(&self) -> &PasswordRetryPolicy {
        &self.retry
    }
}

impl fmt::Display for CarrierSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "File coded: {}, Password protected: {}, Embed capacity: {} bytes",
            self.coded,
            self.password_protected,
            self.ledger.remaining()
        )
    }
}

/// Admitted files and optional password submitted in one embed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedBatch {
    pub files: Vec<CandidateFile>,
    pub password: Option<String>,
}

#[derive(Debug)]
pub struct UploadTicket {
    generation: u64,
    image: CarrierImage,
}

impl UploadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn image(&self) -> &CarrierImage {
        &self.image
    }
}

#[derive(Debug)]
pub struct EmbedTicket {
    generation: u64,
    batch: EmbedBatch,
}

impl EmbedTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn batch(&self) -> &EmbedBatch {
        &self.batch
    }
}

#[derive(Debug)]
pub struct ExtractTicket {
    generation: u64,
    password: Option<String>,
}

impl ExtractTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

/// How a completed request affected the session.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum Completion<T> {
    /// The result was applied to the session.
    Applied(T),
    /// The session moved on since dispatch; nothing was changed.
    Stale,
    /// The user dismissed a prompt; nothing was dispatched.
    Cancelled,
}

impl<T> Completion<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            Completion::Applied(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Completion::Stale)
    }
}

/// First step of an extraction.
#[derive(Debug)]
pub enum ExtractStart {
    /// The carrier is password protected; ask the user.
    PromptPassword,
    /// No password needed; the request can go out right away.
    Dispatch(ExtractTicket),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractOutcome {
    /// The service finished extraction (files may be empty for an uncoded carrier).
    Extracted(ExtractResponse),
    /// The password was wrong; the policy decides whether to prompt again.
    WrongPassword(RetryDecision),
}

/// Which user controls may be used right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Controls {
    pub upload: bool,
    pub select_payload: bool,
    pub submit_embed: bool,
    pub extract: bool,
}

/// Read-only picture of the session for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub stage: Stage,
    pub generation: u64,
    pub carrier: Option<String>,
    pub coded: bool,
    pub password_protected: bool,
    pub capacity: Option<CapacitySummary>,
    pub admitted: Vec<String>,
    pub password_attempts: u32,
    pub controls: Controls,
}

#[derive(Debug, Default)]
struct InFlight {
    upload: bool,
    /// Stage to restore if the embed fails in transport
    embed: Option<Stage>,
    /// Stage to restore if the extract fails in transport
    extract: Option<Stage>,
    /// Stage the extraction password prompt was opened from
    prompt_resume: Option<Stage>,
}

/// One editing session around a single carrier image.
#[derive(Debug)]
pub struct EditingSession {
    config: SessionConfig,
    stage: Stage,
    generation: u64,
    staged: Option<CarrierImage>,
    carrier: Option<CarrierSession>,
    in_flight: InFlight,
    last_embed: Option<EmbedResponse>,
    last_extract: Option<ExtractResponse>,
}

impl EditingSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            stage: Stage::NoImage,
            generation: 0,
            staged: None,
            carrier: None,
            in_flight: InFlight::default(),
            last_embed: None,
            last_extract: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn staged_image(&self) -> Option<&CarrierImage> {
        self.staged.as_ref()
    }

    pub fn carrier(&self) -> Option<&CarrierSession> {
        self.carrier.as_ref()
    }

    /// Files admitted for the next embed, in selection order.
    pub fn admitted(&self) -> &[CandidateFile] {
        self.carrier
            .as_ref()
            .map(|carrier| carrier.ledger.admitted())
            .unwrap_or(&[])
    }

    pub fn last_embed(&self) -> Option<&EmbedResponse> {
        self.last_embed.as_ref()
    }

    pub fn last_extract(&self) -> Option<&ExtractResponse> {
        self.last_extract.as_ref()
    }

    pub fn is_in_flight(&self, operation: Operation) -> bool {
        match operation {
            Operation::Upload => self.in_flight.upload,
            Operation::Embed => self.in_flight.embed.is_some(),
            Operation::Extract => self.in_flight.extract.is_some(),
        }
    }

    pub fn controls(&self) -> Controls {
        let carrier = self.carrier.as_ref();
        let select_payload =
            carrier.is_some() && self.stage.accepts_payload() && !self.is_in_flight(Operation::Embed);

        Controls {
            upload: self.stage == Stage::ImageStaged { valid: true }
                && !self.is_in_flight(Operation::Upload),
            select_payload,
            submit_embed: select_payload && carrier.is_some_and(|c| !c.ledger.is_empty()),
            extract: carrier.is_some_and(|c| c.coded)
                && self.stage.accepts_payload()
                && !self.is_in_flight(Operation::Extract),
        }
    }

    pub fn view(&self) -> SessionView {
        let carrier = self.carrier.as_ref();
        SessionView {
            stage: self.stage,
            generation: self.generation,
            carrier: carrier
                .map(|c| c.image.name.clone())
                .or_else(|| self.staged.as_ref().map(|image| image.name.clone())),
            coded: carrier.is_some_and(|c| c.coded),
            password_protected: carrier.is_some_and(|c| c.password_protected),
            capacity: carrier.map(|c| c.ledger.summary()),
            admitted: self.admitted().iter().map(|f| f.name.clone()).collect(),
            password_attempts: carrier.map(|c| c.retry.attempts()).unwrap_or(0),
            controls: self.controls(),
        }
    }

    /// Discards everything and returns to `NoImage`.
    ///
    /// Responses still in flight become stale.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.stage = Stage::NoImage;
        self.staged = None;
        self.carrier = None;
        self.in_flight = InFlight::default();
        self.last_embed = None;
        self.last_extract = None;
        info!("🔄 Session reset (generation {})", self.generation);
    }

    /// Stages a newly selected carrier image, discarding any previous session.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnsupportedImage`] if the declared type is not the
    /// supported container. Nothing stays staged in that case.
    pub fn select_image(&mut self, image: CarrierImage) -> Result<(), SessionError> {
        self.reset();

        if image.mime_type != self.config.carrier_mime {
            warn!(
                "⚠️  Rejected carrier {} of type {}",
                image.name, image.mime_type
            );
            self.stage = Stage::ImageStaged { valid: false };
            return Err(SessionError::UnsupportedImage {
                expected: self.config.carrier_mime.clone(),
                mime: image.mime_type,
            });
        }

        info!("🖼️  Staged carrier image {}", image.name);
        self.staged = Some(image);
        self.stage = Stage::ImageStaged { valid: true };
        Ok(())
    }

    pub fn begin_upload(&mut self) -> Result<UploadTicket, SessionError> {
        if self.in_flight.upload {
            return Err(SessionError::OperationInFlight(Operation::Upload));
        }
        let image = match (self.stage, &self.staged) {
            (Stage::ImageStaged { valid: true }, Some(image)) => image.clone(),
            _ => return Err(self.invalid(Operation::Upload)),
        };

        self.in_flight.upload = true;
        Ok(UploadTicket {
            generation: self.generation,
            image,
        })
    }

    /// Applies an upload result.
    ///
    /// Success seeds a fresh [`CarrierSession`] and bumps the generation.
    /// A transport failure leaves the image staged for another attempt.
    pub fn complete_upload(
        &mut self,
        ticket: UploadTicket,
        result: Result<UploadResponse, TransportError>,
    ) -> Result<Completion<UploadResponse>, SessionError> {
        if self.is_stale(ticket.generation, Operation::Upload) {
            return Ok(Completion::Stale);
        }
        self.in_flight.upload = false;

        let response = result.map_err(|source| transport(Operation::Upload, source))?;
        let carrier = CarrierSession::new(ticket.image, &response, &self.config);
        self.generation += 1;

        info!(
            "✅ Uploaded {} as session {}: {}",
            carrier.image.name, carrier.id, carrier
        );

        self.carrier = Some(carrier);
        self.staged = None;
        self.stage = Stage::Uploaded;
        Ok(Completion::Applied(response))
    }

    /// Offers a batch of candidate files to the capacity ledger.
    pub fn queue_files(&mut self, batch: Vec<CandidateFile>) -> Result<AdmissionReport, SessionError> {
        if self.is_in_flight(Operation::Embed) {
            return Err(SessionError::OperationInFlight(Operation::Embed));
        }
        if !self.stage.accepts_payload() {
            return Err(self.invalid(Operation::Embed));
        }
        let invalid = self.invalid(Operation::Embed);
        let carrier = self.carrier.as_mut().ok_or(invalid)?;

        Ok(carrier.ledger.admit(batch))
    }

    /// Checks that an embed could be dispatched right now, without dispatching.
    pub fn embed_preflight(&self) -> Result<(), SessionError> {
        if self.is_in_flight(Operation::Embed) {
            return Err(SessionError::OperationInFlight(Operation::Embed));
        }
        match &self.carrier {
            Some(carrier) if self.stage.accepts_payload() => {
                if carrier.ledger.is_empty() {
                    Err(SessionError::EmptySelection)
                } else {
                    Ok(())
                }
            }
            _ => Err(self.invalid(Operation::Embed)),
        }
    }

    /// Packs the admitted set into an embed request.
    ///
    /// An empty password means no password.
    pub fn begin_embed(&mut self, password: Option<String>) -> Result<EmbedTicket, SessionError> {
        self.embed_preflight()?;

        let batch = EmbedBatch {
            files: self.admitted().to_vec(),
            password: password.filter(|p| !p.is_empty()),
        };

        self.in_flight.embed = Some(self.stage);
        self.stage = Stage::EmbedPending;
        Ok(EmbedTicket {
            generation: self.generation,
            batch,
        })
    }

    /// Applies an embed result.
    ///
    /// Success clears the admitted set and restores the ledger's initial
    /// balance for the replaced carrier. A transport failure restores the
    /// stage so the same batch can be resubmitted.
    pub fn complete_embed(
        &mut self,
        ticket: EmbedTicket,
        result: Result<EmbedResponse, TransportError>,
    ) -> Result<Completion<EmbedResponse>, SessionError> {
        if self.is_stale(ticket.generation, Operation::Embed) {
            return Ok(Completion::Stale);
        }
        let resume = self.in_flight.embed.take().unwrap_or(Stage::Uploaded);

        let response = match result {
            Ok(response) => response,
            Err(source) => {
                self.stage = resume;
                return Err(transport(Operation::Embed, source));
            }
        };

        if let Some(carrier) = self.carrier.as_mut() {
            carrier.ledger.clear();
            carrier.coded = true;
            carrier.password_protected = ticket.batch.password.is_some();
            carrier.retry.reset();
            info!(
                "✅ Embedded {} file(s) into {}",
                response.embedded_count, carrier.image.name
            );
        }

        self.stage = Stage::Completed(Completed::Embedded);
        self.last_embed = Some(response.clone());
        Ok(Completion::Applied(response))
    }

    /// User asked to extract from the carrier.
    ///
    /// Starts a fresh local attempt cycle if the previous one was exhausted.
    pub fn request_extract(&mut self) -> Result<ExtractStart, SessionError> {
        if self.is_in_flight(Operation::Extract) {
            return Err(SessionError::OperationInFlight(Operation::Extract));
        }
        if !self.stage.accepts_payload() {
            return Err(self.invalid(Operation::Extract));
        }
        let invalid = self.invalid(Operation::Extract);
        let previous = self.stage;
        let carrier = self.carrier.as_mut().ok_or(invalid)?;
        if !carrier.coded {
            return Err(SessionError::NotCoded);
        }
        if carrier.retry.manual_retrigger() {
            info!("Starting a new password attempt cycle for {}", carrier.image.name);
        }

        if carrier.password_protected {
            self.stage = Stage::ExtractPending {
                password_required: true,
            };
            self.in_flight.prompt_resume = Some(previous);
            return Ok(ExtractStart::PromptPassword);
        }

        self.stage = Stage::ExtractPending {
            password_required: false,
        };
        Ok(ExtractStart::Dispatch(self.dispatch_extract(None, previous)))
    }

    /// Sends the password typed into the extraction prompt.
    pub fn submit_extract_password(&mut self, password: String) -> Result<ExtractTicket, SessionError> {
        if self.is_in_flight(Operation::Extract) {
            return Err(SessionError::OperationInFlight(Operation::Extract));
        }
        if self.stage != (Stage::ExtractPending { password_required: true }) {
            return Err(self.invalid(Operation::Extract));
        }

        let resume = self.in_flight.prompt_resume.unwrap_or(Stage::Uploaded);
        Ok(self.dispatch_extract(Some(password), resume))
    }

    /// The user dismissed the extraction password prompt.
    pub fn cancel_password_prompt(&mut self) {
        if self.stage == (Stage::ExtractPending { password_required: true })
            && !self.is_in_flight(Operation::Extract)
        {
            self.stage = Stage::Uploaded;
        }
    }

    /// Applies an extract result.
    ///
    /// A wrong password is not an error: it is counted by the retry policy,
    /// which decides whether the prompt re-opens. Any other outcome resets
    /// the count and completes the extraction.
    pub fn complete_extract(
        &mut self,
        ticket: ExtractTicket,
        result: Result<ExtractResponse, TransportError>,
    ) -> Result<Completion<ExtractOutcome>, SessionError> {
        if self.is_stale(ticket.generation, Operation::Extract) {
            return Ok(Completion::Stale);
        }
        let resume = self.in_flight.extract.take().unwrap_or(Stage::Uploaded);

        let response = match result {
            Ok(response) => response,
            Err(source) => {
                self.stage = resume;
                return Err(transport(Operation::Extract, source));
            }
        };

        let Some(carrier) = self.carrier.as_mut() else {
            return Ok(Completion::Stale);
        };

        if response.status == ExtractStatus::WrongPassword {
            let decision = carrier.retry.record_wrong_password();
            warn!(
                "🔒 Wrong password for {} (attempt {} of {})",
                carrier.image.name,
                decision.attempt(),
                super::retry::MAX_PASSWORD_ATTEMPTS
            );
            self.stage = if decision.reprompts() {
                Stage::ExtractPending {
                    password_required: true,
                }
            } else {
                Stage::Uploaded
            };
            return Ok(Completion::Applied(ExtractOutcome::WrongPassword(decision)));
        }

        carrier.retry.reset();
        info!(
            "✅ Extracted {} file(s) from {} ({:?})",
            response.files.len(),
            carrier.image.name,
            response.status
        );

        self.stage = Stage::Completed(Completed::Extracted);
        self.last_extract = Some(response.clone());
        Ok(Completion::Applied(ExtractOutcome::Extracted(response)))
    }

    fn dispatch_extract(&mut self, password: Option<String>, resume: Stage) -> ExtractTicket {
        self.in_flight.extract = Some(resume);
        ExtractTicket {
            generation: self.generation,
            password,
        }
    }

    fn is_stale(&self, generation: u64, operation: Operation) -> bool {
        if generation == self.generation {
            return false;
        }
        warn!(
            "Dropping stale {} response (dispatched at generation {}, now {})",
            operation, generation, self.generation
        );
        true
    }

    fn invalid(&self, operation: Operation) -> SessionError {
        SessionError::InvalidTransition {
            operation,
            stage: self.stage,
        }
    }
}

fn transport(operation: Operation, source: TransportError) -> SessionError {
    warn!("❌ {} failed: {}", operation, source);
    SessionError::Transport { operation, source }
}
