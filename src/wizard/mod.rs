//! Registration wizard: a linear flow from the artwork form through the
//! optional certificate and NFC steps to completion.
//!
//! ```text
//! Form -> CoaDecision -> CoaGeneration -> NfcBinding -> Complete
//!              \_______________skip_______/     \__skip__/
//! ```
//!
//! Nothing is persisted here. Once `Complete` is reached the caller turns
//! the wizard into a [`RegistrationRequest`] and hands it to
//! `services::registration::register_artwork`.

pub mod autosave;
pub mod form;

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result, ValidationErrors};
use crate::models::{CertificateData, NfcBinding};
use crate::services::registration::RegistrationRequest;
use crate::simulate::{CertificateIssuer, CertificateRequest, Task, TagReader, TaskStatus};

pub use autosave::Autosave;
pub use form::{ArtworkForm, EditionType, ValidatedForm};

pub const ARTIST_NAME_FIELD: &str = "artistName";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WizardStage {
    Form,
    CoaDecision,
    CoaGeneration,
    NfcBinding,
    Complete,
}

impl WizardStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            WizardStage::Form => "form",
            WizardStage::CoaDecision => "coa-decision",
            WizardStage::CoaGeneration => "coa-generation",
            WizardStage::NfcBinding => "nfc-binding",
            WizardStage::Complete => "complete",
        }
    }
}

pub struct RegistrationWizard {
    stage: WizardStage,
    form: ArtworkForm,
    errors: ValidationErrors,
    validated: Option<ValidatedForm>,
    artist_name: String,
    certificate_task: Option<Task<CertificateData>>,
    certificate: Option<CertificateData>,
    certificate_error: Option<String>,
    bind_nfc: bool,
    scan_task: Option<Task<NfcBinding>>,
    nfc: Option<NfcBinding>,
    scan_error: Option<String>,
    nfc_entered_from: WizardStage,
    autosave: Autosave,
    current_year: i32,
    max_image_bytes: usize,
}

impl RegistrationWizard {
    pub fn new(current_year: i32, max_image_bytes: usize, autosave_delay: Duration) -> Self {
        Self {
            stage: WizardStage::Form,
            form: ArtworkForm::default(),
            errors: ValidationErrors::new(),
            validated: None,
            artist_name: String::new(),
            certificate_task: None,
            certificate: None,
            certificate_error: None,
            bind_nfc: false,
            scan_task: None,
            nfc: None,
            scan_error: None,
            nfc_entered_from: WizardStage::CoaDecision,
            autosave: Autosave::new(autosave_delay),
            current_year,
            max_image_bytes,
        }
    }

    pub fn stage(&self) -> WizardStage {
        self.stage
    }

    pub fn form(&self) -> &ArtworkForm {
        &self.form
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn certificate(&self) -> Option<&CertificateData> {
        self.certificate.as_ref()
    }

    pub fn certificate_error(&self) -> Option<&str> {
        self.certificate_error.as_deref()
    }

    pub fn nfc(&self) -> Option<&NfcBinding> {
        self.nfc.as_ref()
    }

    pub fn scan_error(&self) -> Option<&str> {
        self.scan_error.as_deref()
    }

    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.autosave.last_saved()
    }

    fn expect_stage(&self, allowed: &[WizardStage], action: &'static str) -> Result<()> {
        if allowed.contains(&self.stage) {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                stage: self.stage.as_str(),
                action,
            })
        }
    }

    fn move_to(&mut self, next: WizardStage) {
        debug!("Wizard {} -> {}", self.stage.as_str(), next.as_str());
        self.stage = next;
    }

    /// Applies an edit to the draft and restarts the autosave window.
    pub fn edit_form<F>(&mut self, now: Instant, edit: F) -> Result<()>
    where
        F: FnOnce(&mut ArtworkForm),
    {
        self.expect_stage(&[WizardStage::Form], "edit the artwork form")?;
        edit(&mut self.form);
        self.autosave.record_edit(now);
        Ok(())
    }

    /// Drives the debounced autosave. Returns true when a save fired.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.stage != WizardStage::Form {
            return false;
        }
        let fired = self.autosave.fire_if_due(now, Utc::now());
        if fired {
            debug!("Draft autosaved");
        }
        fired
    }

    /// Validates the form and, only if every rule passes, moves on to the
    /// certificate decision.
    pub fn submit(&mut self) -> Result<()> {
        self.expect_stage(&[WizardStage::Form], "submit the artwork form")?;
        match self.form.validate(self.current_year, self.max_image_bytes) {
            Ok(validated) => {
                self.errors = ValidationErrors::new();
                if self.artist_name.trim().is_empty() {
                    self.artist_name = validated.artwork.artist.clone().unwrap_or_default();
                }
                self.validated = Some(validated);
                self.autosave.cancel_pending();
                self.move_to(WizardStage::CoaDecision);
                Ok(())
            }
            Err(errors) => {
                info!("Artwork form rejected: {}", errors);
                self.errors = errors.clone();
                Err(Error::Validation(errors))
            }
        }
    }

    pub fn choose_certificate(&mut self) -> Result<()> {
        self.expect_stage(&[WizardStage::CoaDecision], "generate a certificate")?;
        self.move_to(WizardStage::CoaGeneration);
        Ok(())
    }

    /// Leaves the certificate steps without a certificate.
    pub fn skip_certificate(&mut self) -> Result<()> {
        self.expect_stage(
            &[WizardStage::CoaDecision, WizardStage::CoaGeneration],
            "skip the certificate",
        )?;
        self.certificate_task = None;
        self.certificate = None;
        self.certificate_error = None;
        self.nfc_entered_from = self.stage;
        self.move_to(WizardStage::NfcBinding);
        Ok(())
    }

    pub fn set_artist_name(&mut self, name: &str) -> Result<()> {
        self.expect_stage(&[WizardStage::CoaGeneration], "set the certificate artist")?;
        self.artist_name = name.to_string();
        Ok(())
    }

    pub fn start_certificate(&mut self, issuer: &dyn CertificateIssuer) -> Result<()> {
        self.expect_stage(&[WizardStage::CoaGeneration], "generate a certificate")?;
        if self.certificate_task.is_some() {
            return Err(Error::InvalidTransition {
                stage: self.stage.as_str(),
                action: "start a second certificate generation",
            });
        }
        let artist_name = self.artist_name.trim();
        if artist_name.is_empty() {
            return Err(Error::Validation(ValidationErrors::single(
                ARTIST_NAME_FIELD,
                "Artist name is required to generate a certificate",
            )));
        }
        let title = self
            .validated
            .as_ref()
            .map(|v| v.artwork.title.clone())
            .unwrap_or_default();
        let request = CertificateRequest {
            artwork_title: title,
            artist_name: artist_name.to_string(),
        };
        info!("Generating certificate for '{}'", request.artwork_title);
        self.certificate = None;
        self.certificate_error = None;
        self.certificate_task = Some(issuer.issue(&request));
        Ok(())
    }

    fn settle_certificate(&mut self, status: TaskStatus<CertificateData>) -> TaskStatus<CertificateData> {
        match &status {
            TaskStatus::Pending => {}
            TaskStatus::Succeeded(certificate) => {
                self.certificate = Some(certificate.clone());
                self.certificate_task = None;
            }
            TaskStatus::Failed(message) => {
                warn!("Certificate generation failed: {}", message);
                self.certificate_error = Some(message.clone());
                self.certificate_task = None;
            }
        }
        status
    }

    /// Non-blocking progress check on the running certificate generation.
    pub fn poll_certificate(&mut self) -> TaskStatus<CertificateData> {
        let status = match self.certificate_task.as_mut() {
            Some(task) => task.poll().clone(),
            None => return self.certificate_status(),
        };
        self.settle_certificate(status)
    }

    pub fn wait_certificate(&mut self) -> TaskStatus<CertificateData> {
        match self.certificate_task.take() {
            Some(task) => {
                let status = task.wait();
                self.settle_certificate(status)
            }
            None => self.certificate_status(),
        }
    }

    fn certificate_status(&self) -> TaskStatus<CertificateData> {
        match (&self.certificate, &self.certificate_error) {
            (Some(certificate), _) => TaskStatus::Succeeded(certificate.clone()),
            (None, Some(message)) => TaskStatus::Failed(message.clone()),
            (None, None) => TaskStatus::Failed("certificate generation has not started".to_string()),
        }
    }

    pub fn continue_to_nfc(&mut self) -> Result<()> {
        self.expect_stage(&[WizardStage::CoaGeneration], "continue to NFC binding")?;
        if self.certificate.is_none() {
            return Err(Error::InvalidTransition {
                stage: self.stage.as_str(),
                action: "continue before the certificate is generated",
            });
        }
        self.nfc_entered_from = WizardStage::CoaGeneration;
        self.move_to(WizardStage::NfcBinding);
        Ok(())
    }

    pub fn set_bind_nfc(&mut self, bind: bool) -> Result<()> {
        self.expect_stage(&[WizardStage::NfcBinding], "toggle NFC binding")?;
        self.bind_nfc = bind;
        if !bind {
            self.scan_task = None;
            self.nfc = None;
            self.scan_error = None;
        }
        Ok(())
    }

    pub fn start_scan(&mut self, reader: &dyn TagReader) -> Result<()> {
        self.expect_stage(&[WizardStage::NfcBinding], "scan an NFC tag")?;
        if !self.bind_nfc {
            return Err(Error::InvalidTransition {
                stage: self.stage.as_str(),
                action: "scan without enabling NFC binding",
            });
        }
        if self.scan_task.is_some() {
            return Err(Error::InvalidTransition {
                stage: self.stage.as_str(),
                action: "start a second scan",
            });
        }
        info!("Waiting for NFC tag");
        self.nfc = None;
        self.scan_error = None;
        self.scan_task = Some(reader.scan());
        Ok(())
    }

    fn settle_scan(&mut self, status: TaskStatus<NfcBinding>) -> TaskStatus<NfcBinding> {
        match &status {
            TaskStatus::Pending => {}
            TaskStatus::Succeeded(binding) => {
                self.nfc = Some(binding.clone());
                self.scan_task = None;
            }
            TaskStatus::Failed(message) => {
                warn!("NFC scan failed: {}", message);
                self.scan_error = Some(message.clone());
                self.scan_task = None;
            }
        }
        status
    }

    pub fn poll_scan(&mut self) -> TaskStatus<NfcBinding> {
        let status = match self.scan_task.as_mut() {
            Some(task) => task.poll().clone(),
            None => return self.scan_status(),
        };
        self.settle_scan(status)
    }

    pub fn wait_scan(&mut self) -> TaskStatus<NfcBinding> {
        match self.scan_task.take() {
            Some(task) => {
                let status = task.wait();
                self.settle_scan(status)
            }
            None => self.scan_status(),
        }
    }

    fn scan_status(&self) -> TaskStatus<NfcBinding> {
        match (&self.nfc, &self.scan_error) {
            (Some(binding), _) => TaskStatus::Succeeded(binding.clone()),
            (None, Some(message)) => TaskStatus::Failed(message.clone()),
            (None, None) => TaskStatus::Failed("no NFC scan has been started".to_string()),
        }
    }

    pub fn complete(&mut self) -> Result<()> {
        self.expect_stage(&[WizardStage::NfcBinding], "complete registration")?;
        if self.bind_nfc && self.nfc.is_none() {
            return Err(Error::InvalidTransition {
                stage: self.stage.as_str(),
                action: "complete before the tag is scanned",
            });
        }
        self.move_to(WizardStage::Complete);
        Ok(())
    }

    pub fn skip_nfc(&mut self) -> Result<()> {
        self.expect_stage(&[WizardStage::NfcBinding], "skip NFC binding")?;
        self.bind_nfc = false;
        self.scan_task = None;
        self.nfc = None;
        self.scan_error = None;
        self.move_to(WizardStage::Complete);
        Ok(())
    }

    /// Steps back one stage. In-flight tasks are abandoned.
    pub fn back(&mut self) -> Result<()> {
        match self.stage {
            WizardStage::CoaDecision | WizardStage::CoaGeneration => {
                // A certificate belongs to the submission it was generated for.
                self.certificate_task = None;
                self.certificate = None;
                self.certificate_error = None;
                self.artist_name.clear();
                self.validated = None;
                self.move_to(WizardStage::Form);
                Ok(())
            }
            WizardStage::NfcBinding => {
                self.scan_task = None;
                self.nfc = None;
                self.scan_error = None;
                let previous = self.nfc_entered_from;
                self.move_to(previous);
                Ok(())
            }
            WizardStage::Form | WizardStage::Complete => Err(Error::InvalidTransition {
                stage: self.stage.as_str(),
                action: "go back",
            }),
        }
    }

    /// Everything accumulated by the wizard, ready to be persisted.
    pub fn registration_request(&self) -> Result<RegistrationRequest> {
        self.expect_stage(&[WizardStage::Complete], "build the registration")?;
        let validated = self.validated.as_ref().ok_or(Error::InvalidTransition {
            stage: self.stage.as_str(),
            action: "build the registration without a validated form",
        })?;
        Ok(RegistrationRequest {
            artwork: validated.artwork.clone(),
            image: Some(validated.image.clone()),
            certificate: self.certificate.clone(),
            nfc: self.nfc.clone(),
        })
    }

    /// Resets everything and returns to an empty form.
    pub fn acknowledge(&mut self) -> Result<()> {
        self.expect_stage(&[WizardStage::Complete], "start a new registration")?;
        let delay = self.autosave.delay();
        *self = Self::new(self.current_year, self.max_image_bytes, delay);
        Ok(())
    }
}
