//! The AS2 client builder and send pipeline.
//!
//! [`As2ClientBuilder`] holds everything one send needs: identity and
//! credential fields, routing identifiers, the business document and the
//! external collaborators (SMP lookup, AS2 transport). Fields can be set in
//! any order; nothing is validated at set time. [`As2ClientBuilder::send`]
//! then runs the pipeline: resolve the receiver through the SMP, apply
//! derived defaults, verify all fields, wrap the document in an SBDH
//! envelope and dispatch it.

use crate::as2::{
    As2ClientRequest, As2ClientResponse, As2ClientSettings, As2Transport, DispositionOptions,
    KeyStore, ReceiverData, SenderData, SigningAlgorithm,
};
use crate::document::{DocumentSource, inspect_xml_root};
use crate::error::{As2ClientError, As2Result};
use crate::handler::{FailFastHandler, MessageHandler, Severity};
use crate::identifier::{DocumentTypeId, ParticipantId, ProcessId};
use crate::pki::Certificate;
use crate::sbdh::Envelope;
use crate::smp::{SmpLookup, TRANSPORT_PROFILE_AS2};
use std::path::PathBuf;
use tracing::{debug, info};
use url::Url;

/// Default AS2 message subject.
pub const DEFAULT_SUBJECT: &str = "OpenPEPPOL AS2 message";

/// Default signing algorithm, per the Peppol AS2 profile.
pub const DEFAULT_SIGNING_ALGORITHM: SigningAlgorithm = SigningAlgorithm::Sha1;

/// Default message-ID format template.
pub const DEFAULT_MESSAGE_ID_FORMAT: &str =
    "OpenPEPPOL-$date.ddMMyyyyHHmmssZ$-$rand.1234$@$msg.sender.as2_id$_$msg.receiver.as2_id$";

/// Expected prefix of access point AS2 IDs and key aliases.
pub const AP_ID_PREFIX: &str = "APP_";

/// Builder for one AS2 send to a Peppol participant.
///
/// Not safe for concurrent mutation; sequential reuse is fine since every
/// stage re-derives its output from the current field values. When reusing a
/// builder with a [`crate::handler::CollectingHandler`], install a fresh
/// handler before the next send so stale issues do not block it.
pub struct As2ClientBuilder {
    handler: Box<dyn MessageHandler>,
    key_store_path: Option<PathBuf>,
    key_store_password: Option<String>,
    subject: String,
    sender_as2_id: Option<String>,
    sender_email: Option<String>,
    sender_key_alias: Option<String>,
    receiver_as2_id: Option<String>,
    receiver_key_alias: Option<String>,
    receiver_url: Option<String>,
    receiver_certificate: Option<Certificate>,
    signing_algorithm: SigningAlgorithm,
    message_id_format: String,
    business_document: Option<DocumentSource>,
    sender_participant: Option<ParticipantId>,
    receiver_participant: Option<ParticipantId>,
    document_type: Option<DocumentTypeId>,
    process: Option<ProcessId>,
    smp: Option<Box<dyn SmpLookup>>,
    transport: Option<Box<dyn As2Transport>>,
}

impl Default for As2ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl As2ClientBuilder {
    /// Creates a builder with all defaults and no fields set.
    pub fn new() -> Self {
        Self {
            handler: Box::new(FailFastHandler::new()),
            key_store_path: None,
            key_store_password: None,
            subject: DEFAULT_SUBJECT.to_string(),
            sender_as2_id: None,
            sender_email: None,
            sender_key_alias: None,
            receiver_as2_id: None,
            receiver_key_alias: None,
            receiver_url: None,
            receiver_certificate: None,
            signing_algorithm: DEFAULT_SIGNING_ALGORITHM,
            message_id_format: DEFAULT_MESSAGE_ID_FORMAT.to_string(),
            business_document: None,
            sender_participant: None,
            receiver_participant: None,
            document_type: None,
            process: None,
            smp: None,
            transport: None,
        }
    }

    // ── Fluent setters (pure assignments, validated only at send time) ──

    /// Sets the issue-handling policy. The default fail-fast handler aborts
    /// on the first error; a collecting handler surfaces all issues at once.
    pub fn set_message_handler(mut self, handler: Box<dyn MessageHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Sets the PKCS#12 key store file and password. The file must exist at
    /// send time and hold at least the sender key alias.
    pub fn set_pkcs12_key_store(
        mut self,
        path: impl Into<PathBuf>,
        password: impl Into<String>,
    ) -> Self {
        self.key_store_path = Some(path.into());
        self.key_store_password = Some(password.into());
        self
    }

    /// Sets the AS2 message subject.
    pub fn set_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Sets the AS2 sender ID (the `AS2-From` header). For Peppol this is
    /// the common name of the sender's access point certificate and usually
    /// starts with `APP_`.
    pub fn set_sender_as2_id(mut self, id: impl Into<String>) -> Self {
        self.sender_as2_id = Some(id.into());
        self
    }

    /// Sets the sender email address.
    pub fn set_sender_email(mut self, email: impl Into<String>) -> Self {
        self.sender_email = Some(email.into());
        self
    }

    /// Sets the key alias of the sender's key in the key store. Should match
    /// the AS2 sender ID.
    pub fn set_sender_key_alias(mut self, alias: impl Into<String>) -> Self {
        self.sender_key_alias = Some(alias.into());
        self
    }

    /// Sets the AS2 receiver ID (the `AS2-To` header). Left unset, it is
    /// derived from the receiver certificate found in the SMP response.
    pub fn set_receiver_as2_id(mut self, id: impl Into<String>) -> Self {
        self.receiver_as2_id = Some(id.into());
        self
    }

    /// Sets the key alias under which the receiver certificate is stored.
    /// Left unset, it defaults to the AS2 receiver ID.
    pub fn set_receiver_key_alias(mut self, alias: impl Into<String>) -> Self {
        self.receiver_key_alias = Some(alias.into());
        self
    }

    /// Sets the AS2 endpoint URL of the receiver. Left unset, it is taken
    /// from the SMP response.
    pub fn set_receiver_url(mut self, url: impl Into<String>) -> Self {
        self.receiver_url = Some(url.into());
        self
    }

    /// Sets the receiver access point certificate. Left unset, it is taken
    /// from the SMP response.
    pub fn set_receiver_certificate(mut self, certificate: Certificate) -> Self {
        self.receiver_certificate = Some(certificate);
        self
    }

    /// Sets the signing algorithm. Encryption cannot be configured: the
    /// Peppol AS2 profile forbids business-level encryption.
    pub fn set_signing_algorithm(mut self, algorithm: SigningAlgorithm) -> Self {
        self.signing_algorithm = algorithm;
        self
    }

    /// Sets the message-ID format template.
    pub fn set_message_id_format(mut self, format: impl Into<String>) -> Self {
        self.message_id_format = format.into();
        self
    }

    /// Sets the business document to be transmitted. Must be XML; the SBDH
    /// wrapper is added by the pipeline and must not already be present.
    pub fn set_business_document(mut self, document: DocumentSource) -> Self {
        self.business_document = Some(document);
        self
    }

    /// Sets a file-backed business document.
    pub fn set_business_document_file(self, path: impl Into<PathBuf>) -> Self {
        self.set_business_document(DocumentSource::file(path))
    }

    /// Sets an in-memory business document.
    pub fn set_business_document_bytes(self, data: Vec<u8>) -> Self {
        self.set_business_document(DocumentSource::bytes(data))
    }

    /// Sets the Peppol sender participant ID.
    pub fn set_sender_participant(mut self, id: ParticipantId) -> Self {
        self.sender_participant = Some(id);
        self
    }

    /// Sets the Peppol receiver participant ID.
    pub fn set_receiver_participant(mut self, id: ParticipantId) -> Self {
        self.receiver_participant = Some(id);
        self
    }

    /// Sets the Peppol document type ID.
    pub fn set_document_type(mut self, id: DocumentTypeId) -> Self {
        self.document_type = Some(id);
        self
    }

    /// Sets the Peppol process ID.
    pub fn set_process(mut self, id: ProcessId) -> Self {
        self.process = Some(id);
        self
    }

    /// Sets the SMP lookup used to resolve receiver URL, certificate and AS2
    /// ID. Without it no resolution happens and those fields must be set
    /// explicitly. Explicitly set fields are never overwritten by lookup
    /// results.
    pub fn set_smp_lookup(mut self, smp: Box<dyn SmpLookup>) -> Self {
        self.smp = Some(smp);
        self
    }

    /// Sets the AS2 transport that performs the actual dispatch.
    pub fn set_transport(mut self, transport: Box<dyn As2Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    // ── Accessors ──

    /// The issue handler, for inspecting warnings and errors after a run.
    pub fn message_handler(&self) -> &dyn MessageHandler {
        self.handler.as_ref()
    }

    /// The AS2 receiver ID, if set or resolved.
    pub fn receiver_as2_id(&self) -> Option<&str> {
        self.receiver_as2_id.as_deref()
    }

    /// The receiver key alias, if set or defaulted.
    pub fn receiver_key_alias(&self) -> Option<&str> {
        self.receiver_key_alias.as_deref()
    }

    /// The receiver endpoint URL, if set or resolved.
    pub fn receiver_url(&self) -> Option<&str> {
        self.receiver_url.as_deref()
    }

    /// The receiver certificate, if set or resolved.
    pub fn receiver_certificate(&self) -> Option<&Certificate> {
        self.receiver_certificate.as_ref()
    }

    // ── Pipeline stages ──

    /// Resolves receiver URL, certificate and AS2 ID through the configured
    /// SMP lookup.
    ///
    /// Skipped with a warning when a lookup prerequisite (receiver
    /// participant, document type or process ID) is missing, and silently
    /// when all three target fields are already set. A failed or empty
    /// lookup only warns; an unresolved required field is caught later by
    /// [`Self::verify_content`]. Fields that are already set are never
    /// overwritten.
    pub async fn resolve_receiver(&mut self) -> As2Result<()> {
        let Some(smp) = &self.smp else {
            return Ok(());
        };

        let Some(receiver) = &self.receiver_participant else {
            self.handler.warn(
                "Cannot perform SMP lookup because the Peppol receiver participant ID is missing"
                    .to_string(),
            );
            return Ok(());
        };
        let Some(document_type) = &self.document_type else {
            self.handler.warn(
                "Cannot perform SMP lookup because the Peppol document type ID is missing"
                    .to_string(),
            );
            return Ok(());
        };
        let Some(process) = &self.process else {
            self.handler.warn(
                "Cannot perform SMP lookup because the Peppol process ID is missing".to_string(),
            );
            return Ok(());
        };

        if self.receiver_url.is_some()
            && self.receiver_certificate.is_some()
            && self.receiver_as2_id.is_some()
        {
            debug!("Not performing SMP lookup because all target fields are already set");
            return Ok(());
        }

        debug!(
            "Performing SMP lookup for receiver '{}' on document type '{}' and process '{}' using the AS2 transport profile",
            receiver.as_uri(),
            document_type.as_uri(),
            process.as_uri()
        );
        let endpoint = match smp
            .endpoint(receiver, document_type, process, TRANSPORT_PROFILE_AS2)
            .await
        {
            Ok(endpoint) => endpoint,
            Err(e) => {
                debug!("Error querying SMP: {e}");
                None
            }
        };

        let Some(endpoint) = endpoint else {
            let message = format!(
                "Failed to perform SMP lookup for receiver '{}' on document type '{}' and process '{}' using the AS2 transport profile",
                receiver.as_uri(),
                document_type.as_uri(),
                process.as_uri()
            );
            self.handler.warn(message);
            return Ok(());
        };

        if self.receiver_url.is_none() {
            self.receiver_url = Some(endpoint.url);
        }
        if self.receiver_certificate.is_none() {
            match Certificate::from_base64(&endpoint.certificate) {
                Ok(certificate) => self.receiver_certificate = Some(certificate),
                Err(e) => {
                    self.handler
                        .error(format!("Failed to build X.509 certificate from SMP response: {e}"))?;
                }
            }
        }
        if self.receiver_as2_id.is_none() {
            match &self.receiver_certificate {
                Some(certificate) => match certificate.subject_common_name() {
                    Ok(common_name) => self.receiver_as2_id = Some(common_name),
                    Err(e) => {
                        self.handler.error(format!(
                            "Failed to get the receiver AS2 ID from the receiver certificate: {e}"
                        ))?;
                    }
                },
                None => {
                    self.handler.error(
                        "Failed to get the receiver AS2 ID because no receiver certificate is available"
                            .to_string(),
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Fills fields that can by convention be derived from other fields.
    ///
    /// Only assigns to fields that are currently unset.
    pub fn apply_derived_defaults(&mut self) {
        if self.receiver_key_alias.is_none() {
            // Which may itself still be unset; verification will flag that.
            self.receiver_key_alias = self.receiver_as2_id.clone();
            debug!("The receiver key alias was defaulted to the AS2 receiver ID");
        }
    }

    /// Verifies every field in a fixed order, reporting all findings through
    /// the message handler.
    ///
    /// Under the default fail-fast handler the first error aborts the scan;
    /// with a collecting handler the full list of issues is gathered and the
    /// scan always completes.
    pub fn verify_content(&mut self) -> As2Result<()> {
        match &self.key_store_path {
            None => self.handler.error("No AS2 key store is defined".to_string())?,
            Some(path) => {
                if !path.exists() {
                    self.handler.error(format!(
                        "The provided AS2 key store '{}' does not exist",
                        path.display()
                    ))?;
                } else if !path.is_file() {
                    self.handler.error(format!(
                        "The provided AS2 key store '{}' is not a file but potentially a directory",
                        path.display()
                    ))?;
                }
            }
        }
        if self.key_store_password.is_none() {
            self.handler.error(
                "No key store password provided; if you need an empty password, provide an empty string"
                    .to_string(),
            )?;
        }

        if self.subject.trim().is_empty() {
            self.handler
                .error("The AS2 message subject is missing".to_string())?;
        }

        if !has_text(&self.sender_as2_id) {
            self.handler.error("The AS2 sender ID is missing".to_string())?;
        } else if let Some(id) = self.sender_as2_id.as_deref() {
            if !id.starts_with(AP_ID_PREFIX) {
                self.handler.warn(format!(
                    "The AS2 sender ID '{id}' should start with '{AP_ID_PREFIX}' as required by the Peppol specification"
                ));
            }
        }

        if !has_text(&self.sender_email) {
            self.handler
                .error("The AS2 sender email address is missing".to_string())?;
        } else if let Some(email) = self.sender_email.as_deref() {
            if !is_plausible_email(email) {
                self.handler.warn(format!(
                    "The AS2 sender email address '{email}' seems to be an invalid email address"
                ));
            }
        }

        if !has_text(&self.sender_key_alias) {
            self.handler
                .error("The AS2 sender key alias is missing".to_string())?;
        } else if let Some(alias) = self.sender_key_alias.as_deref() {
            if !alias.starts_with(AP_ID_PREFIX) {
                self.handler.warn(format!(
                    "The AS2 sender key alias '{alias}' should start with '{AP_ID_PREFIX}' for use with dynamic AS2 partnerships"
                ));
            } else if let Some(id) = self.sender_as2_id.as_deref() {
                if id != alias {
                    self.handler.warn(format!(
                        "The AS2 sender key alias ('{alias}') should match the AS2 sender ID ('{id}')"
                    ));
                }
            }
        }

        if !has_text(&self.receiver_as2_id) {
            self.handler
                .error("The AS2 receiver ID is missing".to_string())?;
        } else if let Some(id) = self.receiver_as2_id.as_deref() {
            if !id.starts_with(AP_ID_PREFIX) {
                self.handler.warn(format!(
                    "The AS2 receiver ID '{id}' should start with '{AP_ID_PREFIX}' as required by the Peppol specification"
                ));
            }
        }

        if !has_text(&self.receiver_key_alias) {
            self.handler
                .error("The AS2 receiver key alias is missing".to_string())?;
        } else if let Some(alias) = self.receiver_key_alias.as_deref() {
            if !alias.starts_with(AP_ID_PREFIX) {
                self.handler.warn(format!(
                    "The AS2 receiver key alias '{alias}' should start with '{AP_ID_PREFIX}' for use with dynamic AS2 partnerships"
                ));
            } else if let Some(id) = self.receiver_as2_id.as_deref() {
                if id != alias {
                    self.handler.warn(format!(
                        "The AS2 receiver key alias ('{alias}') should match the AS2 receiver ID ('{id}')"
                    ));
                }
            }
        }

        if !has_text(&self.receiver_url) {
            self.handler
                .error("The AS2 receiver URL (the AS2 endpoint URL) is missing".to_string())?;
        } else if let Some(raw) = self.receiver_url.as_deref() {
            if Url::parse(raw).is_err() {
                self.handler.warn(format!(
                    "The provided AS2 receiver URL '{raw}' seems to be an invalid URL"
                ));
            }
        }

        if self.receiver_certificate.is_none() {
            self.handler.error(
                "The receiver X.509 certificate is missing; usually it is extracted from the SMP response"
                    .to_string(),
            )?;
        }

        if self.message_id_format.trim().is_empty() {
            self.handler
                .error("The AS2 message ID format is missing".to_string())?;
        }

        match &self.business_document {
            None => self
                .handler
                .error("The XML business document to be sent is missing".to_string())?,
            Some(document) => {
                if !document.is_readable() {
                    self.handler.error(format!(
                        "The XML business document to be sent {} does not exist",
                        document.location()
                    ))?;
                }
            }
        }

        match &self.sender_participant {
            None => self
                .handler
                .error("The Peppol sender participant ID is missing".to_string())?,
            Some(id) if !id.has_default_scheme() => self.handler.warn(format!(
                "The Peppol sender participant ID '{}' is using a non-standard scheme",
                id.as_uri()
            )),
            _ => {}
        }
        match &self.receiver_participant {
            None => self
                .handler
                .error("The Peppol receiver participant ID is missing".to_string())?,
            Some(id) if !id.has_default_scheme() => self.handler.warn(format!(
                "The Peppol receiver participant ID '{}' is using a non-standard scheme",
                id.as_uri()
            )),
            _ => {}
        }
        match &self.document_type {
            None => self
                .handler
                .error("The Peppol document type ID is missing".to_string())?,
            Some(id) if !id.has_default_scheme() => self.handler.warn(format!(
                "The Peppol document type ID '{}' is using a non-standard scheme",
                id.as_uri()
            )),
            _ => {}
        }
        match &self.process {
            None => self
                .handler
                .error("The Peppol process ID is missing".to_string())?,
            Some(id) if !id.has_default_scheme() => self.handler.warn(format!(
                "The Peppol process ID '{}' is using a non-standard scheme",
                id.as_uri()
            )),
            _ => {}
        }
        Ok(())
    }

    /// Runs the full send pipeline and returns the transport response.
    ///
    /// Resolution and verification problems are routed through the message
    /// handler and become fatal per its policy (or, with a deferred policy,
    /// through one aggregated error after the scan). Document, serialization
    /// and transport problems are always fatal.
    pub async fn send(&mut self) -> As2Result<As2ClientResponse> {
        self.resolve_receiver().await?;
        self.apply_derived_defaults();
        self.verify_content()?;

        // A deferred handler records errors without aborting the scan; they
        // must still block the dispatch.
        if self.handler.error_count() > 0 {
            let messages: Vec<&str> = self
                .handler
                .issues()
                .iter()
                .filter(|issue| issue.severity == Severity::Error)
                .map(|issue| issue.message.as_str())
                .collect();
            return Err(As2ClientError::Configuration(format!(
                "{} error(s) found: {}",
                messages.len(),
                messages.join("; ")
            )));
        }

        let document = required(&self.business_document, "XML business document")?;
        let payload = document.read().await?;
        let root = inspect_xml_root(&payload).map_err(|reason| As2ClientError::DocumentRead {
            source_name: document.location(),
            reason,
        })?;

        let envelope = Envelope::wrap(
            required(&self.sender_participant, "Peppol sender participant ID")?,
            required(&self.receiver_participant, "Peppol receiver participant ID")?,
            required(&self.document_type, "Peppol document type ID")?,
            required(&self.process, "Peppol process ID")?,
            &root,
            payload,
        );
        let data = envelope.to_xml()?;

        let sender_as2_id = required(&self.sender_as2_id, "AS2 sender ID")?;
        let receiver_as2_id = required(&self.receiver_as2_id, "AS2 receiver ID")?;
        let settings = As2ClientSettings {
            key_store: KeyStore {
                path: required(&self.key_store_path, "AS2 key store")?,
                password: required(&self.key_store_password, "key store password")?,
            },
            sender: SenderData {
                as2_id: sender_as2_id.clone(),
                email: required(&self.sender_email, "AS2 sender email address")?,
                key_alias: required(&self.sender_key_alias, "AS2 sender key alias")?,
            },
            receiver: ReceiverData {
                as2_id: receiver_as2_id.clone(),
                key_alias: required(&self.receiver_key_alias, "AS2 receiver key alias")?,
                url: required(&self.receiver_url, "AS2 receiver URL")?,
            },
            receiver_certificate: required(&self.receiver_certificate, "receiver certificate")?,
            partnership_name: format!("{sender_as2_id}-{receiver_as2_id}"),
            mdn_options: DispositionOptions::signed_receipt(self.signing_algorithm),
            signing_algorithm: self.signing_algorithm,
            message_id_format: self.message_id_format.clone(),
        };
        let request = As2ClientRequest {
            subject: self.subject.clone(),
            data,
        };

        let transport = self.transport.as_ref().ok_or_else(|| {
            As2ClientError::Configuration("no AS2 transport is configured".to_string())
        })?;
        info!(
            "Sending AS2 message for partnership '{}' to {}",
            settings.partnership_name, settings.receiver.url
        );
        transport.send(&settings, request).await
    }
}

/// Whether an optional string holds non-whitespace text.
fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.trim().is_empty())
}

/// Minimal syntactic email plausibility check; good enough for a
/// warning-level convention check.
fn is_plausible_email(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !address.chars().any(char::is_whitespace)
}

fn required<T: Clone>(field: &Option<T>, name: &str) -> As2Result<T> {
    field
        .clone()
        .ok_or_else(|| As2ClientError::Configuration(format!("the {name} is missing")))
}
