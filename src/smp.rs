//! SMP (Service Metadata Publisher) endpoint lookup.
//!
//! An SMP maps a receiver participant + document type + process to a
//! transport endpoint (URL and access point certificate). Resolution is
//! opt-in: the builder only queries when a lookup handle was configured.

use crate::error::{As2ClientError, As2Result};
use crate::identifier::{DocumentTypeId, ParticipantId, ProcessId};
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Transport profile identifier for Peppol AS2.
pub const TRANSPORT_PROFILE_AS2: &str = "busdox-transport-as2-ver1p0";

/// A resolved transport endpoint.
///
/// Ephemeral lookup result; merged into the builder fields and discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmpEndpoint {
    /// The AS2 endpoint URL of the receiver's access point.
    pub url: String,
    /// Base64-encoded DER certificate of the receiver's access point.
    pub certificate: String,
}

/// Endpoint lookup against a service metadata directory.
#[async_trait]
pub trait SmpLookup: Send + Sync {
    /// Looks up the endpoint registered for the given receiver, document type
    /// and process under a transport profile. Returns `Ok(None)` when no
    /// matching registration exists.
    async fn endpoint(
        &self,
        receiver: &ParticipantId,
        document_type: &DocumentTypeId,
        process: &ProcessId,
        transport_profile: &str,
    ) -> As2Result<Option<SmpEndpoint>>;
}

#[async_trait]
impl<T: SmpLookup + ?Sized> SmpLookup for std::sync::Arc<T> {
    async fn endpoint(
        &self,
        receiver: &ParticipantId,
        document_type: &DocumentTypeId,
        process: &ProcessId,
        transport_profile: &str,
    ) -> As2Result<Option<SmpEndpoint>> {
        (**self)
            .endpoint(receiver, document_type, process, transport_profile)
            .await
    }
}

/// Read-only HTTP client for an SMP server.
pub struct SmpClient {
    base_url: String,
    client: Client,
}

impl SmpClient {
    /// Creates a client for the SMP at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("failed to create HTTP client");
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn service_url(&self, receiver: &ParticipantId, document_type: &DocumentTypeId) -> String {
        format!(
            "{}/{}/services/{}",
            self.base_url,
            urlencoding::encode(&receiver.as_uri()),
            urlencoding::encode(&document_type.as_uri())
        )
    }
}

#[async_trait]
impl SmpLookup for SmpClient {
    async fn endpoint(
        &self,
        receiver: &ParticipantId,
        document_type: &DocumentTypeId,
        process: &ProcessId,
        transport_profile: &str,
    ) -> As2Result<Option<SmpEndpoint>> {
        let url = self.service_url(receiver, document_type);
        debug!("Querying SMP service metadata at {url}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| As2ClientError::SmpLookup(format!("SMP request failed: {e}")))?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(As2ClientError::SmpLookup(format!(
                "SMP returned HTTP {} for {url}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| As2ClientError::SmpLookup(format!("failed to read SMP response: {e}")))?;

        let endpoint = select_endpoint(&body, process, transport_profile)
            .map_err(|e| As2ClientError::SmpLookup(format!("invalid SMP metadata: {e}")))?;
        Ok(endpoint)
    }
}

#[derive(Debug, Default)]
struct ParsedEndpoint {
    transport_profile: String,
    address: Option<String>,
    certificate: Option<String>,
}

#[derive(Debug, Default)]
struct ParsedProcess {
    scheme: Option<String>,
    value: Option<String>,
    endpoints: Vec<ParsedEndpoint>,
}

/// Parses SignedServiceMetadata XML and selects the endpoint matching the
/// process identifier and transport profile. Element namespaces vary between
/// SMP implementations, so matching is on local names.
fn select_endpoint(
    metadata: &str,
    process: &ProcessId,
    transport_profile: &str,
) -> Result<Option<SmpEndpoint>, String> {
    let mut reader = Reader::from_str(metadata);
    reader.config_mut().trim_text(true);

    let mut processes: Vec<ParsedProcess> = Vec::new();
    let mut stack: Vec<String> = Vec::new();

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned();
                match name.as_str() {
                    "Process" => processes.push(ParsedProcess::default()),
                    "ProcessIdentifier" => {
                        if let Some(current) = processes.last_mut() {
                            for attr in e.attributes() {
                                let attr = attr.map_err(|e| e.to_string())?;
                                if attr.key.local_name().as_ref() == b"scheme" {
                                    current.scheme = Some(
                                        attr.unescape_value()
                                            .map_err(|e| e.to_string())?
                                            .into_owned(),
                                    );
                                }
                            }
                        }
                    }
                    "Endpoint" => {
                        if let Some(current) = processes.last_mut() {
                            let mut endpoint = ParsedEndpoint::default();
                            for attr in e.attributes() {
                                let attr = attr.map_err(|e| e.to_string())?;
                                if attr.key.local_name().as_ref() == b"transportProfile" {
                                    endpoint.transport_profile = attr
                                        .unescape_value()
                                        .map_err(|e| e.to_string())?
                                        .into_owned();
                                }
                            }
                            current.endpoints.push(endpoint);
                        }
                    }
                    _ => {}
                }
                stack.push(name);
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(|e| e.to_string())?.into_owned();
                let element = stack.last().map(String::as_str);
                if let Some(current) = processes.last_mut() {
                    match element {
                        Some("ProcessIdentifier") => current.value = Some(text),
                        Some("Address") => {
                            if let Some(endpoint) = current.endpoints.last_mut() {
                                endpoint.address = Some(text);
                            }
                        }
                        Some("Certificate") => {
                            if let Some(endpoint) = current.endpoints.last_mut() {
                                endpoint.certificate = Some(text);
                            }
                        }
                        _ => {}
                    }
                }
            }
            Event::End(_) => {
                stack.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    for parsed in processes {
        let scheme_matches = parsed.scheme.as_deref() == Some(process.scheme());
        let value_matches = parsed.value.as_deref() == Some(process.value());
        if !(scheme_matches && value_matches) {
            continue;
        }
        for endpoint in parsed.endpoints {
            if endpoint.transport_profile != transport_profile {
                continue;
            }
            let address = endpoint
                .address
                .ok_or_else(|| "endpoint without Address".to_string())?;
            let certificate = endpoint
                .certificate
                .ok_or_else(|| "endpoint without Certificate".to_string())?;
            return Ok(Some(SmpEndpoint {
                url: address,
                certificate,
            }));
        }
    }
    Ok(None)
}

/// Scripted lookup doubles for tests.
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// What a [`MockSmp`] answers with.
    #[derive(Debug, Clone)]
    pub enum MockSmpOutcome {
        /// Lookup succeeds with this endpoint.
        Found(SmpEndpoint),
        /// Lookup succeeds but nothing is registered.
        NotFound,
        /// Lookup fails with an SMP error.
        Failure(String),
    }

    /// An [`SmpLookup`] returning a scripted outcome and counting calls.
    pub struct MockSmp {
        outcome: MockSmpOutcome,
        calls: AtomicUsize,
        queries: Mutex<Vec<(ParticipantId, DocumentTypeId, ProcessId, String)>>,
    }

    impl MockSmp {
        /// Creates a mock with the given outcome.
        pub fn new(outcome: MockSmpOutcome) -> Self {
            Self {
                outcome,
                calls: AtomicUsize::new(0),
                queries: Mutex::new(Vec::new()),
            }
        }

        /// Number of lookups performed.
        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// The queries issued so far.
        pub fn queries(&self) -> Vec<(ParticipantId, DocumentTypeId, ProcessId, String)> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SmpLookup for MockSmp {
        async fn endpoint(
            &self,
            receiver: &ParticipantId,
            document_type: &DocumentTypeId,
            process: &ProcessId,
            transport_profile: &str,
        ) -> As2Result<Option<SmpEndpoint>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push((
                receiver.clone(),
                document_type.clone(),
                process.clone(),
                transport_profile.to_string(),
            ));
            match &self.outcome {
                MockSmpOutcome::Found(endpoint) => Ok(Some(endpoint.clone())),
                MockSmpOutcome::NotFound => Ok(None),
                MockSmpOutcome::Failure(reason) => {
                    Err(As2ClientError::SmpLookup(reason.clone()))
                }
            }
        }
    }
}
