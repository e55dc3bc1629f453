//! Client-side AS2 send orchestration for Peppol.
//!
//! Prepares and dispatches a business document to a Peppol participant:
//! resolves the receiver endpoint through an SMP lookup, verifies the full
//! configuration, wraps the document into an SBDH envelope and hands the
//! serialized bytes to an AS2 transport.
//!
//! # Architecture
//!
//! - **Builder**: holds one send's configuration behind fluent setters and
//!   runs the pipeline: resolve → default → verify → wrap → dispatch
//! - **Handler**: collects verification warnings and errors; the policy
//!   decides whether an error aborts immediately or the full scan completes
//! - **Smp**: endpoint lookup (trait plus a read-only HTTP client)
//! - **Sbdh**: the Standard Business Document envelope
//! - **As2**: settings, request and response types for the transport trait
//!
//! The AS2 wire protocol itself (S/MIME signing, MDN handling) and SMP
//! response signature validation are out of scope; both sit behind traits.
//!
//! # Example
//!
//! ```no_run
//! use peppol_as2_client::{
//!     As2ClientBuilder, DocumentTypeId, ParticipantId, ProcessId, SmpClient,
//! };
//!
//! # async fn example(transport: Box<dyn peppol_as2_client::As2Transport>) {
//! let mut builder = As2ClientBuilder::new()
//!     .set_pkcs12_key_store("client-certs.p12", "peppol")
//!     .set_sender_as2_id("APP_0001")
//!     .set_sender_email("as2@example.com")
//!     .set_sender_key_alias("APP_0001")
//!     .set_sender_participant(ParticipantId::with_default_scheme("9915:sender"))
//!     .set_receiver_participant(ParticipantId::with_default_scheme("9915:receiver"))
//!     .set_document_type(DocumentTypeId::with_default_scheme("urn:oasis:names:ubl::Invoice"))
//!     .set_process(ProcessId::with_default_scheme("urn:www.cenbii.eu:profile:bii04:ver1.0"))
//!     .set_business_document_file("invoice.xml")
//!     .set_smp_lookup(Box::new(SmpClient::new("http://smp.example.com")))
//!     .set_transport(transport);
//! let response = builder.send().await.unwrap();
//! # }
//! ```

pub mod as2;
pub mod builder;
pub mod document;
mod error;
pub mod handler;
pub mod identifier;
pub mod pki;
pub mod sbdh;
pub mod smp;

pub use as2::{
    As2ClientRequest, As2ClientResponse, As2ClientSettings, As2Transport, DispositionOptions,
    KeyStore, ReceiverData, SenderData, SigningAlgorithm,
};
pub use builder::{
    AP_ID_PREFIX, As2ClientBuilder, DEFAULT_MESSAGE_ID_FORMAT, DEFAULT_SIGNING_ALGORITHM,
    DEFAULT_SUBJECT,
};
pub use document::{DocumentSource, XmlRootInfo};
pub use error::{As2ClientError, As2Result};
pub use handler::{CollectingHandler, FailFastHandler, Issue, MessageHandler, Severity};
pub use identifier::{
    DEFAULT_DOCUMENT_TYPE_SCHEME, DEFAULT_PARTICIPANT_SCHEME, DEFAULT_PROCESS_SCHEME,
    DocumentTypeId, ParticipantId, ProcessId,
};
pub use pki::Certificate;
pub use sbdh::{Envelope, EnvelopeHeader};
pub use smp::{SmpClient, SmpEndpoint, SmpLookup, TRANSPORT_PROFILE_AS2};
