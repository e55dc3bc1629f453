//! AS2 transport surface.
//!
//! The actual AS2 protocol (S/MIME signing, MDN parsing, HTTP framing) lives
//! behind the [`As2Transport`] trait; this module defines the settings,
//! request and response types the pipeline assembles for it.

use crate::error::As2Result;
use crate::pki::Certificate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// MDN importance qualifier.
pub const IMPORTANCE_REQUIRED: &str = "required";

/// MDN receipt protocol for signed receipts.
pub const PROTOCOL_PKCS7_SIGNATURE: &str = "pkcs7-signature";

/// Signing algorithm for AS2 messages and receipt MICs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningAlgorithm {
    /// SHA-1 (the Peppol AS2 profile default).
    Sha1,
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl SigningAlgorithm {
    /// The MIC algorithm token used in disposition options.
    pub fn mic_alg(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mic_alg())
    }
}

/// MDN disposition notification options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispositionOptions {
    /// Receipt protocol (`pkcs7-signature`).
    pub protocol: String,
    /// Importance of the receipt protocol.
    pub protocol_importance: String,
    /// MIC algorithm token.
    pub mic_alg: String,
    /// Importance of the MIC algorithm.
    pub mic_alg_importance: String,
}

impl DispositionOptions {
    /// Options requiring a signed receipt with the given MIC algorithm.
    pub fn signed_receipt(algorithm: SigningAlgorithm) -> Self {
        Self {
            protocol: PROTOCOL_PKCS7_SIGNATURE.to_string(),
            protocol_importance: IMPORTANCE_REQUIRED.to_string(),
            mic_alg: algorithm.mic_alg().to_string(),
            mic_alg_importance: IMPORTANCE_REQUIRED.to_string(),
        }
    }

    /// The `Disposition-Notification-Options` header value.
    pub fn header_value(&self) -> String {
        format!(
            "signed-receipt-protocol={}, {}; signed-receipt-micalg={}, {}",
            self.protocol_importance, self.protocol, self.mic_alg_importance, self.mic_alg
        )
    }
}

/// Key store reference (PKCS#12 file plus password).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStore {
    /// Path to the key store file.
    pub path: PathBuf,
    /// Key store password; may be empty but must be present.
    pub password: String,
}

/// Sender identity for the AS2 exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderData {
    /// AS2-From identifier.
    pub as2_id: String,
    /// Sender email address.
    pub email: String,
    /// Key alias of the sender's key in the key store.
    pub key_alias: String,
}

/// Receiver identity for the AS2 exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverData {
    /// AS2-To identifier.
    pub as2_id: String,
    /// Key alias under which the receiver certificate is stored.
    pub key_alias: String,
    /// AS2 endpoint URL of the receiver.
    pub url: String,
}

/// Settings for one AS2 send.
///
/// The Peppol AS2 profile is sign-only; these settings cannot express
/// message encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct As2ClientSettings {
    /// Key store holding the sender key and partner certificates.
    pub key_store: KeyStore,
    /// Sender identity.
    pub sender: SenderData,
    /// Receiver identity.
    pub receiver: ReceiverData,
    /// Receiver access point certificate.
    pub receiver_certificate: Certificate,
    /// Partnership label, `{sender}-{receiver}`.
    pub partnership_name: String,
    /// MDN options; a signed receipt is always required.
    pub mdn_options: DispositionOptions,
    /// Algorithm used to sign the message.
    pub signing_algorithm: SigningAlgorithm,
    /// Message-ID format template.
    pub message_id_format: String,
}

/// One AS2 request: subject line plus the serialized envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct As2ClientRequest {
    /// Message subject.
    pub subject: String,
    /// Serialized SBDH envelope bytes.
    pub data: Vec<u8>,
}

/// Response from the AS2 transport, including any MDN receipt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct As2ClientResponse {
    /// Message ID of the dispatched message.
    pub message_id: Option<String>,
    /// Raw MDN text, if a receipt was returned.
    pub mdn_text: Option<String>,
    /// MDN disposition line, if a receipt was returned.
    pub mdn_disposition: Option<String>,
    /// Error description reported by the transport.
    pub error: Option<String>,
}

impl As2ClientResponse {
    /// A successful response for the given message ID.
    pub fn success(message_id: impl Into<String>) -> Self {
        Self {
            message_id: Some(message_id.into()),
            ..Self::default()
        }
    }

    /// Whether the transport reported an error.
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

/// The external AS2 send operation.
#[async_trait]
pub trait As2Transport: Send + Sync {
    /// Sends one request using the given settings and returns the transport
    /// response unchanged.
    async fn send(
        &self,
        settings: &As2ClientSettings,
        request: As2ClientRequest,
    ) -> As2Result<As2ClientResponse>;
}

#[async_trait]
impl<T: As2Transport + ?Sized> As2Transport for std::sync::Arc<T> {
    async fn send(
        &self,
        settings: &As2ClientSettings,
        request: As2ClientRequest,
    ) -> As2Result<As2ClientResponse> {
        (**self).send(settings, request).await
    }
}

/// Scripted transport doubles for tests.
pub mod mock {
    use super::*;
    use crate::error::As2ClientError;
    use std::sync::Mutex;

    /// An [`As2Transport`] that records every dispatch and answers with a
    /// canned response.
    pub struct MockTransport {
        response: Result<As2ClientResponse, String>,
        sent: Mutex<Vec<(As2ClientSettings, As2ClientRequest)>>,
    }

    impl MockTransport {
        /// A mock answering every send with `response`.
        pub fn succeeding(response: As2ClientResponse) -> Self {
            Self {
                response: Ok(response),
                sent: Mutex::new(Vec::new()),
            }
        }

        /// A mock failing every send with a transport error.
        pub fn failing(reason: impl Into<String>) -> Self {
            Self {
                response: Err(reason.into()),
                sent: Mutex::new(Vec::new()),
            }
        }

        /// Number of sends performed.
        pub fn call_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }

        /// The recorded `(settings, request)` pairs.
        pub fn sent(&self) -> Vec<(As2ClientSettings, As2ClientRequest)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl As2Transport for MockTransport {
        async fn send(
            &self,
            settings: &As2ClientSettings,
            request: As2ClientRequest,
        ) -> As2Result<As2ClientResponse> {
            self.sent.lock().unwrap().push((settings.clone(), request));
            match &self.response {
                Ok(response) => Ok(response.clone()),
                Err(reason) => Err(As2ClientError::Transport(reason.clone())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_header_requires_signed_receipt() {
        let options = DispositionOptions::signed_receipt(SigningAlgorithm::Sha1);
        assert_eq!(
            options.header_value(),
            "signed-receipt-protocol=required, pkcs7-signature; signed-receipt-micalg=required, sha1"
        );
    }

    #[test]
    fn mic_alg_tokens() {
        assert_eq!(SigningAlgorithm::Sha1.mic_alg(), "sha1");
        assert_eq!(SigningAlgorithm::Sha256.mic_alg(), "sha256");
        assert_eq!(SigningAlgorithm::Sha512.to_string(), "sha512");
    }

    #[test]
    fn response_success_has_no_error() {
        let response = As2ClientResponse::success("msg-1");
        assert!(!response.has_error());
        assert_eq!(response.message_id.as_deref(), Some("msg-1"));
    }

    #[tokio::test]
    async fn mock_transport_records_requests() {
        use mock::MockTransport;
        let transport = MockTransport::succeeding(As2ClientResponse::success("m"));
        let settings = As2ClientSettings {
            key_store: KeyStore {
                path: "/tmp/ks.p12".into(),
                password: "pw".into(),
            },
            sender: SenderData {
                as2_id: "APP_0001".into(),
                email: "a@example.com".into(),
                key_alias: "APP_0001".into(),
            },
            receiver: ReceiverData {
                as2_id: "APP_0002".into(),
                key_alias: "APP_0002".into(),
                url: "https://ap.example.com".into(),
            },
            receiver_certificate: test_certificate(),
            partnership_name: "APP_0001-APP_0002".into(),
            mdn_options: DispositionOptions::signed_receipt(SigningAlgorithm::Sha1),
            signing_algorithm: SigningAlgorithm::Sha1,
            message_id_format: "fmt".into(),
        };
        let request = As2ClientRequest {
            subject: "s".into(),
            data: b"payload".to_vec(),
        };
        let response = transport.send(&settings, request).await.unwrap();
        assert_eq!(response.message_id.as_deref(), Some("m"));
        assert_eq!(transport.call_count(), 1);
        assert_eq!(transport.sent()[0].1.subject, "s");
    }

    fn test_certificate() -> Certificate {
        let mut params = rcgen::CertificateParams::default();
        params.distinguished_name = rcgen::DistinguishedName::new();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, "APP_0002");
        let key = rcgen::KeyPair::generate().unwrap();
        Certificate::from_der(params.self_signed(&key).unwrap().der().to_vec()).unwrap()
    }
}
