//! Receiver certificate handling.
//!
//! The SMP returns the receiver's access point certificate as base64-encoded
//! DER. The AS2 receiver ID is by convention the common name of that
//! certificate's subject.

use crate::error::{As2ClientError, As2Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use x509_parser::prelude::{FromDer, X509Certificate};

/// An X.509 certificate held as DER bytes.
///
/// The bytes are validated to parse as a certificate on construction; no
/// trust or chain validation is performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
}

impl Certificate {
    /// Wraps DER bytes, verifying they parse as an X.509 certificate.
    pub fn from_der(der: Vec<u8>) -> As2Result<Self> {
        X509Certificate::from_der(&der)
            .map_err(|e| As2ClientError::Certificate(format!("invalid DER certificate: {e}")))?;
        Ok(Self { der })
    }

    /// Decodes base64 certificate material as returned inside SMP metadata.
    ///
    /// PEM armor lines and embedded whitespace are tolerated.
    pub fn from_base64(encoded: &str) -> As2Result<Self> {
        let cleaned: String = encoded
            .lines()
            .filter(|line| !line.trim_start().starts_with("-----"))
            .flat_map(|line| line.chars())
            .filter(|c| !c.is_whitespace())
            .collect();
        let der = BASE64
            .decode(cleaned.as_bytes())
            .map_err(|e| As2ClientError::Certificate(format!("invalid base64: {e}")))?;
        Self::from_der(der)
    }

    /// The raw DER bytes.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Extracts the common name (CN) of the certificate subject.
    pub fn subject_common_name(&self) -> As2Result<String> {
        let (_, cert) = X509Certificate::from_der(&self.der)
            .map_err(|e| As2ClientError::Certificate(format!("invalid DER certificate: {e}")))?;
        let cn = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|attr| attr.as_str().ok())
            .ok_or_else(|| {
                As2ClientError::Certificate(
                    "certificate subject carries no common name".to_string(),
                )
            })?;
        Ok(cn.to_string())
    }
}
