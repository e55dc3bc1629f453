//! End-to-end tests for the send pipeline: verification, defaulting,
//! envelope round trip and dispatch.

use peppol_as2_client::as2::mock::MockTransport;
use peppol_as2_client::{
    As2ClientBuilder, As2ClientError, As2ClientResponse, Certificate, CollectingHandler,
    DEFAULT_SUBJECT, DocumentTypeId, Envelope, ParticipantId, ProcessId, Severity,
};
use std::sync::Arc;
use tempfile::NamedTempFile;

const INVOICE: &[u8] =
    br#"<?xml version="1.0" encoding="UTF-8"?><Invoice xmlns="urn:test:invoice"><ID>INV-1</ID></Invoice>"#;

fn test_certificate(common_name: &str) -> Certificate {
    let mut params = rcgen::CertificateParams::default();
    params.distinguished_name = rcgen::DistinguishedName::new();
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, common_name);
    let key = rcgen::KeyPair::generate().unwrap();
    Certificate::from_der(params.self_signed(&key).unwrap().der().to_vec()).unwrap()
}

/// A builder with every required field valid. `key_store` must outlive the
/// send so the file existence check passes.
fn valid_builder(key_store: &NamedTempFile) -> As2ClientBuilder {
    As2ClientBuilder::new()
        .set_pkcs12_key_store(key_store.path(), "password")
        .set_sender_as2_id("APP_0001")
        .set_sender_email("as2@example.com")
        .set_sender_key_alias("APP_0001")
        .set_receiver_as2_id("APP_0002")
        .set_receiver_key_alias("APP_0002")
        .set_receiver_url("https://ap.example.com/as2")
        .set_receiver_certificate(test_certificate("APP_0002"))
        .set_business_document_bytes(INVOICE.to_vec())
        .set_sender_participant(ParticipantId::with_default_scheme("0088:sender"))
        .set_receiver_participant(ParticipantId::with_default_scheme("0088:receiver"))
        .set_document_type(DocumentTypeId::with_default_scheme("urn:test:invoice::Invoice"))
        .set_process(ProcessId::with_default_scheme("urn:www.cenbii.eu:profile:bii04:ver1.0"))
}

// ── Verification ─────────────────────────────────────────────────

#[test]
fn valid_configuration_produces_no_issues() {
    let key_store = NamedTempFile::new().unwrap();
    let mut builder = valid_builder(&key_store).set_message_handler(Box::new(CollectingHandler::new()));

    builder.verify_content().unwrap();

    assert_eq!(builder.message_handler().error_count(), 0);
    assert_eq!(builder.message_handler().warning_count(), 0);
}

#[test]
fn full_scan_reports_every_missing_field() {
    // Nothing set except the defaults (subject, message-ID format, signing
    // algorithm); the collecting handler lets the scan run to the end.
    let mut builder =
        As2ClientBuilder::new().set_message_handler(Box::new(CollectingHandler::new()));

    builder.verify_content().unwrap();

    let handler = builder.message_handler();
    assert_eq!(handler.error_count(), 14);
    assert_eq!(handler.warning_count(), 0);
    for expected in [
        "key store is defined",
        "key store password",
        "sender ID is missing",
        "sender email address is missing",
        "sender key alias is missing",
        "receiver ID is missing",
        "receiver key alias is missing",
        "receiver URL",
        "X.509 certificate is missing",
        "business document to be sent is missing",
        "sender participant ID is missing",
        "receiver participant ID is missing",
        "document type ID is missing",
        "process ID is missing",
    ] {
        assert!(
            handler
                .issues()
                .iter()
                .any(|issue| issue.message.contains(expected)),
            "no issue mentions {expected:?}"
        );
    }
}

#[test]
fn fail_fast_policy_stops_at_first_error_in_scan_order() {
    // Default handler: only the key store error (first in scan order) is
    // observed even though more fields are missing.
    let mut builder = As2ClientBuilder::new();

    let err = builder.verify_content().unwrap_err();

    assert!(err.to_string().contains("key store"));
    assert_eq!(builder.message_handler().error_count(), 1);
}

#[test]
fn missing_key_store_path_is_distinct_from_nonexistent_file() {
    let mut builder = As2ClientBuilder::new().set_pkcs12_key_store("/no/such/keystore.p12", "pw");
    let err = builder.verify_content().unwrap_err();
    assert!(err.to_string().contains("does not exist"));

    let dir = tempfile::tempdir().unwrap();
    let mut builder = As2ClientBuilder::new().set_pkcs12_key_store(dir.path(), "pw");
    let err = builder.verify_content().unwrap_err();
    assert!(err.to_string().contains("not a file"));
}

#[test]
fn app_prefixed_ids_produce_no_warnings() {
    let key_store = NamedTempFile::new().unwrap();
    let mut builder = valid_builder(&key_store).set_message_handler(Box::new(CollectingHandler::new()));

    builder.verify_content().unwrap();

    assert_eq!(builder.message_handler().error_count(), 0);
    assert_eq!(builder.message_handler().warning_count(), 0);
}

#[test]
fn bad_sender_id_prefix_warns_but_does_not_block() {
    let key_store = NamedTempFile::new().unwrap();
    let mut builder = valid_builder(&key_store)
        .set_sender_as2_id("BADPREFIX")
        .set_message_handler(Box::new(CollectingHandler::new()));

    builder.verify_content().unwrap();

    let handler = builder.message_handler();
    assert_eq!(handler.error_count(), 0);
    let prefix_warnings: Vec<_> = handler
        .issues()
        .iter()
        .filter(|issue| {
            issue.severity == Severity::Warning
                && issue.message.contains("sender ID 'BADPREFIX'")
                && issue.message.contains("should start with 'APP_'")
        })
        .collect();
    assert_eq!(prefix_warnings.len(), 1);
    // The key alias still carries the APP_ prefix, so the dependent
    // alias-vs-ID check fires as well.
    assert_eq!(handler.warning_count(), 2);
    assert!(
        handler
            .issues()
            .iter()
            .any(|issue| issue.message.contains("should match the AS2 sender ID"))
    );
}

#[test]
fn alias_mismatch_check_is_skipped_when_alias_prefix_fails() {
    let key_store = NamedTempFile::new().unwrap();
    let mut builder = valid_builder(&key_store)
        .set_receiver_key_alias("wrong-alias")
        .set_message_handler(Box::new(CollectingHandler::new()));

    builder.verify_content().unwrap();

    let handler = builder.message_handler();
    assert_eq!(handler.error_count(), 0);
    assert_eq!(handler.warning_count(), 1);
    assert!(handler.issues()[0].message.contains("receiver key alias 'wrong-alias'"));
    assert!(
        !handler
            .issues()
            .iter()
            .any(|issue| issue.message.contains("should match the AS2 receiver ID"))
    );
}

#[test]
fn convention_warnings_cover_email_url_and_schemes() {
    let key_store = NamedTempFile::new().unwrap();
    let mut builder = valid_builder(&key_store)
        .set_sender_email("not-an-address")
        .set_receiver_url("::not a url::")
        .set_sender_participant(ParticipantId::new("private-scheme", "0088:sender"))
        .set_message_handler(Box::new(CollectingHandler::new()));

    builder.verify_content().unwrap();

    let handler = builder.message_handler();
    assert_eq!(handler.error_count(), 0);
    assert_eq!(handler.warning_count(), 3);
    assert!(handler.issues().iter().any(|i| i.message.contains("invalid email address")));
    assert!(handler.issues().iter().any(|i| i.message.contains("invalid URL")));
    assert!(handler.issues().iter().any(|i| i.message.contains("non-standard scheme")));
}

// ── Defaulting ───────────────────────────────────────────────────

#[test]
fn receiver_key_alias_defaults_to_receiver_id() {
    let mut builder = As2ClientBuilder::new().set_receiver_as2_id("APP_0002");
    builder.apply_derived_defaults();
    assert_eq!(builder.receiver_key_alias(), Some("APP_0002"));
}

#[test]
fn explicit_receiver_key_alias_is_not_overwritten() {
    let mut builder = As2ClientBuilder::new()
        .set_receiver_as2_id("APP_0002")
        .set_receiver_key_alias("APP_OTHER");
    builder.apply_derived_defaults();
    assert_eq!(builder.receiver_key_alias(), Some("APP_OTHER"));
}

#[test]
fn receiver_key_alias_stays_unset_without_receiver_id() {
    let mut builder = As2ClientBuilder::new();
    builder.apply_derived_defaults();
    assert_eq!(builder.receiver_key_alias(), None);
}

// ── Dispatch ─────────────────────────────────────────────────────

#[tokio::test]
async fn send_dispatches_once_and_envelope_round_trips() {
    let key_store = NamedTempFile::new().unwrap();
    let transport = Arc::new(MockTransport::succeeding(As2ClientResponse::success("msg-1")));
    let mut builder = valid_builder(&key_store).set_transport(Box::new(transport.clone()));

    let response = builder.send().await.unwrap();

    assert_eq!(response.message_id.as_deref(), Some("msg-1"));
    assert!(!response.has_error());
    assert_eq!(transport.call_count(), 1);

    let (settings, request) = &transport.sent()[0];
    assert_eq!(settings.partnership_name, "APP_0001-APP_0002");
    assert_eq!(settings.sender.as2_id, "APP_0001");
    assert_eq!(settings.receiver.as2_id, "APP_0002");
    assert_eq!(settings.receiver.url, "https://ap.example.com/as2");
    assert_eq!(
        settings.mdn_options.header_value(),
        "signed-receipt-protocol=required, pkcs7-signature; signed-receipt-micalg=required, sha1"
    );
    assert_eq!(request.subject, DEFAULT_SUBJECT);

    // The dispatched bytes deserialize back into an envelope carrying the
    // original document and the configured routing identifiers unchanged.
    let envelope = Envelope::from_xml(&request.data).unwrap();
    assert_eq!(
        envelope.header.sender,
        ParticipantId::with_default_scheme("0088:sender")
    );
    assert_eq!(
        envelope.header.receiver,
        ParticipantId::with_default_scheme("0088:receiver")
    );
    assert_eq!(
        envelope.header.document_type,
        DocumentTypeId::with_default_scheme("urn:test:invoice::Invoice")
    );
    assert_eq!(
        envelope.header.process,
        ProcessId::with_default_scheme("urn:www.cenbii.eu:profile:bii04:ver1.0")
    );
    assert_eq!(envelope.header.standard, "urn:test:invoice");
    assert_eq!(envelope.header.type_name, "Invoice");
    let payload = std::str::from_utf8(envelope.payload()).unwrap();
    assert!(payload.contains("<ID>INV-1</ID>"));
}

#[tokio::test]
async fn missing_key_store_fails_fatally_and_never_dispatches() {
    let transport = Arc::new(MockTransport::succeeding(As2ClientResponse::success("m")));
    let mut builder = As2ClientBuilder::new()
        .set_sender_as2_id("APP_0001")
        .set_sender_email("as2@example.com")
        .set_sender_key_alias("APP_0001")
        .set_receiver_as2_id("APP_0002")
        .set_receiver_url("https://ap.example.com/as2")
        .set_receiver_certificate(test_certificate("APP_0002"))
        .set_business_document_bytes(INVOICE.to_vec())
        .set_sender_participant(ParticipantId::with_default_scheme("0088:sender"))
        .set_receiver_participant(ParticipantId::with_default_scheme("0088:receiver"))
        .set_document_type(DocumentTypeId::with_default_scheme("urn:test:invoice::Invoice"))
        .set_process(ProcessId::with_default_scheme("urn:www.cenbii.eu:profile:bii04:ver1.0"))
        .set_transport(Box::new(transport.clone()));

    let err = builder.send().await.unwrap_err();

    assert!(matches!(err, As2ClientError::Configuration(_)));
    assert!(err.to_string().contains("key store"));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn collecting_handler_aggregates_all_errors_before_dispatch() {
    // Key store and sender ID both missing; with the collecting handler the
    // send fails with one aggregated error naming both.
    let key_store = NamedTempFile::new().unwrap();
    let transport = Arc::new(MockTransport::succeeding(As2ClientResponse::success("m")));
    let mut builder = valid_builder(&key_store)
        .set_pkcs12_key_store("/no/such/keystore.p12", "pw")
        .set_sender_email("   ")
        .set_message_handler(Box::new(CollectingHandler::new()))
        .set_transport(Box::new(transport.clone()));

    let err = builder.send().await.unwrap_err();

    let message = err.to_string();
    assert!(message.contains("2 error(s) found"), "got: {message}");
    assert!(message.contains("does not exist"));
    assert!(message.contains("sender email address is missing"));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn warnings_alone_never_block_dispatch() {
    let key_store = NamedTempFile::new().unwrap();
    let transport = Arc::new(MockTransport::succeeding(As2ClientResponse::success("m")));
    let mut builder = valid_builder(&key_store)
        .set_receiver_url("::not a url::")
        .set_message_handler(Box::new(CollectingHandler::new()))
        .set_transport(Box::new(transport.clone()));

    builder.send().await.unwrap();

    assert_eq!(transport.call_count(), 1);
    assert_eq!(builder.message_handler().warning_count(), 1);
}

#[tokio::test]
async fn malformed_business_document_fails_after_validation() {
    let key_store = NamedTempFile::new().unwrap();
    let transport = Arc::new(MockTransport::succeeding(As2ClientResponse::success("m")));
    let mut builder = valid_builder(&key_store)
        .set_business_document_bytes(b"<Invoice><ID>1</Invoice>".to_vec())
        .set_transport(Box::new(transport.clone()));

    let err = builder.send().await.unwrap_err();

    assert!(matches!(err, As2ClientError::DocumentRead { .. }));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn transport_errors_propagate_unchanged() {
    let key_store = NamedTempFile::new().unwrap();
    let transport = Arc::new(MockTransport::failing("connection refused"));
    let mut builder = valid_builder(&key_store).set_transport(Box::new(transport.clone()));

    let err = builder.send().await.unwrap_err();

    assert!(matches!(err, As2ClientError::Transport(_)));
    assert!(err.to_string().contains("connection refused"));
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn missing_transport_is_a_configuration_error() {
    let key_store = NamedTempFile::new().unwrap();
    let mut builder = valid_builder(&key_store);

    let err = builder.send().await.unwrap_err();

    assert!(err.to_string().contains("no AS2 transport"));
}

#[tokio::test]
async fn builder_can_be_reused_sequentially() {
    let key_store = NamedTempFile::new().unwrap();
    let transport = Arc::new(MockTransport::succeeding(As2ClientResponse::success("m")));
    let mut builder = valid_builder(&key_store).set_transport(Box::new(transport.clone()));

    builder.send().await.unwrap();
    let mut builder = builder.set_subject("Second message");
    builder.send().await.unwrap();

    assert_eq!(transport.call_count(), 2);
    assert_eq!(transport.sent()[1].1.subject, "Second message");
}
