//! Standard Business Document (SBDH) envelope.
//!
//! Before dispatch the business document is wrapped into a Standard Business
//! Document: an SBDH header carrying the four routing identifiers plus the
//! original document embedded verbatim. [`Envelope::to_xml`] produces the
//! transportable bytes, [`Envelope::from_xml`] recovers header and payload on
//! the receiving side.

use crate::document::XmlRootInfo;
use crate::error::{As2ClientError, As2Result};
use crate::identifier::{DocumentTypeId, ParticipantId, ProcessId};
use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use std::ops::Range;
use uuid::Uuid;

/// Namespace of the SBDH schema.
pub const SBDH_NAMESPACE: &str =
    "http://www.unece.org/cefact/namespaces/StandardBusinessDocumentHeader";

/// SBDH header version written into every envelope.
pub const SBDH_HEADER_VERSION: &str = "1.0";

/// Default document type version stamped into `DocumentIdentification`.
pub const DEFAULT_TYPE_VERSION: &str = "2.1";

const SCOPE_DOCUMENT_ID: &str = "DOCUMENTID";
const SCOPE_PROCESS_ID: &str = "PROCESSID";

/// Routing metadata carried in the envelope header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeHeader {
    /// Sender participant identifier.
    pub sender: ParticipantId,
    /// Receiver participant identifier.
    pub receiver: ParticipantId,
    /// Document type identifier.
    pub document_type: DocumentTypeId,
    /// Process identifier.
    pub process: ProcessId,
    /// Namespace URI of the embedded document's root element.
    pub standard: String,
    /// Schema version of the embedded document.
    pub type_version: String,
    /// Local name of the embedded document's root element.
    pub type_name: String,
    /// Unique identifier of this envelope instance.
    pub instance_identifier: String,
    /// Creation timestamp.
    pub creation: DateTime<Utc>,
}

/// A business document wrapped with routing metadata.
///
/// Immutable once built; one envelope is created per send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// The envelope header.
    pub header: EnvelopeHeader,
    payload: Vec<u8>,
}

impl Envelope {
    /// Wraps a business document, stamping the configured routing identifiers
    /// onto a fresh header. Identifiers keep their configured scheme+value
    /// so they survive a round trip unchanged.
    pub fn wrap(
        sender: ParticipantId,
        receiver: ParticipantId,
        document_type: DocumentTypeId,
        process: ProcessId,
        root: &XmlRootInfo,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            header: EnvelopeHeader {
                sender,
                receiver,
                document_type,
                process,
                standard: root.standard.clone(),
                type_version: DEFAULT_TYPE_VERSION.to_string(),
                type_name: root.type_name.clone(),
                instance_identifier: Uuid::new_v4().to_string(),
                creation: Utc::now(),
            },
            payload,
        }
    }

    /// The embedded business document bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Serializes the envelope to SBDH XML.
    pub fn to_xml(&self) -> As2Result<Vec<u8>> {
        self.write_xml()
            .map_err(|e| As2ClientError::EnvelopeSerialization(e.to_string()))
    }

    fn write_xml(&self) -> std::io::Result<Vec<u8>> {
        let payload_text = match std::str::from_utf8(&self.payload) {
            Ok(s) => strip_xml_decl(s),
            Err(e) => {
                return Err(std::io::Error::other(format!(
                    "business document is not valid UTF-8: {e}"
                )));
            }
        };

        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut sbd = BytesStart::new("StandardBusinessDocument");
        sbd.push_attribute(("xmlns", SBDH_NAMESPACE));
        writer.write_event(Event::Start(sbd))?;
        writer.write_event(Event::Start(BytesStart::new("StandardBusinessDocumentHeader")))?;

        write_text_element(&mut writer, "HeaderVersion", SBDH_HEADER_VERSION)?;
        write_party(&mut writer, "Sender", &self.header.sender)?;
        write_party(&mut writer, "Receiver", &self.header.receiver)?;

        writer.write_event(Event::Start(BytesStart::new("DocumentIdentification")))?;
        write_text_element(&mut writer, "Standard", &self.header.standard)?;
        write_text_element(&mut writer, "TypeVersion", &self.header.type_version)?;
        write_text_element(&mut writer, "InstanceIdentifier", &self.header.instance_identifier)?;
        write_text_element(&mut writer, "Type", &self.header.type_name)?;
        write_text_element(
            &mut writer,
            "CreationDateAndTime",
            &self.header.creation.to_rfc3339_opts(SecondsFormat::Secs, true),
        )?;
        writer.write_event(Event::End(BytesEnd::new("DocumentIdentification")))?;

        writer.write_event(Event::Start(BytesStart::new("BusinessScope")))?;
        write_scope(
            &mut writer,
            SCOPE_DOCUMENT_ID,
            self.header.document_type.value(),
            self.header.document_type.scheme(),
        )?;
        write_scope(
            &mut writer,
            SCOPE_PROCESS_ID,
            self.header.process.value(),
            self.header.process.scheme(),
        )?;
        writer.write_event(Event::End(BytesEnd::new("BusinessScope")))?;

        writer.write_event(Event::End(BytesEnd::new("StandardBusinessDocumentHeader")))?;

        // The business document is already XML; splice it in unescaped.
        writer.write_event(Event::Text(BytesText::from_escaped(payload_text)))?;

        writer.write_event(Event::End(BytesEnd::new("StandardBusinessDocument")))?;
        Ok(writer.into_inner())
    }

    /// Parses an SBDH envelope, recovering header fields and the embedded
    /// business document bytes.
    pub fn from_xml(input: &[u8]) -> As2Result<Self> {
        let parse = |m: String| As2ClientError::EnvelopeParse(m);

        let mut reader = Reader::from_reader(input);
        let mut stack: Vec<String> = Vec::new();
        let mut last_pos = 0usize;

        let mut sender_scheme = None;
        let mut sender_value = None;
        let mut receiver_scheme = None;
        let mut receiver_value = None;
        let mut standard = None;
        let mut type_version = None;
        let mut type_name = None;
        let mut instance_identifier = None;
        let mut creation = None;
        let mut scope_type: Option<String> = None;
        let mut scope_value: Option<String> = None;
        let mut scope_scheme: Option<String> = None;
        let mut document_type: Option<DocumentTypeId> = None;
        let mut process: Option<ProcessId> = None;
        let mut payload_range: Option<Range<usize>> = None;

        loop {
            let event = reader.read_event().map_err(|e| parse(e.to_string()))?;
            match event {
                Event::Start(e) => {
                    let name = local_name_of(e.name().local_name().as_ref());
                    if stack.len() == 1 && name != "StandardBusinessDocumentHeader" {
                        // The first non-header child of the root is the
                        // embedded business document; capture its raw extent.
                        let start = last_pos;
                        let mut depth = 1usize;
                        while depth > 0 {
                            match reader.read_event().map_err(|e| parse(e.to_string()))? {
                                Event::Start(_) => depth += 1,
                                Event::End(_) => depth -= 1,
                                Event::Eof => {
                                    return Err(parse(
                                        "truncated embedded business document".to_string(),
                                    ));
                                }
                                _ => {}
                            }
                        }
                        payload_range = Some(start..reader.buffer_position() as usize);
                        last_pos = reader.buffer_position() as usize;
                        continue;
                    }
                    if name == "Identifier" {
                        if let Some(parent) = stack.last() {
                            if parent == "Sender" || parent == "Receiver" {
                                let authority = attribute_value(&e, b"Authority")
                                    .map_err(|m| parse(m))?;
                                if parent == "Sender" {
                                    sender_scheme = authority;
                                } else {
                                    receiver_scheme = authority;
                                }
                            }
                        }
                    }
                    if name == "Scope" {
                        scope_type = None;
                        scope_value = None;
                        scope_scheme = None;
                    }
                    stack.push(name);
                }
                Event::Empty(e) => {
                    let name = local_name_of(e.name().local_name().as_ref());
                    if stack.len() == 1 && name != "StandardBusinessDocumentHeader" {
                        payload_range = Some(last_pos..reader.buffer_position() as usize);
                    }
                }
                Event::Text(t) => {
                    let text = t
                        .unescape()
                        .map_err(|e| parse(e.to_string()))?
                        .trim()
                        .to_string();
                    if !text.is_empty() {
                        assign_header_field(
                            &stack,
                            text,
                            &mut sender_value,
                            &mut receiver_value,
                            &mut standard,
                            &mut type_version,
                            &mut type_name,
                            &mut instance_identifier,
                            &mut creation,
                            &mut scope_type,
                            &mut scope_value,
                            &mut scope_scheme,
                        );
                    }
                }
                Event::End(_) => {
                    if let Some(closed) = stack.pop() {
                        if closed == "Scope" {
                            match scope_type.as_deref() {
                                Some(SCOPE_DOCUMENT_ID) => {
                                    if let (Some(scheme), Some(value)) =
                                        (scope_scheme.take(), scope_value.take())
                                    {
                                        document_type = Some(DocumentTypeId::new(scheme, value));
                                    }
                                }
                                Some(SCOPE_PROCESS_ID) => {
                                    if let (Some(scheme), Some(value)) =
                                        (scope_scheme.take(), scope_value.take())
                                    {
                                        process = Some(ProcessId::new(scheme, value));
                                    }
                                }
                                _ => {}
                            }
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            last_pos = reader.buffer_position() as usize;
        }

        let require = |field: Option<String>, name: &str| {
            field.ok_or_else(|| parse(format!("missing {name} in SBDH header")))
        };

        let creation_text = require(creation, "CreationDateAndTime")?;
        let creation = DateTime::parse_from_rfc3339(&creation_text)
            .map_err(|e| parse(format!("invalid CreationDateAndTime: {e}")))?
            .with_timezone(&Utc);

        let header = EnvelopeHeader {
            sender: ParticipantId::new(
                require(sender_scheme, "Sender Identifier Authority")?,
                require(sender_value, "Sender Identifier")?,
            ),
            receiver: ParticipantId::new(
                require(receiver_scheme, "Receiver Identifier Authority")?,
                require(receiver_value, "Receiver Identifier")?,
            ),
            document_type: document_type
                .ok_or_else(|| parse("missing DOCUMENTID business scope".to_string()))?,
            process: process
                .ok_or_else(|| parse("missing PROCESSID business scope".to_string()))?,
            standard: require(standard, "Standard")?,
            type_version: require(type_version, "TypeVersion")?,
            type_name: require(type_name, "Type")?,
            instance_identifier: require(instance_identifier, "InstanceIdentifier")?,
            creation,
        };
        let payload_range = payload_range
            .ok_or_else(|| parse("no embedded business document found".to_string()))?;

        Ok(Self {
            header,
            payload: input[payload_range].to_vec(),
        })
    }
}

fn local_name_of(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn attribute_value(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, String> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        if attr.key.local_name().as_ref() == key {
            let value = attr.unescape_value().map_err(|e| e.to_string())?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

#[allow(clippy::too_many_arguments)]
fn assign_header_field(
    stack: &[String],
    text: String,
    sender_value: &mut Option<String>,
    receiver_value: &mut Option<String>,
    standard: &mut Option<String>,
    type_version: &mut Option<String>,
    type_name: &mut Option<String>,
    instance_identifier: &mut Option<String>,
    creation: &mut Option<String>,
    scope_type: &mut Option<String>,
    scope_value: &mut Option<String>,
    scope_scheme: &mut Option<String>,
) {
    let tail = |n: usize| -> Option<&str> {
        stack
            .len()
            .checked_sub(n)
            .and_then(|i| stack.get(i))
            .map(String::as_str)
    };
    let (element, parent) = (tail(1), tail(2));
    match (parent, element) {
        (Some("Sender"), Some("Identifier")) => *sender_value = Some(text),
        (Some("Receiver"), Some("Identifier")) => *receiver_value = Some(text),
        (Some("DocumentIdentification"), Some("Standard")) => *standard = Some(text),
        (Some("DocumentIdentification"), Some("TypeVersion")) => *type_version = Some(text),
        (Some("DocumentIdentification"), Some("InstanceIdentifier")) => {
            *instance_identifier = Some(text)
        }
        (Some("DocumentIdentification"), Some("Type")) => *type_name = Some(text),
        (Some("DocumentIdentification"), Some("CreationDateAndTime")) => *creation = Some(text),
        (Some("Scope"), Some("Type")) => *scope_type = Some(text),
        (Some("Scope"), Some("InstanceIdentifier")) => *scope_value = Some(text),
        (Some("Scope"), Some("Identifier")) => *scope_scheme = Some(text),
        _ => {}
    }
}

fn write_text_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
) -> std::io::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_party<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    id: &ParticipantId,
) -> std::io::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    let mut identifier = BytesStart::new("Identifier");
    identifier.push_attribute(("Authority", id.scheme()));
    writer.write_event(Event::Start(identifier))?;
    writer.write_event(Event::Text(BytesText::new(id.value())))?;
    writer.write_event(Event::End(BytesEnd::new("Identifier")))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_scope<W: std::io::Write>(
    writer: &mut Writer<W>,
    scope_type: &str,
    value: &str,
    scheme: &str,
) -> std::io::Result<()> {
    writer.write_event(Event::Start(BytesStart::new("Scope")))?;
    write_text_element(writer, "Type", scope_type)?;
    write_text_element(writer, "InstanceIdentifier", value)?;
    write_text_element(writer, "Identifier", scheme)?;
    writer.write_event(Event::End(BytesEnd::new("Scope")))?;
    Ok(())
}

/// Removes a leading XML declaration so the document can be embedded inside
/// the envelope.
fn strip_xml_decl(document: &str) -> &str {
    let trimmed = document.trim_start();
    if let Some(rest) = trimmed.strip_prefix("<?xml") {
        if let Some(end) = rest.find("?>") {
            return rest[end + 2..].trim_start();
        }
    }
    trimmed
}
