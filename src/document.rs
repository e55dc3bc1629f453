//! Business document sources.
//!
//! The payload handed to the builder is either a file on disk or in-memory
//! bytes. It must be an XML document; the SBDH wrapper is added by the
//! pipeline and must not already be present.

use crate::error::{As2ClientError, As2Result};
use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use std::path::PathBuf;

/// A readable business document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    /// A document file on disk.
    File(PathBuf),
    /// Document content held in memory.
    Bytes(Vec<u8>),
}

impl DocumentSource {
    /// Creates a file-backed source.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Creates an in-memory source.
    pub fn bytes(data: Vec<u8>) -> Self {
        Self::Bytes(data)
    }

    /// Whether the source resolves to existing content.
    ///
    /// Used by the verification scan; in-memory sources always exist.
    pub fn is_readable(&self) -> bool {
        match self {
            Self::File(path) => path.is_file(),
            Self::Bytes(_) => true,
        }
    }

    /// Human-readable description of where the document lives.
    pub fn location(&self) -> String {
        match self {
            Self::File(path) => format!("'{}'", path.display()),
            Self::Bytes(data) => format!("in-memory document ({} bytes)", data.len()),
        }
    }

    /// Reads the full document content.
    pub async fn read(&self) -> As2Result<Vec<u8>> {
        match self {
            Self::File(path) => {
                tokio::fs::read(path)
                    .await
                    .map_err(|e| As2ClientError::DocumentRead {
                        source_name: self.location(),
                        reason: e.to_string(),
                    })
            }
            Self::Bytes(data) => Ok(data.clone()),
        }
    }
}

/// Root element information of an XML business document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlRootInfo {
    /// Namespace URI of the root element; empty when the root is unqualified.
    pub standard: String,
    /// Local name of the root element.
    pub type_name: String,
}

/// Parses `bytes` as XML and returns namespace and local name of the root
/// element. The whole document is scanned so that malformed trailing content
/// is rejected too.
pub fn inspect_xml_root(bytes: &[u8]) -> Result<XmlRootInfo, String> {
    let mut reader = NsReader::from_reader(bytes);
    let mut root: Option<XmlRootInfo> = None;
    loop {
        match reader.read_resolved_event() {
            Ok((resolve, Event::Start(e))) | Ok((resolve, Event::Empty(e))) => {
                if root.is_none() {
                    let standard = match resolve {
                        ResolveResult::Bound(ns) => {
                            String::from_utf8_lossy(ns.as_ref()).into_owned()
                        }
                        _ => String::new(),
                    };
                    let type_name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    root = Some(XmlRootInfo {
                        standard,
                        type_name,
                    });
                }
            }
            Ok((_, Event::Eof)) => break,
            Ok(_) => {}
            Err(e) => return Err(e.to_string()),
        }
    }
    root.ok_or_else(|| "document contains no root element".to_string())
}
