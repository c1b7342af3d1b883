//! Protocol vocabulary: versions, operations, record escaping and packing,
//! list positions and diagnostics.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Record schema identifying records that carry a diagnostic instead of data
pub const RECORD_SCHEMA_DIAGNOSTIC: &str = "info:srw/schema/1/diagnostics-v1.1";

/// Prefix reserved for diagnostics synthesized by the client itself
pub const SURROGATE_DIAGNOSTIC_PREFIX: &str = "info:clarin/sru/diagnostic/";

/// No record data parser was registered for the record's schema.
pub const DIAG_NO_RECORD_PARSER: &str = "info:clarin/sru/diagnostic/1";

/// A record data parser returned no result.
pub const DIAG_RECORD_PARSER_NULL: &str = "info:clarin/sru/diagnostic/2";

/// Protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SruVersion {
    #[serde(rename = "1.1")]
    V1_1,
    #[serde(rename = "1.2")]
    V1_2,
    #[serde(rename = "2.0")]
    V2_0,
}

impl SruVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            SruVersion::V1_1 => "1.1",
            SruVersion::V1_2 => "1.2",
            SruVersion::V2_0 => "2.0",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "1.1" => Some(SruVersion::V1_1),
            "1.2" => Some(SruVersion::V1_2),
            "2.0" => Some(SruVersion::V2_0),
            _ => None,
        }
    }

    pub fn is_legacy(&self) -> bool {
        !matches!(self, SruVersion::V2_0)
    }
}

impl fmt::Display for SruVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Explain,
    Scan,
    SearchRetrieve,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Explain => "explain",
            Operation::Scan => "scan",
            Operation::SearchRetrieve => "searchRetrieve",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether embedded record XML is inlined or carried as an escaped string.
///
/// Version 1.x names this `recordPacking`, version 2.0 `recordXMLEscaping`.
/// Both use the same two wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordXmlEscaping {
    Xml,
    String,
}

impl RecordXmlEscaping {
    /// Parameter and element name carrying this setting for a version
    pub fn element_name(version: SruVersion) -> &'static str {
        if version.is_legacy() {
            "recordPacking"
        } else {
            "recordXMLEscaping"
        }
    }

    /// Element name used by the other protocol generation
    pub fn alternate_element_name(version: SruVersion) -> &'static str {
        if version.is_legacy() {
            "recordXMLEscaping"
        } else {
            "recordPacking"
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordXmlEscaping::Xml => "xml",
            RecordXmlEscaping::String => "string",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "xml" => Some(RecordXmlEscaping::Xml),
            "string" => Some(RecordXmlEscaping::String),
            _ => None,
        }
    }
}

/// Version 2.0 record packing (`recordPacking` parameter)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordPacking {
    Packed,
    Unpacked,
}

impl RecordPacking {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordPacking::Packed => "packed",
            RecordPacking::Unpacked => "unpacked",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "packed" => Some(RecordPacking::Packed),
            "unpacked" => Some(RecordPacking::Unpacked),
            _ => None,
        }
    }
}

/// Position of a scan term within the returned term list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhereInList {
    First,
    Last,
    Only,
    Inner,
}

impl WhereInList {
    pub fn as_str(&self) -> &'static str {
        match self {
            WhereInList::First => "first",
            WhereInList::Last => "last",
            WhereInList::Only => "only",
            WhereInList::Inner => "inner",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "first" => Some(WhereInList::First),
            "last" => Some(WhereInList::Last),
            "only" => Some(WhereInList::Only),
            "inner" => Some(WhereInList::Inner),
            _ => None,
        }
    }
}

/// A diagnostic, either returned by the endpoint or synthesized by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub uri: String,
    pub details: Option<String>,
    pub message: Option<String>,
}

impl Diagnostic {
    pub fn new(
        uri: impl Into<String>,
        details: Option<String>,
        message: Option<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            details,
            message,
        }
    }

    /// Check if this diagnostic was manufactured by the client
    pub fn is_surrogate(&self) -> bool {
        self.uri.starts_with(SURROGATE_DIAGNOSTIC_PREFIX)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri)?;
        if let Some(details) = &self.details {
            write!(f, " [{}]", details)?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}
