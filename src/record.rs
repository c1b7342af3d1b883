//! Record data and extra response data: payload traits, parser traits and
//! the read-only registries the response walker dispatches through.

use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use crate::error::{Result, SruError, XmlResult};
use crate::protocol::{Diagnostic, RECORD_SCHEMA_DIAGNOSTIC};
use crate::xml_reader::{Token, XmlCursor};

/// A parsed record payload. Opaque to the client beyond its schema.
pub trait RecordData: Any + Debug + Send + Sync {
    /// Record schema this payload was parsed from
    fn record_schema(&self) -> &str;

    /// Transient payloads are manufactured by the client, not sent by the endpoint
    fn is_transient(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;
}

impl dyn RecordData {
    /// Downcast to a concrete payload type
    pub fn downcast_ref<T: RecordData>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Parses the content of `recordData` for one record schema.
///
/// The cursor handed to [`RecordDataParser::parse`] is scoped to the record:
/// it reports end of input at the enclosing element's boundary. A parser
/// should consume exactly its record's content. Returning `Ok(None)` signals
/// a valid but empty record; the walker substitutes a surrogate diagnostic.
pub trait RecordDataParser: Send + Sync {
    fn record_schema(&self) -> &str;

    fn parse(&self, reader: &mut dyn XmlCursor) -> Result<Option<Box<dyn RecordData>>>;
}

/// Registry of record data parsers keyed by record schema
#[derive(Default, Clone)]
pub struct RecordDataParserRegistry {
    parsers: HashMap<String, Arc<dyn RecordDataParser>>,
}

impl RecordDataParserRegistry {
    /// Key matching any schema without an exact registration
    pub const WILDCARD: &'static str = "*";

    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parser under its own schema
    pub fn register(&mut self, parser: Arc<dyn RecordDataParser>) -> Result<()> {
        let schema = parser.record_schema().to_string();
        self.register_as(schema, parser)
    }

    /// Register a parser as the fallback for unregistered schemas
    pub fn register_wildcard(&mut self, parser: Arc<dyn RecordDataParser>) -> Result<()> {
        self.register_as(Self::WILDCARD.to_string(), parser)
    }

    fn register_as(&mut self, schema: String, parser: Arc<dyn RecordDataParser>) -> Result<()> {
        if schema.is_empty() {
            return Err(SruError::InvalidRequest(
                "record data parser has an empty record schema".to_string(),
            ));
        }
        if self.parsers.contains_key(&schema) {
            return Err(SruError::DuplicateRecordParser { schema });
        }
        self.parsers.insert(schema, parser);
        Ok(())
    }

    /// Exact match first, then the wildcard registration
    pub fn find(&self, schema: &str) -> Option<&Arc<dyn RecordDataParser>> {
        self.parsers
            .get(schema)
            .or_else(|| self.parsers.get(Self::WILDCARD))
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}

impl Debug for RecordDataParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut schemas: Vec<&String> = self.parsers.keys().collect();
        schemas.sort();
        f.debug_struct("RecordDataParserRegistry")
            .field("schemas", &schemas)
            .finish()
    }
}

/// A diagnostic standing in for a record: either a diagnostic record sent by
/// the endpoint or one synthesized by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurrogateDiagnostic {
    pub diagnostic: Diagnostic,
}

impl SurrogateDiagnostic {
    pub fn new(diagnostic: Diagnostic) -> Self {
        Self { diagnostic }
    }
}

impl RecordData for SurrogateDiagnostic {
    fn record_schema(&self) -> &str {
        RECORD_SCHEMA_DIAGNOSTIC
    }

    fn is_transient(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Schema-agnostic record payload: root element and its concatenated text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericRecordData {
    pub record_schema: String,
    pub root_namespace: String,
    pub root_name: String,
    pub text: String,
}

impl RecordData for GenericRecordData {
    fn record_schema(&self) -> &str {
        &self.record_schema
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Fallback parser capturing any record as [`GenericRecordData`].
///
/// Meant for wildcard registration. The reported schema is the one this
/// parser was created with, since the wildcard lookup does not pass the
/// record's actual schema down.
#[derive(Debug, Clone)]
pub struct GenericRecordDataParser {
    record_schema: String,
}

impl GenericRecordDataParser {
    pub fn new(record_schema: impl Into<String>) -> Self {
        Self {
            record_schema: record_schema.into(),
        }
    }
}

impl Default for GenericRecordDataParser {
    fn default() -> Self {
        Self::new(RecordDataParserRegistry::WILDCARD)
    }
}

impl RecordDataParser for GenericRecordDataParser {
    fn record_schema(&self) -> &str {
        &self.record_schema
    }

    fn parse(&self, reader: &mut dyn XmlCursor) -> Result<Option<Box<dyn RecordData>>> {
        let Some(root) = reader.peek_start_tag()? else {
            return Ok(None);
        };
        let text = collect_text(reader)?;
        Ok(Some(Box::new(GenericRecordData {
            record_schema: self.record_schema.clone(),
            root_namespace: root.namespace,
            root_name: root.local_name,
            text,
        })))
    }
}

/// Drain a cursor, joining the non-blank text nodes with single spaces
fn collect_text(reader: &mut dyn XmlCursor) -> XmlResult<String> {
    let mut parts = Vec::new();
    loop {
        match reader.next_token()? {
            Token::Text(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    parts.push(text.to_string());
                }
            }
            Token::Eof => break,
            _ => {}
        }
    }
    Ok(parts.join(" "))
}

/// Extension payload carried in `extraResponseData`
pub trait ExtraResponseData: Any + Debug + Send + Sync {
    /// Root element name of the block this payload was parsed from
    fn name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;
}

impl dyn ExtraResponseData {
    pub fn downcast_ref<T: ExtraResponseData>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Parses one kind of `extraResponseData` block, recognized by its root element
pub trait ExtraResponseDataParser: Send + Sync {
    fn supports(&self, namespace: &str, local_name: &str) -> bool;

    /// Parse the block. The cursor is positioned on the block's root start tag.
    fn parse(&self, reader: &mut dyn XmlCursor) -> Result<Box<dyn ExtraResponseData>>;
}

/// Ordered collection of extra response data parsers
#[derive(Default, Clone)]
pub struct ExtraResponseDataParserRegistry {
    parsers: Vec<Arc<dyn ExtraResponseDataParser>>,
}

impl ExtraResponseDataParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, parser: Arc<dyn ExtraResponseDataParser>) {
        self.parsers.push(parser);
    }

    /// First registered parser accepting the element
    pub fn find(&self, namespace: &str, local_name: &str) -> Option<&Arc<dyn ExtraResponseDataParser>> {
        self.parsers
            .iter()
            .find(|parser| parser.supports(namespace, local_name))
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}

impl Debug for ExtraResponseDataParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtraResponseDataParserRegistry")
            .field("parsers", &self.parsers.len())
            .finish()
    }
}
