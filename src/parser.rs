//! Response grammar walker.
//!
//! Walks explain, scan and searchRetrieve responses over an [`XmlCursor`].
//! Grammar violations are always fatal. Protocol etiquette violations (element
//! order, casing, namespace placement, escaping mismatches) are fatal in
//! strict mode and logged with best-effort recovery otherwise.

use tracing::{debug, trace, warn};

use crate::error::{Result, XmlError};
use crate::namespace::NamespaceProfile;
use crate::protocol::{
    DIAG_NO_RECORD_PARSER, DIAG_RECORD_PARSER_NULL, Diagnostic, RECORD_SCHEMA_DIAGNOSTIC,
    RecordXmlEscaping, SruVersion, WhereInList,
};
use crate::record::{
    ExtraResponseData, ExtraResponseDataParserRegistry, RecordData, RecordDataParserRegistry,
    SurrogateDiagnostic,
};
use crate::request::{ExplainRequest, ScanRequest, SearchRetrieveRequest};
use crate::response::{
    ExplainResponse, Record, ResponseStats, ScanResponse, SearchRetrieveResponse, Term,
};
use crate::subtree::SubtreeReader;
use crate::xml_reader::{Token, XmlCursor, XmlReader};

const TARGET: &str = "sru_client::parser";

/// Misspelling of the 2.0 escaping element seen in the wild
const ESCAPING_CASING_VARIANT: &str = "recordXmlEscaping";

/// What every envelope has in common, read before the operation body
struct Envelope {
    profile: &'static NamespaceProfile,
    namespace: &'static str,
    root: &'static str,
    version: SruVersion,
    /// Diagnostics found right after the version; the payload is absent
    fatal_diagnostics: Option<Vec<Diagnostic>>,
}

/// What every envelope has in common, read after the operation body
struct Trailer {
    diagnostics: Option<Vec<Diagnostic>>,
    extra_response_data: Vec<Box<dyn ExtraResponseData>>,
}

/// Response grammar walker bound to a client's parser registries
pub struct ResponseParser<'a> {
    strict: bool,
    record_parsers: &'a RecordDataParserRegistry,
    extra_parsers: &'a ExtraResponseDataParserRegistry,
}

impl<'a> ResponseParser<'a> {
    pub fn new(
        strict: bool,
        record_parsers: &'a RecordDataParserRegistry,
        extra_parsers: &'a ExtraResponseDataParserRegistry,
    ) -> Self {
        Self {
            strict,
            record_parsers,
            extra_parsers,
        }
    }

    pub fn parse_explain(
        &self,
        reader: &mut dyn XmlCursor,
        request: &ExplainRequest,
    ) -> Result<ExplainResponse> {
        let envelope = self.begin_envelope(reader, "explainResponse", false)?;
        let version = envelope.version;

        if let Some(diagnostics) = envelope.fatal_diagnostics {
            reader.match_end(envelope.namespace, envelope.root, true)?;
            return Ok(ExplainResponse {
                request: request.clone(),
                version,
                diagnostics: Some(diagnostics),
                extra_response_data: Vec::new(),
                stats: ResponseStats::default(),
                record: None,
            });
        }

        reader.match_start(envelope.namespace, "record", true, false)?;
        let record = self.parse_record(
            reader,
            envelope.namespace,
            envelope.profile,
            version,
            request.record_xml_escaping(),
        )?;

        let trailer = self.parse_trailer(reader, &envelope, "echoedExplainRequest")?;
        reader.match_end(envelope.namespace, envelope.root, false)?;

        Ok(ExplainResponse {
            request: request.clone(),
            version,
            diagnostics: trailer.diagnostics,
            extra_response_data: trailer.extra_response_data,
            stats: ResponseStats::default(),
            record: Some(record),
        })
    }

    pub fn parse_scan(
        &self,
        reader: &mut dyn XmlCursor,
        request: &ScanRequest,
    ) -> Result<ScanResponse> {
        let envelope = self.begin_envelope(reader, "scanResponse", true)?;
        let version = envelope.version;

        if let Some(diagnostics) = envelope.fatal_diagnostics {
            reader.match_end(envelope.namespace, envelope.root, true)?;
            return Ok(ScanResponse {
                request: request.clone(),
                version,
                diagnostics: Some(diagnostics),
                extra_response_data: Vec::new(),
                stats: ResponseStats::default(),
                terms: Vec::new(),
            });
        }

        let ns = envelope.namespace;
        let mut terms = Vec::new();
        if reader.match_start(ns, "terms", false, false)? {
            while reader.match_start(ns, "term", false, false)? {
                terms.push(self.parse_term(reader, ns)?);
            }
            reader.match_end(ns, "terms", false)?;
        }
        trace!(target: TARGET, terms = terms.len(), "parsed scan terms");

        let trailer = self.parse_trailer(reader, &envelope, "echoedScanRequest")?;
        reader.match_end(ns, envelope.root, false)?;

        Ok(ScanResponse {
            request: request.clone(),
            version,
            diagnostics: trailer.diagnostics,
            extra_response_data: trailer.extra_response_data,
            stats: ResponseStats::default(),
            terms,
        })
    }

    pub fn parse_search_retrieve(
        &self,
        reader: &mut dyn XmlCursor,
        request: &SearchRetrieveRequest,
    ) -> Result<SearchRetrieveResponse> {
        let envelope = self.begin_envelope(reader, "searchRetrieveResponse", false)?;
        let version = envelope.version;
        let ns = envelope.namespace;

        if let Some(diagnostics) = envelope.fatal_diagnostics {
            reader.match_end(ns, envelope.root, true)?;
            return Ok(SearchRetrieveResponse {
                request: request.clone(),
                version,
                diagnostics: Some(diagnostics),
                extra_response_data: Vec::new(),
                stats: ResponseStats::default(),
                number_of_records: None,
                result_set_id: None,
                result_set_idle_time: None,
                result_count_precision: None,
                records: Vec::new(),
                next_record_position: None,
            });
        }

        let number_of_records = reader.read_count(ns, "numberOfRecords", true)?.unwrap_or_default();
        let result_set_id = reader.read_text(ns, "resultSetId", false)?;
        let mut result_set_idle_time = reader.read_count(ns, "resultSetIdleTime", false)?;
        if result_set_idle_time.is_none() && !version.is_legacy() {
            result_set_idle_time = reader.read_count(ns, "resultSetTTL", false)?;
        }

        let mut records = Vec::new();
        if reader.match_start(ns, "records", false, false)? {
            if number_of_records == 0 && reader.peek_start(ns, "record")? {
                // only the zero-count case is checked for surplus records
                let position = reader.position();
                self.violation(
                    position,
                    "numberOfRecords is 0 but the records element is not empty".to_string(),
                )?;
            }
            while reader.match_start(ns, "record", false, false)? {
                records.push(self.parse_record(
                    reader,
                    ns,
                    envelope.profile,
                    version,
                    request.record_xml_escaping(),
                )?);
            }
            reader.match_end(ns, "records", false)?;
        }
        check_record_count(request, number_of_records, records.len(), reader.position());

        let next_record_position = reader.read_count(ns, "nextRecordPosition", false)?;

        let trailer = self.parse_trailer(reader, &envelope, "echoedSearchRetrieveRequest")?;

        // 2.0 additions after the trailer
        let mut result_count_precision = None;
        if !version.is_legacy() {
            result_count_precision = reader.read_text(ns, "resultCountPrecision", false)?;
            for name in ["facetedResults", "searchResultAnalysis"] {
                if reader.peek_start(ns, name)? {
                    debug!(target: TARGET, element = name, "skipping unsupported 2.0 block");
                    reader.skip_element()?;
                }
            }
        }
        reader.match_end(ns, envelope.root, false)?;

        Ok(SearchRetrieveResponse {
            request: request.clone(),
            version,
            diagnostics: trailer.diagnostics,
            extra_response_data: trailer.extra_response_data,
            stats: ResponseStats::default(),
            number_of_records: Some(number_of_records),
            result_set_id,
            result_set_idle_time,
            result_count_precision,
            records,
            next_record_position,
        })
    }

    /// Report an etiquette violation: fatal when strict, logged otherwise
    fn violation(&self, position: u64, details: String) -> Result<()> {
        if self.strict {
            return Err(XmlError::ProtocolViolation { details, position }.into());
        }
        warn!(target: TARGET, position, "{}", details);
        Ok(())
    }

    /// Sniff the root namespace, open the envelope and read its version
    fn begin_envelope(
        &self,
        reader: &mut dyn XmlCursor,
        root: &'static str,
        scan: bool,
    ) -> Result<Envelope> {
        let position = reader.position();
        let Some(tag) = reader.peek_start_tag()? else {
            let found = reader.peek()?.to_string();
            return Err(XmlError::MissingElement {
                namespace: String::new(),
                name: root.to_string(),
                found,
                position,
            }
            .into());
        };
        let profile = NamespaceProfile::detect(&tag.namespace).ok_or_else(|| {
            XmlError::UnknownNamespace {
                namespace: tag.namespace.clone(),
                position,
            }
        })?;
        let namespace = if scan {
            profile.scan_ns
        } else {
            profile.response_ns
        };
        debug!(target: TARGET, profile = profile.name, root, "detected namespace profile");

        reader.match_start(namespace, root, true, false)?;

        let position = reader.position();
        let version = match reader.read_text(namespace, "version", profile.is_legacy())? {
            Some(value) => SruVersion::parse(&value).ok_or(XmlError::InvalidVersion {
                version: value,
                position,
            })?,
            None => SruVersion::V2_0,
        };
        if version.is_legacy() != profile.is_legacy() {
            self.violation(
                position,
                format!(
                    "version {} announced in a {} namespace response",
                    version, profile.name
                ),
            )?;
        }

        let fatal_diagnostics = if reader.peek_start(namespace, "diagnostics")? {
            let diagnostics = self.parse_diagnostics(reader, namespace, profile)?;
            debug!(
                target: TARGET,
                count = diagnostics.len(),
                "envelope diagnostics replace the payload"
            );
            Some(diagnostics)
        } else {
            None
        };

        Ok(Envelope {
            profile,
            namespace,
            root,
            version,
            fatal_diagnostics,
        })
    }

    /// Parse a `diagnostics` container in namespace `container_ns`
    fn parse_diagnostics(
        &self,
        reader: &mut dyn XmlCursor,
        container_ns: &str,
        profile: &'static NamespaceProfile,
    ) -> Result<Vec<Diagnostic>> {
        reader.match_start(container_ns, "diagnostics", true, false)?;
        let mut diagnostics = Vec::new();
        while let Some(tag) = reader.peek_start_tag()? {
            if tag.local_name != "diagnostic" {
                break;
            }
            diagnostics.push(self.parse_diagnostic(reader, profile)?);
        }
        reader.match_end(container_ns, "diagnostics", false)?;
        Ok(diagnostics)
    }

    /// Parse one `diagnostic` element, tolerating the other profile's namespace
    fn parse_diagnostic(
        &self,
        reader: &mut dyn XmlCursor,
        profile: &'static NamespaceProfile,
    ) -> Result<Diagnostic> {
        let position = reader.position();
        let mut ns = profile.diagnostic_ns;
        if !reader.peek_start(ns, "diagnostic")? {
            let other = profile.other().diagnostic_ns;
            if reader.peek_start(other, "diagnostic")? {
                self.violation(
                    position,
                    format!("diagnostic in namespace '{}' instead of '{}'", other, ns),
                )?;
                ns = other;
            }
        }

        reader.match_start(ns, "diagnostic", true, false)?;
        let uri = reader.read_text(ns, "uri", true)?.unwrap_or_default();
        let details = reader.read_text(ns, "details", false)?;
        let message = reader.read_text(ns, "message", false)?;
        reader.match_end(ns, "diagnostic", false)?;
        Ok(Diagnostic::new(uri, details, message))
    }

    fn parse_term(&self, reader: &mut dyn XmlCursor, ns: &str) -> Result<Term> {
        let value = reader.read_text(ns, "value", true)?.unwrap_or_default();
        let number_of_records = reader.read_count(ns, "numberOfRecords", false)?;
        let display_term = reader.read_text(ns, "displayTerm", false)?;

        let position = reader.position();
        let where_in_list = match reader.read_text(ns, "whereInList", false)? {
            Some(flag) => Some(WhereInList::parse(&flag).ok_or(XmlError::InvalidEnumValue {
                name: "whereInList".to_string(),
                value: flag,
                position,
            })?),
            None => None,
        };

        if reader.peek_start(ns, "extraTermData")? {
            reader.skip_element()?;
        }
        reader.match_end(ns, "term", false)?;

        Ok(Term {
            value,
            number_of_records,
            display_term,
            where_in_list,
        })
    }

    /// Parse the content of a `record` element whose start tag was consumed
    fn parse_record(
        &self,
        reader: &mut dyn XmlCursor,
        ns: &str,
        profile: &'static NamespaceProfile,
        version: SruVersion,
        requested: Option<RecordXmlEscaping>,
    ) -> Result<Record> {
        let mut escaping = None;
        if let Some((position, value)) = self.read_escaping(reader, ns, version)? {
            self.violation(
                position,
                "record escaping element appears before recordSchema".to_string(),
            )?;
            escaping = Some(value);
        }

        let record_schema = reader.read_text(ns, "recordSchema", true)?.unwrap_or_default();

        if escaping.is_none() {
            escaping = self.read_escaping(reader, ns, version)?.map(|(_, value)| value);
        }
        let position = reader.position();
        let escaping = match escaping {
            Some(escaping) => escaping,
            None => {
                if version.is_legacy() {
                    self.violation(
                        position,
                        format!(
                            "record lacks the {} element",
                            RecordXmlEscaping::element_name(version)
                        ),
                    )?;
                }
                requested.unwrap_or(RecordXmlEscaping::Xml)
            }
        };
        if let Some(requested) = requested
            && requested != escaping
        {
            self.violation(
                position,
                format!(
                    "requested record escaping '{}' but endpoint returned '{}'",
                    requested.as_str(),
                    escaping.as_str()
                ),
            )?;
        }

        reader.match_start(ns, "recordData", true, false)?;
        let record_data = match escaping {
            RecordXmlEscaping::String => {
                let text = reader.read_raw_text()?;
                reader.match_end(ns, "recordData", false)?;

                let mut embedded = XmlReader::from_text(&text);
                let data = self.parse_record_data(&mut embedded, profile, &record_schema)?;
                embedded.skip_whitespace()?;
                if embedded.peek()? != &Token::Eof {
                    let position = embedded.position();
                    warn!(
                        target: TARGET,
                        position,
                        schema = %record_schema,
                        "record data parser left content unread"
                    );
                }
                data
            }
            RecordXmlEscaping::Xml => {
                let data = {
                    let mut scoped = SubtreeReader::new(&mut *reader);
                    let data = self.parse_record_data(&mut scoped, profile, &record_schema)?;
                    if scoped.finish()? {
                        let position = scoped.position();
                        warn!(
                            target: TARGET,
                            position,
                            schema = %record_schema,
                            "record data parser left content unread"
                        );
                    }
                    data
                };
                reader.match_end(ns, "recordData", false)?;
                data
            }
        };

        let record_identifier = reader.read_text(ns, "recordIdentifier", false)?;
        let record_position = reader.read_count(ns, "recordPosition", false)?;
        if reader.peek_start(ns, "extraRecordData")? {
            trace!(target: TARGET, "skipping extraRecordData");
            reader.skip_element()?;
        }
        reader.match_end(ns, "record", false)?;

        Ok(Record {
            record_schema,
            record_data,
            record_identifier,
            record_position,
        })
    }

    /// Read the record escaping element under any of the names in circulation.
    ///
    /// Returns the value and the position it was found at, or `None` if the
    /// next element is none of them.
    fn read_escaping(
        &self,
        reader: &mut dyn XmlCursor,
        ns: &str,
        version: SruVersion,
    ) -> Result<Option<(u64, RecordXmlEscaping)>> {
        let Some(tag) = reader.peek_start_tag()? else {
            return Ok(None);
        };
        if tag.namespace != ns {
            return Ok(None);
        }

        let expected = RecordXmlEscaping::element_name(version);
        let position = reader.position();
        let name = tag.local_name.as_str();
        if name == expected {
            // canonical
        } else if name == RecordXmlEscaping::alternate_element_name(version) {
            self.violation(
                position,
                format!("record uses <{}> instead of <{}>", name, expected),
            )?;
        } else if name == ESCAPING_CASING_VARIANT {
            self.violation(
                position,
                format!("record uses <{}> instead of <recordXMLEscaping>", name),
            )?;
        } else {
            return Ok(None);
        }

        let value = reader.read_text(ns, name, true)?.unwrap_or_default();
        let escaping = match RecordXmlEscaping::parse(&value) {
            Some(escaping) => escaping,
            None => match RecordXmlEscaping::parse(&value.to_ascii_lowercase()) {
                Some(escaping) => {
                    self.violation(position, format!("record escaping value '{}' is not lower case", value))?;
                    escaping
                }
                None => {
                    return Err(XmlError::InvalidEnumValue {
                        name: name.to_string(),
                        value,
                        position,
                    }
                    .into());
                }
            },
        };
        Ok(Some((position, escaping)))
    }

    /// Dispatch a record's content to the matching record data parser
    fn parse_record_data(
        &self,
        reader: &mut dyn XmlCursor,
        profile: &'static NamespaceProfile,
        record_schema: &str,
    ) -> Result<Box<dyn RecordData>> {
        if record_schema == RECORD_SCHEMA_DIAGNOSTIC {
            let diagnostic = self.parse_diagnostic(reader, profile)?;
            return Ok(Box::new(SurrogateDiagnostic::new(diagnostic)));
        }

        let Some(parser) = self.record_parsers.find(record_schema) else {
            debug!(target: TARGET, schema = record_schema, "no record data parser registered");
            return Ok(surrogate(
                DIAG_NO_RECORD_PARSER,
                record_schema,
                "no record data parser available",
            ));
        };

        match parser.parse(reader)? {
            Some(data) => Ok(data),
            None => {
                warn!(
                    target: TARGET,
                    schema = record_schema,
                    "record data parser returned no result"
                );
                Ok(surrogate(
                    DIAG_RECORD_PARSER_NULL,
                    record_schema,
                    "record data parser did not parse anything",
                ))
            }
        }
    }

    /// Echoed request, trailing diagnostics and extra response data
    fn parse_trailer(
        &self,
        reader: &mut dyn XmlCursor,
        envelope: &Envelope,
        echo: &str,
    ) -> Result<Trailer> {
        let ns = envelope.namespace;

        if let Some(tag) = reader.peek_start_tag()?
            && tag.local_name == echo
        {
            if tag.namespace != ns {
                let position = reader.position();
                self.violation(
                    position,
                    format!("<{}> in namespace '{}' instead of '{}'", echo, tag.namespace, ns),
                )?;
            }
            reader.skip_element()?;
        }

        let mut diagnostics = None;
        if let Some(tag) = reader.peek_start_tag()?
            && tag.local_name == "diagnostics"
        {
            if tag.namespace != ns {
                let position = reader.position();
                self.violation(
                    position,
                    format!("<diagnostics> in namespace '{}' instead of '{}'", tag.namespace, ns),
                )?;
            }
            diagnostics = Some(self.parse_diagnostics(reader, &tag.namespace, envelope.profile)?);
        }

        let mut extra_response_data = Vec::new();
        if reader.match_start(ns, "extraResponseData", false, false)? {
            while let Some(tag) = reader.peek_start_tag()? {
                match self.extra_parsers.find(&tag.namespace, &tag.local_name) {
                    Some(parser) => {
                        let mut scoped = SubtreeReader::element(&mut *reader);
                        extra_response_data.push(parser.parse(&mut scoped)?);
                        if scoped.finish()? {
                            debug!(
                                target: TARGET,
                                element = %tag.local_name,
                                "extra response data parser left content unread"
                            );
                        }
                    }
                    None => {
                        debug!(
                            target: TARGET,
                            element = %tag.local_name,
                            namespace = %tag.namespace,
                            "skipping unsupported extra response data"
                        );
                        reader.skip_element()?;
                    }
                }
            }
            reader.match_end(ns, "extraResponseData", false)?;
        }

        Ok(Trailer {
            diagnostics,
            extra_response_data,
        })
    }
}

fn surrogate(uri: &str, record_schema: &str, message: &str) -> Box<dyn RecordData> {
    Box::new(SurrogateDiagnostic::new(Diagnostic::new(
        uri,
        Some(record_schema.to_string()),
        Some(message.to_string()),
    )))
}

/// Fewer records than the page should hold is an anomaly, never an error
fn check_record_count(
    request: &SearchRetrieveRequest,
    number_of_records: i64,
    returned: usize,
    position: u64,
) {
    let skipped = i64::from(request.start_record().unwrap_or(1)).saturating_sub(1);
    let remaining = number_of_records.saturating_sub(skipped).max(0);
    let expected = match request.maximum_records() {
        Some(maximum) => remaining.min(i64::from(maximum)),
        // server-side page size unknown; only an empty page is suspicious
        None => remaining.min(1),
    };
    if (returned as i64) < expected {
        warn!(
            target: TARGET,
            position,
            declared = number_of_records,
            expected,
            returned,
            "endpoint returned fewer records than declared"
        );
    }
}
