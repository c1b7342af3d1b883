//! Typed requests and their query-string serialization.
//!
//! Requests are immutable after construction apart from their extension
//! parameters. Extension parameters must carry the `x-` prefix. For
//! conformance testing an extension parameter named `x-malformed-<param>`
//! replaces the value of the protocol parameter `<param>`, and the value
//! `omit` removes that parameter from the query altogether.

use std::collections::BTreeMap;

use reqwest::Url;

use crate::error::{Result, SruError};
use crate::protocol::{Operation, RecordPacking, RecordXmlEscaping, SruVersion};

/// Required prefix for extension parameter names
pub const EXTRA_PARAMETER_PREFIX: &str = "x-";

/// Prefix of parameters overriding a protocol parameter's value
pub const MALFORMED_PARAMETER_PREFIX: &str = "x-malformed-";

/// Override value dropping the overridden parameter
pub const MALFORMED_OMIT: &str = "omit";

const PARAM_OPERATION: &str = "operation";
const PARAM_VERSION: &str = "version";
const PARAM_SCAN_CLAUSE: &str = "scanClause";
const PARAM_RESPONSE_POSITION: &str = "responsePosition";
const PARAM_MAXIMUM_TERMS: &str = "maximumTerms";
const PARAM_QUERY: &str = "query";
const PARAM_QUERY_TYPE: &str = "queryType";
const PARAM_START_RECORD: &str = "startRecord";
const PARAM_MAXIMUM_RECORDS: &str = "maximumRecords";
const PARAM_RECORD_SCHEMA: &str = "recordSchema";
const PARAM_RECORD_PACKING: &str = "recordPacking";
const PARAM_RESULT_SET_TTL: &str = "resultSetTTL";

/// State shared by every request kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBase {
    endpoint: Url,
    version: Option<SruVersion>,
    extra_request_data: BTreeMap<String, String>,
}

impl RequestBase {
    fn new(endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| SruError::InvalidRequest(format!("invalid endpoint '{}': {}", endpoint, e)))?;
        match endpoint.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(SruError::InvalidRequest(format!(
                    "unsupported endpoint scheme '{}'",
                    scheme
                )));
            }
        }
        Ok(Self {
            endpoint,
            version: None,
            extra_request_data: BTreeMap::new(),
        })
    }

    fn set_extra_request_data(&mut self, name: &str, value: &str) -> Result<()> {
        if !name.starts_with(EXTRA_PARAMETER_PREFIX) || name.len() == EXTRA_PARAMETER_PREFIX.len() {
            return Err(SruError::InvalidExtraParameter {
                name: name.to_string(),
                prefix: EXTRA_PARAMETER_PREFIX,
            });
        }
        self.extra_request_data
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Assemble the request URI from the protocol parameters in order.
    ///
    /// `params` lists every parameter the operation knows about; `None`
    /// values are only emitted if a malformed override supplies one.
    fn build_uri(&self, params: Vec<(&'static str, Option<String>)>) -> Url {
        let mut pairs: Vec<(String, String)> = Vec::new();
        for (name, value) in params {
            let override_key = format!("{}{}", MALFORMED_PARAMETER_PREFIX, name);
            let value = match self.extra_request_data.get(&override_key) {
                Some(forced) if forced == MALFORMED_OMIT => None,
                Some(forced) => Some(forced.clone()),
                None => value,
            };
            if let Some(value) = value {
                pairs.push((name.to_string(), value));
            }
        }
        for (name, value) in &self.extra_request_data {
            if !name.starts_with(MALFORMED_PARAMETER_PREFIX) {
                pairs.push((name.clone(), value.clone()));
            }
        }

        let mut uri = self.endpoint.clone();
        if !pairs.is_empty() {
            let mut query = uri.query_pairs_mut();
            for (name, value) in &pairs {
                query.append_pair(name, value);
            }
        }
        uri
    }

    fn effective_version(&self, default_version: SruVersion) -> SruVersion {
        self.version.unwrap_or(default_version)
    }

    fn protocol_params(
        &self,
        operation: Operation,
        version: SruVersion,
    ) -> Vec<(&'static str, Option<String>)> {
        // 2.0 infers the operation from the other parameters
        let (operation, version) = if version.is_legacy() {
            (Some(operation.as_str().to_string()), Some(version.to_string()))
        } else {
            (None, None)
        };
        vec![(PARAM_OPERATION, operation), (PARAM_VERSION, version)]
    }
}

fn escaping_param(
    version: SruVersion,
    escaping: Option<RecordXmlEscaping>,
) -> (&'static str, Option<String>) {
    (
        RecordXmlEscaping::element_name(version),
        escaping.map(|e| e.as_str().to_string()),
    )
}

macro_rules! request_base_accessors {
    ($ty:ty) => {
        impl $ty {
            pub fn endpoint(&self) -> &Url {
                &self.base.endpoint
            }

            /// Version requested explicitly, if any
            pub fn version(&self) -> Option<SruVersion> {
                self.base.version
            }

            pub fn with_version(mut self, version: SruVersion) -> Self {
                self.base.version = Some(version);
                self
            }

            /// Add an extension parameter; the name must start with `x-`
            pub fn set_extra_request_data(&mut self, name: &str, value: &str) -> Result<()> {
                self.base.set_extra_request_data(name, value)
            }

            pub fn extra_request_data(&self) -> &BTreeMap<String, String> {
                &self.base.extra_request_data
            }
        }
    };
}

/// explain request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplainRequest {
    base: RequestBase,
    record_xml_escaping: Option<RecordXmlEscaping>,
}

impl ExplainRequest {
    pub fn new(endpoint: &str) -> Result<Self> {
        Ok(Self {
            base: RequestBase::new(endpoint)?,
            record_xml_escaping: None,
        })
    }

    pub fn with_record_xml_escaping(mut self, escaping: RecordXmlEscaping) -> Self {
        self.record_xml_escaping = Some(escaping);
        self
    }

    pub fn record_xml_escaping(&self) -> Option<RecordXmlEscaping> {
        self.record_xml_escaping
    }

    pub fn make_uri(&self, default_version: SruVersion) -> Result<Url> {
        let version = self.base.effective_version(default_version);
        let mut params = self.base.protocol_params(Operation::Explain, version);
        params.push(escaping_param(version, self.record_xml_escaping));
        Ok(self.base.build_uri(params))
    }
}

request_base_accessors!(ExplainRequest);

/// scan request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    base: RequestBase,
    scan_clause: String,
    response_position: Option<u32>,
    maximum_terms: Option<u32>,
}

impl ScanRequest {
    pub fn new(endpoint: &str, scan_clause: impl Into<String>) -> Result<Self> {
        Ok(Self {
            base: RequestBase::new(endpoint)?,
            scan_clause: scan_clause.into(),
            response_position: None,
            maximum_terms: None,
        })
    }

    pub fn with_response_position(mut self, position: u32) -> Self {
        self.response_position = Some(position);
        self
    }

    pub fn with_maximum_terms(mut self, maximum: u32) -> Self {
        self.maximum_terms = Some(maximum);
        self
    }

    pub fn scan_clause(&self) -> &str {
        &self.scan_clause
    }

    pub fn response_position(&self) -> Option<u32> {
        self.response_position
    }

    pub fn maximum_terms(&self) -> Option<u32> {
        self.maximum_terms
    }

    pub fn make_uri(&self, default_version: SruVersion) -> Result<Url> {
        if self.scan_clause.trim().is_empty() {
            return Err(SruError::InvalidRequest(
                "scan request requires a non-empty scanClause".to_string(),
            ));
        }
        if self.maximum_terms == Some(0) {
            return Err(SruError::InvalidRequest(
                "maximumTerms must be greater than 0".to_string(),
            ));
        }

        let version = self.base.effective_version(default_version);
        let mut params = self.base.protocol_params(Operation::Scan, version);
        params.push((PARAM_SCAN_CLAUSE, Some(self.scan_clause.clone())));
        params.push((
            PARAM_RESPONSE_POSITION,
            self.response_position.map(|p| p.to_string()),
        ));
        params.push((PARAM_MAXIMUM_TERMS, self.maximum_terms.map(|m| m.to_string())));
        Ok(self.base.build_uri(params))
    }
}

request_base_accessors!(ScanRequest);

/// searchRetrieve request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRetrieveRequest {
    base: RequestBase,
    query: String,
    query_type: Option<String>,
    start_record: Option<u32>,
    maximum_records: Option<u32>,
    record_schema: Option<String>,
    record_xml_escaping: Option<RecordXmlEscaping>,
    record_packing: Option<RecordPacking>,
    result_set_ttl: Option<u32>,
}

impl SearchRetrieveRequest {
    pub fn new(endpoint: &str, query: impl Into<String>) -> Result<Self> {
        Ok(Self {
            base: RequestBase::new(endpoint)?,
            query: query.into(),
            query_type: None,
            start_record: None,
            maximum_records: None,
            record_schema: None,
            record_xml_escaping: None,
            record_packing: None,
            result_set_ttl: None,
        })
    }

    /// Query language (2.0 only; ignored for 1.x)
    pub fn with_query_type(mut self, query_type: impl Into<String>) -> Self {
        self.query_type = Some(query_type.into());
        self
    }

    pub fn with_start_record(mut self, start_record: u32) -> Self {
        self.start_record = Some(start_record);
        self
    }

    pub fn with_maximum_records(mut self, maximum_records: u32) -> Self {
        self.maximum_records = Some(maximum_records);
        self
    }

    pub fn with_record_schema(mut self, record_schema: impl Into<String>) -> Self {
        self.record_schema = Some(record_schema.into());
        self
    }

    pub fn with_record_xml_escaping(mut self, escaping: RecordXmlEscaping) -> Self {
        self.record_xml_escaping = Some(escaping);
        self
    }

    /// Record packing (2.0 only; ignored for 1.x)
    pub fn with_record_packing(mut self, packing: RecordPacking) -> Self {
        self.record_packing = Some(packing);
        self
    }

    pub fn with_result_set_ttl(mut self, seconds: u32) -> Self {
        self.result_set_ttl = Some(seconds);
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn query_type(&self) -> Option<&str> {
        self.query_type.as_deref()
    }

    pub fn start_record(&self) -> Option<u32> {
        self.start_record
    }

    pub fn maximum_records(&self) -> Option<u32> {
        self.maximum_records
    }

    pub fn record_schema(&self) -> Option<&str> {
        self.record_schema.as_deref()
    }

    pub fn record_xml_escaping(&self) -> Option<RecordXmlEscaping> {
        self.record_xml_escaping
    }

    pub fn record_packing(&self) -> Option<RecordPacking> {
        self.record_packing
    }

    pub fn result_set_ttl(&self) -> Option<u32> {
        self.result_set_ttl
    }

    pub fn make_uri(&self, default_version: SruVersion) -> Result<Url> {
        if self.query.trim().is_empty() {
            return Err(SruError::InvalidRequest(
                "searchRetrieve request requires a non-empty query".to_string(),
            ));
        }
        if self.start_record == Some(0) {
            return Err(SruError::InvalidRequest(
                "startRecord must be greater than 0".to_string(),
            ));
        }

        let version = self.base.effective_version(default_version);
        let mut params = self.base.protocol_params(Operation::SearchRetrieve, version);
        params.push((PARAM_QUERY, Some(self.query.clone())));
        if !version.is_legacy() {
            params.push((PARAM_QUERY_TYPE, self.query_type.clone()));
        }
        params.push((PARAM_START_RECORD, self.start_record.map(|s| s.to_string())));
        params.push((
            PARAM_MAXIMUM_RECORDS,
            self.maximum_records.map(|m| m.to_string()),
        ));
        params.push((PARAM_RECORD_SCHEMA, self.record_schema.clone()));
        params.push(escaping_param(version, self.record_xml_escaping));
        if !version.is_legacy() {
            params.push((
                PARAM_RECORD_PACKING,
                self.record_packing.map(|p| p.as_str().to_string()),
            ));
        }
        params.push((PARAM_RESULT_SET_TTL, self.result_set_ttl.map(|t| t.to_string())));
        Ok(self.base.build_uri(params))
    }
}

request_base_accessors!(SearchRetrieveRequest);

/// Any request, as scheduled by the worker pools
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SruRequest {
    Explain(ExplainRequest),
    Scan(ScanRequest),
    SearchRetrieve(SearchRetrieveRequest),
}

impl SruRequest {
    pub fn operation(&self) -> Operation {
        match self {
            SruRequest::Explain(_) => Operation::Explain,
            SruRequest::Scan(_) => Operation::Scan,
            SruRequest::SearchRetrieve(_) => Operation::SearchRetrieve,
        }
    }

    pub fn endpoint(&self) -> &Url {
        match self {
            SruRequest::Explain(r) => r.endpoint(),
            SruRequest::Scan(r) => r.endpoint(),
            SruRequest::SearchRetrieve(r) => r.endpoint(),
        }
    }

    pub fn make_uri(&self, default_version: SruVersion) -> Result<Url> {
        match self {
            SruRequest::Explain(r) => r.make_uri(default_version),
            SruRequest::Scan(r) => r.make_uri(default_version),
            SruRequest::SearchRetrieve(r) => r.make_uri(default_version),
        }
    }
}

impl From<ExplainRequest> for SruRequest {
    fn from(request: ExplainRequest) -> Self {
        SruRequest::Explain(request)
    }
}

impl From<ScanRequest> for SruRequest {
    fn from(request: ScanRequest) -> Self {
        SruRequest::Scan(request)
    }
}

impl From<SearchRetrieveRequest> for SruRequest {
    fn from(request: SearchRetrieveRequest) -> Self {
        SruRequest::SearchRetrieve(request)
    }
}
