//! Response model. A response is assembled once, at the end of a successful
//! walk, and handed to the caller whole.

use std::time::Duration;

use crate::protocol::{Diagnostic, SruVersion, WhereInList};
use crate::record::{ExtraResponseData, RecordData, SurrogateDiagnostic};
use crate::request::{ExplainRequest, ScanRequest, SearchRetrieveRequest, SruRequest};

/// Byte and latency counters for one exchange
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseStats {
    /// Bytes read from the transport, when metering was enabled
    pub total_bytes: Option<u64>,
    /// Whole exchange, from URI construction to the finished response
    pub time_total: Duration,
    /// Until the transport returned status and headers
    pub time_wait: Duration,
    /// Spent walking the response body
    pub time_parse: Duration,
}

/// One record of a searchRetrieve or explain response
#[derive(Debug)]
pub struct Record {
    pub record_schema: String,
    pub record_data: Box<dyn RecordData>,
    pub record_identifier: Option<String>,
    pub record_position: Option<i64>,
}

impl Record {
    /// The diagnostic carried instead of data, if this is a surrogate record
    pub fn surrogate_diagnostic(&self) -> Option<&Diagnostic> {
        self.record_data
            .downcast_ref::<SurrogateDiagnostic>()
            .map(|s| &s.diagnostic)
    }

    pub fn is_surrogate(&self) -> bool {
        self.surrogate_diagnostic().is_some()
    }
}

/// One scan term
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub value: String,
    pub number_of_records: Option<i64>,
    pub display_term: Option<String>,
    pub where_in_list: Option<WhereInList>,
}

macro_rules! response_common {
    ($ty:ty, $request:ty) => {
        impl $ty {
            pub fn request(&self) -> &$request {
                &self.request
            }

            /// Check if the envelope carried a (possibly empty) diagnostics block
            pub fn has_diagnostics(&self) -> bool {
                self.diagnostics.is_some()
            }

            /// Envelope diagnostics, empty when none were sent
            pub fn diagnostics(&self) -> &[Diagnostic] {
                self.diagnostics.as_deref().unwrap_or(&[])
            }

            pub fn has_extra_response_data(&self) -> bool {
                !self.extra_response_data.is_empty()
            }
        }
    };
}

#[derive(Debug)]
pub struct ExplainResponse {
    pub request: ExplainRequest,
    pub version: SruVersion,
    pub diagnostics: Option<Vec<Diagnostic>>,
    pub extra_response_data: Vec<Box<dyn ExtraResponseData>>,
    pub stats: ResponseStats,
    pub record: Option<Record>,
}

response_common!(ExplainResponse, ExplainRequest);

#[derive(Debug)]
pub struct ScanResponse {
    pub request: ScanRequest,
    pub version: SruVersion,
    pub diagnostics: Option<Vec<Diagnostic>>,
    pub extra_response_data: Vec<Box<dyn ExtraResponseData>>,
    pub stats: ResponseStats,
    pub terms: Vec<Term>,
}

response_common!(ScanResponse, ScanRequest);

impl ScanResponse {
    pub fn terms_count(&self) -> usize {
        self.terms.len()
    }
}

#[derive(Debug)]
pub struct SearchRetrieveResponse {
    pub request: SearchRetrieveRequest,
    pub version: SruVersion,
    pub diagnostics: Option<Vec<Diagnostic>>,
    pub extra_response_data: Vec<Box<dyn ExtraResponseData>>,
    pub stats: ResponseStats,
    /// Total hits; `None` when a fatal diagnostic replaced the payload
    pub number_of_records: Option<i64>,
    pub result_set_id: Option<String>,
    pub result_set_idle_time: Option<i64>,
    /// 2.0 `resultCountPrecision`
    pub result_count_precision: Option<String>,
    pub records: Vec<Record>,
    pub next_record_position: Option<i64>,
}

response_common!(SearchRetrieveResponse, SearchRetrieveRequest);

impl SearchRetrieveResponse {
    pub fn records_count(&self) -> usize {
        self.records.len()
    }

    /// Check if the server announced further records
    pub fn has_more_records(&self) -> bool {
        self.next_record_position.is_some()
    }
}

/// Any response, as produced by [`crate::client::SruClient::execute`]
#[derive(Debug)]
pub enum SruResponse {
    Explain(ExplainResponse),
    Scan(ScanResponse),
    SearchRetrieve(SearchRetrieveResponse),
}

impl SruResponse {
    pub fn request(&self) -> SruRequest {
        match self {
            SruResponse::Explain(r) => SruRequest::Explain(r.request.clone()),
            SruResponse::Scan(r) => SruRequest::Scan(r.request.clone()),
            SruResponse::SearchRetrieve(r) => SruRequest::SearchRetrieve(r.request.clone()),
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            SruResponse::Explain(r) => r.diagnostics(),
            SruResponse::Scan(r) => r.diagnostics(),
            SruResponse::SearchRetrieve(r) => r.diagnostics(),
        }
    }

    pub fn stats(&self) -> &ResponseStats {
        match self {
            SruResponse::Explain(r) => &r.stats,
            SruResponse::Scan(r) => &r.stats,
            SruResponse::SearchRetrieve(r) => &r.stats,
        }
    }

}
