//! # sru-client Library
//!
//! A client for the SRU search/retrieve protocol: typed explain, scan and
//! searchRetrieve requests, a streaming response walker tolerant of the
//! legacy and 2.0 namespace profiles, pluggable record data parsers, and
//! synchronous, queue-backed and thread-pool execution strategies.

pub mod client;
pub mod config;
pub mod error;
pub mod namespace;
pub mod parser;
pub mod protocol;
pub mod queued;
pub mod record;
pub mod request;
pub mod response;
pub mod subtree;
mod task;
pub mod threaded;
pub mod transport;
pub mod xml_reader;

pub use client::{SruClient, SruClientConfig, SruClientConfigBuilder, TransportFactory};
pub use config::{
    ClientConfig, ConfigError, ConfigManager, EnvProvider, NetworkConfig, PoolConfig,
    ProtocolConfig, SystemEnvProvider,
};
pub use error::{Result, SruError, XmlError, XmlResult};
pub use namespace::NamespaceProfile;
pub use parser::ResponseParser;
pub use protocol::{
    DIAG_NO_RECORD_PARSER, DIAG_RECORD_PARSER_NULL, Diagnostic, Operation,
    RECORD_SCHEMA_DIAGNOSTIC, RecordPacking, RecordXmlEscaping, SruVersion, WhereInList,
};
pub use queued::{ErrorCallback, QueuedClient, RunState};
pub use record::{
    ExtraResponseData, ExtraResponseDataParser, ExtraResponseDataParserRegistry,
    GenericRecordData, GenericRecordDataParser, RecordData, RecordDataParser,
    RecordDataParserRegistry, SurrogateDiagnostic,
};
pub use request::{ExplainRequest, ScanRequest, SearchRetrieveRequest, SruRequest};
pub use response::{
    ExplainResponse, Record, ResponseStats, ScanResponse, SearchRetrieveResponse, SruResponse,
    Term,
};
pub use subtree::SubtreeReader;
pub use threaded::{CompletionHandle, SruCallback, ThreadedClient};
pub use transport::{HttpTransport, Transport, TransportResponse};
pub use xml_reader::{Attribute, StartTag, Token, XmlCursor, XmlReader};
