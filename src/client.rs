//! Synchronous client and the single request/response exchange every
//! execution strategy funnels through.

use std::sync::Arc;
use std::time::Instant;

use reqwest::Url;
use tracing::debug;

use crate::config::{ClientConfig, ConfigManager, NetworkConfig};
use crate::error::{Result, SruError};
use crate::parser::ResponseParser;
use crate::record::{
    ExtraResponseDataParser, ExtraResponseDataParserRegistry, RecordDataParser,
    RecordDataParserRegistry,
};
use crate::request::{ExplainRequest, ScanRequest, SearchRetrieveRequest, SruRequest};
use crate::response::{
    ExplainResponse, ResponseStats, ScanResponse, SearchRetrieveResponse, SruResponse,
};
use crate::transport::{HttpTransport, Transport};
use crate::xml_reader::{XmlCursor, XmlReader};

const TARGET: &str = "sru_client::client";

/// Creates the transport for one client instance
pub type TransportFactory = Arc<dyn Fn(&NetworkConfig) -> Result<Box<dyn Transport>> + Send + Sync>;

/// Immutable client setup shared by every client instance of a pool.
///
/// The parser registries are frozen when the configuration is built and
/// shared read-only between threads afterwards.
#[derive(Clone)]
pub struct SruClientConfig {
    client: ClientConfig,
    record_parsers: Arc<RecordDataParserRegistry>,
    extra_parsers: Arc<ExtraResponseDataParserRegistry>,
    transport_factory: TransportFactory,
}

impl SruClientConfig {
    pub fn builder(client: ClientConfig) -> SruClientConfigBuilder {
        SruClientConfigBuilder {
            client,
            record_parsers: RecordDataParserRegistry::new(),
            extra_parsers: ExtraResponseDataParserRegistry::new(),
            transport_factory: None,
        }
    }

    pub fn client_config(&self) -> &ClientConfig {
        &self.client
    }

    pub fn record_parsers(&self) -> &RecordDataParserRegistry {
        &self.record_parsers
    }

    pub fn extra_response_data_parsers(&self) -> &ExtraResponseDataParserRegistry {
        &self.extra_parsers
    }

    pub fn is_strict(&self) -> bool {
        self.client.protocol.strict_mode
    }

    fn new_transport(&self) -> Result<Box<dyn Transport>> {
        (self.transport_factory)(&self.client.network)
    }
}

impl std::fmt::Debug for SruClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SruClientConfig")
            .field("client", &self.client)
            .field("record_parsers", &self.record_parsers)
            .field("extra_parsers", &self.extra_parsers)
            .finish_non_exhaustive()
    }
}

/// Collects parser registrations before the registries are frozen
pub struct SruClientConfigBuilder {
    client: ClientConfig,
    record_parsers: RecordDataParserRegistry,
    extra_parsers: ExtraResponseDataParserRegistry,
    transport_factory: Option<TransportFactory>,
}

impl SruClientConfigBuilder {
    /// Register a record data parser under its schema
    pub fn record_parser(mut self, parser: Arc<dyn RecordDataParser>) -> Result<Self> {
        self.record_parsers.register(parser)?;
        Ok(self)
    }

    /// Register the parser used for schemas without a registration
    pub fn wildcard_record_parser(mut self, parser: Arc<dyn RecordDataParser>) -> Result<Self> {
        self.record_parsers.register_wildcard(parser)?;
        Ok(self)
    }

    pub fn extra_response_data_parser(mut self, parser: Arc<dyn ExtraResponseDataParser>) -> Self {
        self.extra_parsers.register(parser);
        self
    }

    /// Replace the HTTP transport, e.g. with a canned one in tests
    pub fn transport_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&NetworkConfig) -> Result<Box<dyn Transport>> + Send + Sync + 'static,
    {
        self.transport_factory = Some(Arc::new(factory));
        self
    }

    pub fn build(self) -> Result<SruClientConfig> {
        ConfigManager::validate_config(&self.client)?;
        let transport_factory = match self.transport_factory {
            Some(factory) => factory,
            None => {
                let factory: TransportFactory = Arc::new(http_transport);
                factory
            }
        };
        Ok(SruClientConfig {
            client: self.client,
            record_parsers: Arc::new(self.record_parsers),
            extra_parsers: Arc::new(self.extra_parsers),
            transport_factory,
        })
    }
}

fn http_transport(network: &NetworkConfig) -> Result<Box<dyn Transport>> {
    Ok(Box::new(HttpTransport::new(network.clone())?))
}

/// Synchronous client; each call blocks for the whole exchange
pub struct SruClient {
    config: SruClientConfig,
    transport: Box<dyn Transport>,
}

impl SruClient {
    pub fn new(config: SruClientConfig) -> Result<Self> {
        let transport = config.new_transport()?;
        Ok(Self { config, transport })
    }

    pub fn config(&self) -> &SruClientConfig {
        &self.config
    }

    pub fn explain(&self, request: &ExplainRequest) -> Result<ExplainResponse> {
        let request = match request.record_xml_escaping() {
            Some(_) => request.clone(),
            None => request
                .clone()
                .with_record_xml_escaping(self.config.client.protocol.default_record_xml_escaping),
        };
        let uri = request.make_uri(self.config.client.protocol.default_version)?;
        let (mut response, stats) =
            self.exchange(uri, |parser, reader| parser.parse_explain(reader, &request))?;
        response.stats = stats;
        Ok(response)
    }

    pub fn scan(&self, request: &ScanRequest) -> Result<ScanResponse> {
        let uri = request.make_uri(self.config.client.protocol.default_version)?;
        let (mut response, stats) =
            self.exchange(uri, |parser, reader| parser.parse_scan(reader, request))?;
        response.stats = stats;
        Ok(response)
    }

    pub fn search_retrieve(&self, request: &SearchRetrieveRequest) -> Result<SearchRetrieveResponse> {
        let request = match request.record_xml_escaping() {
            Some(_) => request.clone(),
            None => request
                .clone()
                .with_record_xml_escaping(self.config.client.protocol.default_record_xml_escaping),
        };
        let uri = request.make_uri(self.config.client.protocol.default_version)?;
        let (mut response, stats) = self.exchange(uri, |parser, reader| {
            parser.parse_search_retrieve(reader, &request)
        })?;
        response.stats = stats;
        Ok(response)
    }

    /// Execute any request
    pub fn execute(&self, request: &SruRequest) -> Result<SruResponse> {
        match request {
            SruRequest::Explain(r) => self.explain(r).map(SruResponse::Explain),
            SruRequest::Scan(r) => self.scan(r).map(SruResponse::Scan),
            SruRequest::SearchRetrieve(r) => self.search_retrieve(r).map(SruResponse::SearchRetrieve),
        }
    }

    /// Execute GET on `uri` and walk the body with `parse`
    fn exchange<T, F>(&self, uri: Url, parse: F) -> Result<(T, ResponseStats)>
    where
        F: FnOnce(&ResponseParser<'_>, &mut dyn XmlCursor) -> Result<T>,
    {
        let started = Instant::now();
        debug!(target: TARGET, %uri, "executing request");

        let response = self.transport.execute(&uri)?;
        let time_wait = started.elapsed();

        match response.status {
            404 => return Err(SruError::NotFound { url: uri.to_string() }),
            status if !response.is_success() => {
                let reason = reqwest::StatusCode::from_u16(status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("Unknown");
                return Err(SruError::HttpStatus {
                    url: uri.to_string(),
                    status,
                    message: format!("HTTP {}: {}", status, reason),
                });
            }
            _ => {}
        }

        let parse_started = Instant::now();
        let mut reader = XmlReader::new(response.body, true);
        let parser = ResponseParser::new(
            self.config.is_strict(),
            &self.config.record_parsers,
            &self.config.extra_parsers,
        );
        let result = parse(&parser, &mut reader)?;

        let stats = ResponseStats {
            total_bytes: reader.byte_count(),
            time_total: started.elapsed(),
            time_wait,
            time_parse: parse_started.elapsed(),
        };
        debug!(
            target: TARGET,
            %uri,
            bytes = stats.total_bytes.unwrap_or(0),
            millis = stats.time_total.as_millis() as u64,
            "exchange complete"
        );
        Ok((result, stats))
    }
}
