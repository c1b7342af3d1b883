//! Synchronous client against expectation-driven transports

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use mockall::predicate::always;
use reqwest::Url;

use sru_client::{
    ClientConfig, ExplainRequest, GenericRecordData, GenericRecordDataParser, ScanRequest,
    SearchRetrieveRequest, SruClient, SruClientConfig, SruError, SruRequest, SruResponse,
    SruVersion, Transport, TransportResponse, XmlError,
};

use crate::common::mocks::{
    DcRecordParser, EmptyRecordParser, MockEndpoint, MockFailureType, MockHttpEndpoint,
};
use crate::common::test_helpers::{
    ENDPOINT, TestFixtures, client_config, lenient_config, strict_config,
};

fn ok_body(body: Vec<u8>) -> sru_client::Result<TransportResponse> {
    Ok(TransportResponse::new(200, Box::new(Cursor::new(body))))
}

/// Hand `mock` to the first client built from the returned configuration
fn config_with_mock(mock: MockEndpoint, config: ClientConfig) -> SruClientConfig {
    let slot = Mutex::new(Some(mock));
    SruClientConfig::builder(config)
        .record_parser(Arc::new(DcRecordParser))
        .unwrap()
        .transport_factory(move |_| {
            let mock = slot
                .lock()
                .unwrap()
                .take()
                .expect("mock transport handed out twice");
            let transport: Box<dyn Transport> = Box::new(mock);
            Ok(transport)
        })
        .build()
        .unwrap()
}

#[test]
fn test_exact_request_uri_is_sent_once() {
    let body = TestFixtures::new().search_legacy();
    let mut mock = MockEndpoint::new();
    mock.expect_execute()
        .withf(|uri: &Url| {
            uri.as_str()
                == "http://sru.example.org/sru?operation=searchRetrieve&version=1.2&query=cat&startRecord=1&maximumRecords=2&recordPacking=xml"
        })
        .times(1)
        .returning(move |_| ok_body(body.clone()));

    let client = SruClient::new(config_with_mock(mock, lenient_config())).unwrap();
    let request = SearchRetrieveRequest::new(ENDPOINT, "cat")
        .unwrap()
        .with_start_record(1)
        .with_maximum_records(2);
    let response = client.search_retrieve(&request).unwrap();

    assert_eq!(response.records_count(), 2);
}

#[test]
fn test_transport_errors_propagate_unchanged() {
    let mut mock = MockEndpoint::new();
    mock.expect_execute().with(always()).times(1).returning(|uri| {
        Err(SruError::Timeout {
            url: uri.to_string(),
            timeout_seconds: 30,
        })
    });

    let client = SruClient::new(config_with_mock(mock, lenient_config())).unwrap();
    let request = ScanRequest::new(ENDPOINT, "dc.title=ca").unwrap();
    match client.scan(&request) {
        Err(SruError::Timeout { url, timeout_seconds }) => {
            assert!(url.contains("scanClause=dc.title%3Dca"));
            assert_eq!(timeout_seconds, 30);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_missing_escaping_element_is_an_etiquette_violation() {
    let body = br#"<explainResponse xmlns="http://www.loc.gov/zing/srw/">
  <version>1.2</version>
  <record>
    <recordSchema>info:srw/schema/1/dc-v1.1</recordSchema>
    <recordData><dc xmlns="http://www.openarchives.org/OAI/2.0/oai_dc/"/></recordData>
  </record>
</explainResponse>"#
        .to_vec();

    let lenient_body = body.clone();
    let mut lenient_mock = MockEndpoint::new();
    lenient_mock
        .expect_execute()
        .returning(move |_| ok_body(lenient_body.clone()));
    let client = SruClient::new(config_with_mock(lenient_mock, lenient_config())).unwrap();
    let response = client.explain(&ExplainRequest::new(ENDPOINT).unwrap()).unwrap();
    assert!(response.record.is_some());

    let mut strict_mock = MockEndpoint::new();
    strict_mock
        .expect_execute()
        .returning(move |_| ok_body(body.clone()));
    let client = SruClient::new(config_with_mock(strict_mock, strict_config())).unwrap();
    assert!(matches!(
        client.explain(&ExplainRequest::new(ENDPOINT).unwrap()),
        Err(SruError::Xml(XmlError::ProtocolViolation { .. }))
    ));
}

#[test]
fn test_http_status_mapping() {
    let endpoint = MockHttpEndpoint::new();
    endpoint.add_status_response(sru_client::Operation::SearchRetrieve, 500);
    let client = SruClient::new(client_config(&endpoint, lenient_config())).unwrap();

    let request = SearchRetrieveRequest::new(ENDPOINT, "cat").unwrap();
    match client.search_retrieve(&request) {
        Err(SruError::HttpStatus { status, message, url }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "HTTP 500: Internal Server Error");
            assert!(url.starts_with(ENDPOINT));
        }
        other => panic!("unexpected result: {other:?}"),
    }

    // nothing registered for scan: the canned endpoint answers 404
    let request = ScanRequest::new(ENDPOINT, "dc.title=ca").unwrap();
    assert!(matches!(
        client.scan(&request),
        Err(SruError::NotFound { .. })
    ));
    assert_eq!(endpoint.get_request_count(), 2);
}

#[test]
fn test_timeout_from_canned_endpoint() {
    let endpoint = MockHttpEndpoint::new();
    endpoint.add_failure(sru_client::Operation::Explain, MockFailureType::Timeout);
    let client = SruClient::new(client_config(&endpoint, lenient_config())).unwrap();

    assert!(matches!(
        client.explain(&ExplainRequest::new(ENDPOINT).unwrap()),
        Err(SruError::Timeout { .. })
    ));
}

#[test]
fn test_execute_dispatches_on_request_kind() {
    let fixtures = TestFixtures::new();
    let endpoint = MockHttpEndpoint::new();
    endpoint.add_success_response(sru_client::Operation::Scan, fixtures.scan_legacy());
    endpoint.add_success_response(sru_client::Operation::SearchRetrieve, fixtures.search_legacy());
    let client = SruClient::new(client_config(&endpoint, lenient_config())).unwrap();

    let scan: SruRequest = ScanRequest::new(ENDPOINT, "dc.title=ca").unwrap().into();
    match client.execute(&scan).unwrap() {
        SruResponse::Scan(response) => assert_eq!(response.terms_count(), 3),
        other => panic!("unexpected response: {other:?}"),
    }

    let search: SruRequest = SearchRetrieveRequest::new(ENDPOINT, "cat").unwrap().into();
    let response = client.execute(&search).unwrap();
    assert!(matches!(response.request(), SruRequest::SearchRetrieve(_)));
    assert!(response.diagnostics().is_empty());
    assert!(response.stats().total_bytes.is_some());

    let urls: Vec<String> = endpoint.get_requests().into_iter().map(|r| r.url).collect();
    assert!(urls[0].contains("operation=scan"));
    assert!(urls[1].contains("operation=searchRetrieve"));
}

#[test]
fn test_default_version_from_configuration() {
    let fixtures = TestFixtures::new();
    let endpoint = MockHttpEndpoint::new();
    endpoint.add_success_response(sru_client::Operation::SearchRetrieve, fixtures.search_fatal_diagnostics());

    let mut config = lenient_config();
    config.protocol.default_version = SruVersion::V2_0;
    let client = SruClient::new(client_config(&endpoint, config)).unwrap();

    let response = client
        .search_retrieve(&SearchRetrieveRequest::new(ENDPOINT, "(cat").unwrap())
        .unwrap();
    assert_eq!(response.version, SruVersion::V2_0);

    let url = endpoint.last_url().unwrap();
    assert!(!url.contains("operation="));
    assert!(url.contains("recordXMLEscaping=xml"));
}

#[test]
fn test_parser_registration_rules() {
    let duplicate = SruClientConfig::builder(lenient_config())
        .record_parser(Arc::new(DcRecordParser))
        .unwrap()
        .record_parser(Arc::new(DcRecordParser));
    assert!(matches!(
        duplicate,
        Err(SruError::DuplicateRecordParser { .. })
    ));

    let config = SruClientConfig::builder(lenient_config())
        .record_parser(Arc::new(EmptyRecordParser("urn:empty")))
        .unwrap()
        .wildcard_record_parser(Arc::new(GenericRecordDataParser::default()))
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(config.record_parsers().len(), 2);
    assert!(config.record_parsers().find("urn:anything").is_some());
    assert!(config.extra_response_data_parsers().is_empty());
    assert!(!config.is_strict());
}

#[test]
fn test_wildcard_and_empty_parsers_end_to_end() {
    let body = br#"<searchRetrieveResponse xmlns="http://www.loc.gov/zing/srw/">
  <version>1.2</version>
  <numberOfRecords>2</numberOfRecords>
  <records>
    <record>
      <recordSchema>urn:empty</recordSchema>
      <recordPacking>xml</recordPacking>
      <recordData><nothing xmlns="urn:empty">ignored</nothing></recordData>
    </record>
    <record>
      <recordSchema>urn:other</recordSchema>
      <recordPacking>xml</recordPacking>
      <recordData><item xmlns="urn:other"><a>alpha</a> <b>beta</b></item></recordData>
    </record>
  </records>
</searchRetrieveResponse>"#
        .to_vec();

    let mut mock = MockEndpoint::new();
    mock.expect_execute().returning(move |_| ok_body(body.clone()));
    let slot = Mutex::new(Some(mock));
    let config = SruClientConfig::builder(lenient_config())
        .record_parser(Arc::new(EmptyRecordParser("urn:empty")))
        .unwrap()
        .wildcard_record_parser(Arc::new(GenericRecordDataParser::default()))
        .unwrap()
        .transport_factory(move |_| {
            let transport: Box<dyn Transport> =
                Box::new(slot.lock().unwrap().take().expect("single client"));
            Ok(transport)
        })
        .build()
        .unwrap();
    let client = SruClient::new(config).unwrap();

    let response = client
        .search_retrieve(&SearchRetrieveRequest::new(ENDPOINT, "any").unwrap())
        .unwrap();

    let empty = response.records[0].surrogate_diagnostic().unwrap();
    assert_eq!(empty.uri, sru_client::DIAG_RECORD_PARSER_NULL);
    assert_eq!(empty.details.as_deref(), Some("urn:empty"));

    let generic = response.records[1]
        .record_data
        .downcast_ref::<GenericRecordData>()
        .unwrap();
    assert_eq!(generic.root_name, "item");
    assert_eq!(generic.root_namespace, "urn:other");
    assert_eq!(generic.text, "alpha beta");
}
