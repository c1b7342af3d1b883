//! Canned endpoint responses walked end to end through a synchronous client

use std::io::Cursor;

use sru_client::{
    DIAG_NO_RECORD_PARSER, ExplainRequest, ExtraResponseDataParserRegistry, Operation,
    RecordDataParserRegistry, RecordXmlEscaping, ResponseParser, ScanRequest,
    SearchRetrieveRequest, SruClient, SruError, SruVersion, WhereInList, XmlError, XmlReader,
};

use crate::common::mocks::{DC_SCHEMA, DcRecord, MockHttpEndpoint, Timing};
use crate::common::test_helpers::{
    ENDPOINT, TestFixtures, client_config, lenient_config, strict_config,
};

fn client_serving(operation: Operation, body: Vec<u8>, strict: bool) -> SruClient {
    let endpoint = MockHttpEndpoint::new();
    endpoint.add_success_response(operation, body);
    let config = if strict { strict_config() } else { lenient_config() };
    SruClient::new(client_config(&endpoint, config)).unwrap()
}

fn dc(record: &sru_client::Record) -> &DcRecord {
    record
        .record_data
        .downcast_ref::<DcRecord>()
        .expect("record should hold Dublin Core data")
}

#[test]
fn test_legacy_search_retrieve_round_trip() {
    let fixtures = TestFixtures::new();
    let body = fixtures.search_legacy();
    let body_len = body.len() as u64;
    let client = client_serving(Operation::SearchRetrieve, body, true);

    let request = SearchRetrieveRequest::new(ENDPOINT, "cat").unwrap();
    let response = client.search_retrieve(&request).unwrap();

    assert_eq!(response.version, SruVersion::V1_2);
    assert_eq!(response.number_of_records, Some(3));
    assert_eq!(response.result_set_id.as_deref(), Some("rs-42"));
    assert_eq!(response.result_set_idle_time, Some(300));
    assert_eq!(response.records_count(), 2);
    assert_eq!(response.next_record_position, Some(3));
    assert!(response.has_more_records());
    assert!(!response.has_diagnostics());

    let first = &response.records[0];
    assert_eq!(first.record_schema, DC_SCHEMA);
    assert_eq!(first.record_identifier.as_deref(), Some("urn:example:1"));
    assert_eq!(first.record_position, Some(1));
    assert_eq!(dc(first).title.as_deref(), Some("Moby Dick"));
    assert_eq!(dc(first).creator.as_deref(), Some("Herman Melville"));

    let second = &response.records[1];
    assert_eq!(second.record_identifier, None);
    assert_eq!(dc(second).title.as_deref(), Some("The Cat in the Hat"));

    // the unknown block is skipped, the timing block parsed
    assert_eq!(response.extra_response_data.len(), 1);
    let timing = response.extra_response_data[0]
        .downcast_ref::<Timing>()
        .unwrap();
    assert_eq!(timing.unit.as_deref(), Some("ms"));
    assert_eq!(timing.value, 17);

    // the applied default escaping is visible on the echoed request
    assert_eq!(
        response.request().record_xml_escaping(),
        Some(RecordXmlEscaping::Xml)
    );
    assert_eq!(response.stats.total_bytes, Some(body_len));
}

#[test]
fn test_sru2_string_escaped_records() {
    let fixtures = TestFixtures::new();
    let client = client_serving(Operation::SearchRetrieve, fixtures.search_sru2_string(), true);

    let request = SearchRetrieveRequest::new(ENDPOINT, "fish")
        .unwrap()
        .with_version(SruVersion::V2_0)
        .with_record_xml_escaping(RecordXmlEscaping::String);
    let response = client.search_retrieve(&request).unwrap();

    assert_eq!(response.version, SruVersion::V2_0);
    assert_eq!(response.number_of_records, Some(1));
    assert_eq!(response.result_set_idle_time, Some(60));
    assert_eq!(
        response.result_count_precision.as_deref(),
        Some("info:srw/vocabulary/resultCountPrecision/1/exact")
    );

    let record = &response.records[0];
    assert_eq!(dc(record).title.as_deref(), Some("Fish & Chips"));
    assert_eq!(dc(record).creator.as_deref(), Some("Anonymous"));

    // non-fatal diagnostics after the records
    assert_eq!(response.diagnostics().len(), 1);
    let diagnostic = &response.diagnostics()[0];
    assert_eq!(diagnostic.uri, "info:srw/diagnostic/1/67");
    assert_eq!(diagnostic.details.as_deref(), Some("dc.subject"));
    assert!(!diagnostic.is_surrogate());
}

#[test]
fn test_escaping_mismatch_is_strict_only() {
    let fixtures = TestFixtures::new();
    // the client asks for the configured default, xml, but gets strings
    let request = SearchRetrieveRequest::new(ENDPOINT, "fish").unwrap();

    let lenient = client_serving(Operation::SearchRetrieve, fixtures.search_sru2_string(), false);
    let response = lenient.search_retrieve(&request).unwrap();
    assert_eq!(dc(&response.records[0]).title.as_deref(), Some("Fish & Chips"));

    let strict = client_serving(Operation::SearchRetrieve, fixtures.search_sru2_string(), true);
    match strict.search_retrieve(&request) {
        Err(SruError::Xml(XmlError::ProtocolViolation { details, .. })) => {
            assert!(details.contains("record escaping"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_unregistered_schema_yields_surrogate_and_walk_continues() {
    let fixtures = TestFixtures::new();
    let client = client_serving(Operation::SearchRetrieve, fixtures.search_unknown_schema(), false);

    let request = SearchRetrieveRequest::new(ENDPOINT, "mystery").unwrap();
    let response = client.search_retrieve(&request).unwrap();
    assert_eq!(response.records_count(), 2);

    let unknown = &response.records[0];
    assert!(unknown.is_surrogate());
    let synthesized = unknown.surrogate_diagnostic().unwrap();
    assert_eq!(synthesized.uri, DIAG_NO_RECORD_PARSER);
    assert_eq!(synthesized.details.as_deref(), Some("info:example/schema/unknown"));
    assert!(synthesized.is_surrogate());
    assert!(unknown.record_data.is_transient());

    // a diagnostic record sent by the endpoint itself
    let sent = response.records[1].surrogate_diagnostic().unwrap();
    assert_eq!(sent.uri, "info:srw/diagnostic/1/64");
    assert_eq!(sent.message.as_deref(), Some("Record temporarily unavailable"));
    assert!(!sent.is_surrogate());
    assert_eq!(response.records[1].record_position, Some(2));
}

#[test]
fn test_zero_count_with_records_is_tolerated_only_when_lenient() {
    let fixtures = TestFixtures::new();
    let request = SearchRetrieveRequest::new(ENDPOINT, "stray").unwrap();

    let lenient = client_serving(
        Operation::SearchRetrieve,
        fixtures.search_zero_count_records(),
        false,
    );
    let response = lenient.search_retrieve(&request).unwrap();
    assert_eq!(response.number_of_records, Some(0));
    assert_eq!(response.records_count(), 1);
    assert_eq!(dc(&response.records[0]).creator, None);

    let strict = client_serving(
        Operation::SearchRetrieve,
        fixtures.search_zero_count_records(),
        true,
    );
    assert!(matches!(
        strict.search_retrieve(&request),
        Err(SruError::Xml(XmlError::ProtocolViolation { .. }))
    ));
}

#[test]
fn test_record_count_mismatch_is_never_fatal() {
    // intentional legacy behaviour: a short page is only logged and a
    // surplus page is not checked at all, even in strict mode
    let fixtures = TestFixtures::new();
    let client = client_serving(Operation::SearchRetrieve, fixtures.search_legacy(), true);

    // 3 declared, page of 10 requested, 2 returned
    let short_page = SearchRetrieveRequest::new(ENDPOINT, "cat")
        .unwrap()
        .with_start_record(1)
        .with_maximum_records(10);
    let response = client.search_retrieve(&short_page).unwrap();
    assert_eq!(response.number_of_records, Some(3));
    assert_eq!(response.records_count(), 2);
    assert_eq!(response.next_record_position, Some(3));

    // page of 1 requested, 2 returned
    let surplus = SearchRetrieveRequest::new(ENDPOINT, "cat")
        .unwrap()
        .with_maximum_records(1);
    let response = client.search_retrieve(&surplus).unwrap();
    assert_eq!(response.records_count(), 2);
}

#[test]
fn test_fatal_diagnostics_replace_the_payload() {
    let fixtures = TestFixtures::new();
    let client = client_serving(
        Operation::SearchRetrieve,
        fixtures.search_fatal_diagnostics(),
        true,
    );

    let request = SearchRetrieveRequest::new(ENDPOINT, "(cat")
        .unwrap()
        .with_version(SruVersion::V2_0);
    let response = client.search_retrieve(&request).unwrap();

    assert_eq!(response.number_of_records, None);
    assert!(response.records.is_empty());
    assert!(response.has_diagnostics());
    assert_eq!(response.diagnostics()[0].uri, "info:srw/diagnostic/1/10");
    assert_eq!(
        response.diagnostics()[0].message.as_deref(),
        Some("Query syntax error")
    );
}

#[test]
fn test_legacy_scan_terms() {
    let fixtures = TestFixtures::new();
    let client = client_serving(Operation::Scan, fixtures.scan_legacy(), true);

    let request = ScanRequest::new(ENDPOINT, "dc.title=ca").unwrap();
    let response = client.scan(&request).unwrap();

    assert_eq!(response.terms_count(), 3);
    let values: Vec<&str> = response.terms.iter().map(|t| t.value.as_str()).collect();
    assert_eq!(values, vec!["cat", "car", "care"]);

    assert_eq!(response.terms[0].number_of_records, Some(12));
    assert_eq!(response.terms[0].display_term.as_deref(), Some("Cat"));
    assert_eq!(response.terms[0].where_in_list, Some(WhereInList::First));
    assert_eq!(response.terms[1].where_in_list, Some(WhereInList::Inner));
    assert_eq!(response.terms[2].number_of_records, None);
    assert_eq!(response.terms[2].where_in_list, Some(WhereInList::Last));
}

#[test]
fn test_sru2_scan_uses_scan_namespace() {
    let fixtures = TestFixtures::new();
    let client = client_serving(Operation::Scan, fixtures.scan_sru2(), true);

    let request = ScanRequest::new(ENDPOINT, "dc.title=zebra")
        .unwrap()
        .with_version(SruVersion::V2_0);
    let response = client.scan(&request).unwrap();

    assert_eq!(response.version, SruVersion::V2_0);
    assert_eq!(response.terms[0].value, "zebra");
    assert_eq!(response.terms[0].where_in_list, Some(WhereInList::Only));
}

#[test]
fn test_explain_without_explain_parser() {
    let fixtures = TestFixtures::new();
    let client = client_serving(Operation::Explain, fixtures.explain_legacy(), true);

    let response = client.explain(&ExplainRequest::new(ENDPOINT).unwrap()).unwrap();

    let record = response.record.as_ref().unwrap();
    assert_eq!(record.record_schema, "http://explain.z3950.org/dtd/2.0/");
    assert_eq!(record.record_position, Some(1));
    assert_eq!(
        record.surrogate_diagnostic().map(|d| d.uri.as_str()),
        Some(DIAG_NO_RECORD_PARSER)
    );
}

#[test]
fn test_unknown_root_namespace_is_fatal() {
    let body = br#"<searchRetrieveResponse xmlns="urn:not-sru"><version>1.2</version></searchRetrieveResponse>"#;
    let client = client_serving(Operation::SearchRetrieve, body.to_vec(), false);
    let request = SearchRetrieveRequest::new(ENDPOINT, "cat").unwrap();

    match client.search_retrieve(&request) {
        Err(SruError::Xml(XmlError::UnknownNamespace { namespace, position })) => {
            assert_eq!(namespace, "urn:not-sru");
            assert_eq!(position, 0);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_grammar_errors_are_fatal_even_when_lenient() {
    let body = br#"<scanResponse xmlns="http://www.loc.gov/zing/srw/"><version>1.2</version><terms><term><value>a</value><whereInList>middle</whereInList></term></terms></scanResponse>"#;
    let client = client_serving(Operation::Scan, body.to_vec(), false);
    let request = ScanRequest::new(ENDPOINT, "dc.title=a").unwrap();

    match client.scan(&request) {
        Err(SruError::Xml(XmlError::InvalidEnumValue { name, value, .. })) => {
            assert_eq!(name, "whereInList");
            assert_eq!(value, "middle");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_truncated_body_reports_position() {
    let fixtures = TestFixtures::new();
    let mut body = fixtures.search_legacy();
    body.truncate(body.len() / 2);
    let client = client_serving(Operation::SearchRetrieve, body, false);
    let request = SearchRetrieveRequest::new(ENDPOINT, "cat").unwrap();

    match client.search_retrieve(&request) {
        Err(SruError::Xml(error)) => assert!(error.position() > 0),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_walker_over_metered_stream() {
    let fixtures = TestFixtures::new();
    let body = fixtures.scan_legacy();
    let len = body.len() as u64;

    let records = RecordDataParserRegistry::new();
    let extra = ExtraResponseDataParserRegistry::new();
    let parser = ResponseParser::new(true, &records, &extra);
    let request = ScanRequest::new(ENDPOINT, "dc.title=ca").unwrap();

    let mut reader = XmlReader::new(Cursor::new(body), true);
    let response = parser.parse_scan(&mut reader, &request).unwrap();

    assert_eq!(response.terms_count(), 3);
    assert_eq!(reader.byte_count(), Some(len));
}
