//! Request construction and query-string serialization

use sru_client::request::{EXTRA_PARAMETER_PREFIX, MALFORMED_OMIT};
use sru_client::{
    ExplainRequest, Operation, RecordPacking, RecordXmlEscaping, ScanRequest,
    SearchRetrieveRequest, SruError, SruRequest, SruVersion,
};

use crate::common::test_helpers::ENDPOINT;

fn query_of(uri: &reqwest::Url) -> Vec<(String, String)> {
    uri.query_pairs()
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect()
}

fn pair(name: &str, value: &str) -> (String, String) {
    (name.to_string(), value.to_string())
}

#[test]
fn test_legacy_search_retrieve_parameter_order() {
    let request = SearchRetrieveRequest::new(ENDPOINT, "dc.title = \"moby dick\"")
        .unwrap()
        .with_start_record(11)
        .with_maximum_records(10)
        .with_record_schema("info:srw/schema/1/dc-v1.1")
        .with_record_xml_escaping(RecordXmlEscaping::Xml);

    let uri = request.make_uri(SruVersion::V1_2).unwrap();

    assert_eq!(uri.path(), "/sru");
    assert_eq!(
        query_of(&uri),
        vec![
            pair("operation", "searchRetrieve"),
            pair("version", "1.2"),
            pair("query", "dc.title = \"moby dick\""),
            pair("startRecord", "11"),
            pair("maximumRecords", "10"),
            pair("recordSchema", "info:srw/schema/1/dc-v1.1"),
            pair("recordPacking", "xml"),
        ]
    );
}

#[test]
fn test_sru2_search_retrieve_drops_operation_and_version() {
    let request = SearchRetrieveRequest::new(ENDPOINT, "cat")
        .unwrap()
        .with_query_type("cql")
        .with_record_xml_escaping(RecordXmlEscaping::String)
        .with_record_packing(RecordPacking::Packed)
        .with_result_set_ttl(120);

    let query = query_of(&request.make_uri(SruVersion::V2_0).unwrap());

    assert!(!query.iter().any(|(name, _)| name == "operation"));
    assert!(!query.iter().any(|(name, _)| name == "version"));
    assert!(query.contains(&pair("query", "cat")));
    assert!(query.contains(&pair("queryType", "cql")));
    assert!(query.contains(&pair("recordXMLEscaping", "string")));
    assert!(query.contains(&pair("recordPacking", "packed")));
    assert!(query.contains(&pair("resultSetTTL", "120")));
}

#[test]
fn test_query_type_is_not_sent_to_legacy_endpoints() {
    let request = SearchRetrieveRequest::new(ENDPOINT, "cat")
        .unwrap()
        .with_query_type("cql");
    let query = query_of(&request.make_uri(SruVersion::V1_1).unwrap());

    assert!(query.contains(&pair("version", "1.1")));
    assert!(!query.iter().any(|(name, _)| name == "queryType"));
}

#[test]
fn test_request_version_overrides_client_default() {
    let request = ScanRequest::new(ENDPOINT, "dc.title=ca")
        .unwrap()
        .with_version(SruVersion::V1_1);
    let query = query_of(&request.make_uri(SruVersion::V2_0).unwrap());

    assert_eq!(query[0], pair("operation", "scan"));
    assert_eq!(query[1], pair("version", "1.1"));
}

#[test]
fn test_scan_parameters() {
    let request = ScanRequest::new(ENDPOINT, "dc.title=ca")
        .unwrap()
        .with_response_position(1)
        .with_maximum_terms(3);
    let query = query_of(&request.make_uri(SruVersion::V1_2).unwrap());

    assert_eq!(
        query,
        vec![
            pair("operation", "scan"),
            pair("version", "1.2"),
            pair("scanClause", "dc.title=ca"),
            pair("responsePosition", "1"),
            pair("maximumTerms", "3"),
        ]
    );
}

#[test]
fn test_sru2_explain_without_parameters_has_no_query() {
    let request = ExplainRequest::new(ENDPOINT).unwrap();
    let uri = request.make_uri(SruVersion::V2_0).unwrap();
    assert_eq!(uri.query(), None);
    assert_eq!(uri.as_str(), ENDPOINT);
}

#[test]
fn test_invalid_arguments_are_rejected_before_sending() {
    let empty_query = SearchRetrieveRequest::new(ENDPOINT, "   ").unwrap();
    assert!(matches!(
        empty_query.make_uri(SruVersion::V1_2),
        Err(SruError::InvalidRequest(_))
    ));

    let zero_start = SearchRetrieveRequest::new(ENDPOINT, "cat")
        .unwrap()
        .with_start_record(0);
    assert!(matches!(
        zero_start.make_uri(SruVersion::V1_2),
        Err(SruError::InvalidRequest(_))
    ));

    let empty_clause = ScanRequest::new(ENDPOINT, "").unwrap();
    assert!(empty_clause.make_uri(SruVersion::V1_2).is_err());

    let zero_terms = ScanRequest::new(ENDPOINT, "dc.title=ca")
        .unwrap()
        .with_maximum_terms(0);
    assert!(zero_terms.make_uri(SruVersion::V1_2).is_err());
}

#[test]
fn test_endpoint_must_be_http() {
    assert!(matches!(
        ExplainRequest::new("not a url"),
        Err(SruError::InvalidRequest(_))
    ));
    assert!(matches!(
        ExplainRequest::new("ftp://sru.example.org/"),
        Err(SruError::InvalidRequest(_))
    ));
    assert!(ExplainRequest::new("https://sru.example.org/").is_ok());
}

#[test]
fn test_extension_parameters_require_prefix() {
    let mut request = SearchRetrieveRequest::new(ENDPOINT, "cat").unwrap();

    match request.set_extra_request_data("fcs-context", "a") {
        Err(SruError::InvalidExtraParameter { name, prefix }) => {
            assert_eq!(name, "fcs-context");
            assert_eq!(prefix, EXTRA_PARAMETER_PREFIX);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(request.set_extra_request_data("x-", "a").is_err());
    assert!(request.extra_request_data().is_empty());

    request.set_extra_request_data("x-fcs-context", "corpus-1").unwrap();
    let query = query_of(&request.make_uri(SruVersion::V1_2).unwrap());
    assert_eq!(query.last(), Some(&pair("x-fcs-context", "corpus-1")));
}

#[test]
fn test_malformed_overrides_replace_and_omit_parameters() {
    let mut request = SearchRetrieveRequest::new(ENDPOINT, "cat")
        .unwrap()
        .with_maximum_records(10);
    request
        .set_extra_request_data("x-malformed-version", "9.9")
        .unwrap();
    request
        .set_extra_request_data("x-malformed-maximumRecords", MALFORMED_OMIT)
        .unwrap();
    request
        .set_extra_request_data("x-malformed-startRecord", "minus-one")
        .unwrap();

    let query = query_of(&request.make_uri(SruVersion::V1_2).unwrap());

    assert!(query.contains(&pair("version", "9.9")));
    assert!(query.contains(&pair("startRecord", "minus-one")));
    assert!(!query.iter().any(|(name, _)| name == "maximumRecords"));
    assert!(!query.iter().any(|(name, _)| name.starts_with("x-malformed-")));
}

#[test]
fn test_sru_request_dispatch() {
    let explain: SruRequest = ExplainRequest::new(ENDPOINT).unwrap().into();
    let scan: SruRequest = ScanRequest::new(ENDPOINT, "dc.title=ca").unwrap().into();
    let search: SruRequest = SearchRetrieveRequest::new(ENDPOINT, "cat").unwrap().into();

    assert_eq!(explain.operation(), Operation::Explain);
    assert_eq!(scan.operation(), Operation::Scan);
    assert_eq!(search.operation(), Operation::SearchRetrieve);
    assert_eq!(search.endpoint().as_str(), ENDPOINT);

    let uri = search.make_uri(SruVersion::V1_2).unwrap();
    assert!(uri.as_str().contains("operation=searchRetrieve"));
}
