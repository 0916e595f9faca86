//! Alma client tests against a mock HTTP server

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use almapipo_common::types::RecordId;
use almapipo_core::config::AlmaConfig;
use almapipo_core::rest::{AlmaClient, ApiError, RecordClient};

const BIB: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?><bib><mms_id>991</mms_id></bib>";

fn client_for(server: &MockServer, timeout_secs: u64) -> AlmaClient {
    let config = AlmaConfig {
        base_url: server.uri(),
        api_key: "secret".to_string(),
        timeout_secs,
        institutional_suffix: None,
    };
    AlmaClient::new(&config).unwrap()
}

fn id(s: &str) -> RecordId {
    s.parse().unwrap()
}

#[tokio::test]
async fn test_retrieve_sends_auth_and_xml_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bibs/991"))
        .and(header("authorization", "apikey secret"))
        .and(header("accept", "application/xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BIB))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 5);
    assert_eq!(client.retrieve("/bibs/991").await.unwrap(), BIB);
}

#[tokio::test]
async fn test_unexpected_status_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bibs/991"))
        .respond_with(ResponseTemplate::new(400).set_body_string("<web_service_result/>"))
        .mount(&server)
        .await;
    // POST answers 200 where a 200 is expected
    Mock::given(method("POST"))
        .and(path("/bibs/991/holdings"))
        .respond_with(ResponseTemplate::new(201).set_body_string(BIB))
        .mount(&server)
        .await;

    let client = client_for(&server, 5);

    match client.retrieve("/bibs/991").await {
        Err(ApiError::Status { code, expected, body }) => {
            assert_eq!(code, 400);
            assert_eq!(expected, 200);
            assert_eq!(body, "<web_service_result/>");
        },
        other => panic!("expected status error, got {other:?}"),
    }

    let created = client.create("/bibs/991/holdings", "<holding/>").await;
    assert!(matches!(created, Err(ApiError::Status { code: 201, .. })));
}

#[tokio::test]
async fn test_update_sends_payload() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/bibs/991"))
        .and(body_string("<bib><note>x</note></bib>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BIB))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 5);
    let response = client
        .update("/bibs/991", "<bib><note>x</note></bib>")
        .await
        .unwrap();
    assert_eq!(response, BIB);
}

#[tokio::test]
async fn test_empty_body_rejected_except_for_delete() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bibs/991"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/bibs/991"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 5);
    assert!(matches!(
        client.retrieve("/bibs/991").await,
        Err(ApiError::EmptyResponse)
    ));
    assert_eq!(client.delete("/bibs/991").await.unwrap(), "");
}

#[tokio::test]
async fn test_set_members_paged() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/conf/sets/777/members"))
        .and(query_param("limit", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<?xml version="1.0"?><members total_record_count="102"><member><id>1</id></member></members>"#),
        )
        .mount(&server)
        .await;

    let first_page: String = (0..100)
        .map(|i| format!(r#"<member link="{base}/bibs/99{i}/holdings/22{i}"><id>22{i}</id></member>"#))
        .collect();
    Mock::given(method("GET"))
        .and(path("/conf/sets/777/members"))
        .and(query_param("limit", "100"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<?xml version="1.0"?><members total_record_count="102">{first_page}</members>"#
        )))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/conf/sets/777/members"))
        .and(query_param("limit", "100"))
        .and(query_param("offset", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<?xml version="1.0"?><members total_record_count="102"><member link="{base}/users/jdoe?view=brief"><id>jdoe</id></member><member><id>995</id></member></members>"#
        )))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 5);
    let members = client.set_members("777").await.unwrap();

    assert_eq!(members.len(), 102);
    assert_eq!(members[0], id("990,220"));
    assert_eq!(members[99], id("9999,2299"));
    assert_eq!(members[100], id("jdoe"));
    assert_eq!(members[101], id("995"));
}

#[tokio::test]
async fn test_set_members_with_oversized_count() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/conf/sets/77/members"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<?xml version="1.0"?><members total_record_count="18446744073709551615"><member><id>991</id></member></members>"#,
        ))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/conf/sets/77/members"))
        .and(query_param("limit", "100"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<?xml version="1.0"?><members total_record_count="18446744073709551615"><member><id>991</id></member><member><id>992</id></member></members>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    // Paging stops at the first empty page
    Mock::given(method("GET"))
        .and(path("/conf/sets/77/members"))
        .and(query_param("limit", "100"))
        .and(query_param("offset", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<?xml version="1.0"?><members total_record_count="18446744073709551615"/>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 5);
    let members = client.set_members("77").await.unwrap();

    assert_eq!(members, vec![id("991"), id("992")]);
}

#[tokio::test]
async fn test_set_members_with_foreign_link_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/conf/sets/1/members"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<?xml version="1.0"?><members total_record_count="1"><member link="https://elsewhere.example/bibs/991"><id>991</id></member></members>"#,
        ))
        .mount(&server)
        .await;

    let client = client_for(&server, 5);
    assert!(matches!(
        client.set_members("1").await,
        Err(ApiError::InvalidResponse(_))
    ));
}

#[tokio::test]
async fn test_empty_set_has_no_members() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/conf/sets/2/members"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<?xml version="1.0"?><members total_record_count="0"/>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 5);
    assert!(client.set_members("2").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_calls_remaining_reads_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bibs/test"))
        .respond_with(ResponseTemplate::new(200).insert_header("X-Exl-Api-Remaining", "149823"))
        .mount(&server)
        .await;

    let client = client_for(&server, 5);
    assert_eq!(client.calls_remaining().await.unwrap(), 149_823);
}

#[tokio::test]
async fn test_calls_remaining_without_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bibs/test"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = client_for(&server, 5);
    assert!(matches!(
        client.calls_remaining().await,
        Err(ApiError::InvalidResponse(_))
    ));
}

#[tokio::test]
async fn test_request_deadline() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bibs/991"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(BIB)
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, 1);
    assert!(matches!(
        client.retrieve("/bibs/991").await,
        Err(ApiError::Http(_))
    ));
}
