//! End-to-end tests of the VetStat client against a mock SOAP endpoint.

use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::NaiveDate;
use vetstat_wsse::client::{ClientError, ClientSettings, VetStatClient};
use vetstat_wsse::credential::{Credential, generate_test_credential};
use vetstat_wsse::crypto::HashAlg;
use vetstat_wsse::crypto::rsa::{self, RsaPublicKey, RsaSignature};
use vetstat_wsse::request::AntibioticsQuery;
use vetstat_wsse::response::QueryOutcome;
use vetstat_wsse::soap::{CONTENT_TYPE, SOAP_ACTION, ns};
use vetstat_wsse::transport::{HttpTransport, TransportError};
use vetstat_wsse::wsse::canonical_signed_info;
use vetstat_wsse::xml::Document;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RESPONSE: &str = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <ns2:VetStat_CHRHentAntibiotikaForbrugResponse xmlns:ns2="http://vetstat.fvst.dk/ekstern">
      <ns2:Data>
        <ns2:ATCKode>QJ01CA04</ns2:ATCKode>
        <ns2:Maengde>12.5</ns2:Maengde>
      </ns2:Data>
    </ns2:VetStat_CHRHentAntibiotikaForbrugResponse>
  </soap:Body>
</soap:Envelope>"#;

fn query(chr_number: u64) -> AntibioticsQuery {
    AntibioticsQuery::new(
        chr_number,
        15,
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2023, 3, 31).unwrap(),
    )
}

fn credential() -> Credential {
    generate_test_credential("fvm-user", "fvm-pass").unwrap()
}

fn settings(max_retries: u32) -> ClientSettings {
    ClientSettings {
        max_retries,
        retry_backoff: Duration::from_millis(1),
        ..ClientSettings::default()
    }
}

fn client_for(endpoint: &str, timeout: Duration, max_retries: u32) -> VetStatClient<HttpTransport> {
    let transport = HttpTransport::new(format!("{endpoint}/CHRWS"), SOAP_ACTION, timeout).unwrap();
    VetStatClient::new(transport, credential(), settings(max_retries))
}

async fn mount(server: &MockServer, status: u16, body: &str) {
    Mock::given(method("POST"))
        .and(path("/CHRWS"))
        .and(header("SOAPAction", SOAP_ACTION))
        .and(header("Content-Type", CONTENT_TYPE))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

/// Check that a received envelope carries a valid signature from the
/// certificate embedded in its own security header.
fn assert_signed(body: &[u8]) {
    let xml = std::str::from_utf8(body).unwrap();
    let doc = Document::parse(xml).unwrap();

    let token = doc.find(ns::WSSE, "BinarySecurityToken").unwrap();
    let certificate = BASE64.decode(doc.text(token)).unwrap();
    let public_key = RsaPublicKey::from_certificate_der(&certificate).unwrap();

    let signature_value = doc.find(ns::DS, "SignatureValue").unwrap();
    let signature = RsaSignature::new(
        public_key.key_size(),
        BASE64.decode(doc.text(signature_value)).unwrap(),
    );
    let canonical = canonical_signed_info(&doc).unwrap();

    assert!(rsa::verify(&public_key, canonical.as_bytes(), &signature, HashAlg::Sha1).unwrap());
}

#[tokio::test]
async fn ok_response_yields_records() {
    let server = MockServer::start().await;
    mount(&server, 200, RESPONSE).await;

    let client = client_for(&server.uri(), Duration::from_secs(5), 0);
    let outcome = client.fetch(&query(28400)).await.unwrap();

    assert_eq!(outcome.raw_body(), Some(RESPONSE));
    let records = outcome.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["ATCKode"], "QJ01CA04");
    assert_eq!(records[0]["CHRNummer"], "28400");
    assert_eq!(records[0]["DyreArtKode"], "15");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_signed(&requests[0].body);
}

#[tokio::test]
async fn server_error_means_no_data() {
    let server = MockServer::start().await;
    mount(&server, 500, "<soap:Fault/>").await;

    let client = client_for(&server.uri(), Duration::from_secs(5), 3);
    let outcome = client.fetch(&query(28400)).await.unwrap();

    assert_eq!(outcome, QueryOutcome::NoData);
    // A 500 is an answer, not a transport failure
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn other_status_is_unexpected() {
    let server = MockServer::start().await;
    mount(&server, 401, "Unauthorized").await;

    let client = client_for(&server.uri(), Duration::from_secs(5), 0);
    let outcome = client.fetch(&query(28400)).await.unwrap();

    assert_eq!(
        outcome,
        QueryOutcome::Unexpected {
            status: 401,
            body: "Unauthorized".to_string()
        }
    );
}

#[tokio::test]
async fn unmatched_soap_action_is_unexpected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("SOAPAction", "urn:some-other-action"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RESPONSE))
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), Duration::from_secs(5), 0);
    let outcome = client.fetch(&query(28400)).await.unwrap();

    // wiremock answers unmatched requests with 404
    assert!(matches!(outcome, QueryOutcome::Unexpected { status: 404, .. }));
}

#[tokio::test]
async fn every_request_is_freshly_signed() {
    let server = MockServer::start().await;
    mount(&server, 500, "").await;

    let client = client_for(&server.uri(), Duration::from_secs(5), 0);
    let results = client.fetch_all(vec![query(28400), query(28401), query(28402)]).await;
    assert!(results.iter().all(|(_, r)| matches!(r, Ok(QueryOutcome::NoData))));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);

    let mut nonces = Vec::new();
    for request in &requests {
        assert_signed(&request.body);
        let doc = Document::parse(std::str::from_utf8(&request.body).unwrap()).unwrap();
        nonces.push(doc.text(doc.find(ns::WSSE, "Nonce").unwrap()));
    }
    nonces.sort();
    nonces.dedup();
    assert_eq!(nonces.len(), 3);
}

#[tokio::test]
async fn connection_failure_is_retried_then_reported() {
    // Nothing listens on port 1
    let client = client_for("http://127.0.0.1:1", Duration::from_secs(5), 2);
    let result = client.fetch(&query(28400)).await;

    assert!(matches!(
        result,
        Err(ClientError::Transport {
            attempts: 3,
            source: TransportError::Http(_)
        })
    ));
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(RESPONSE)
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), Duration::from_millis(50), 1);
    let result = client.fetch(&query(28400)).await;

    assert!(matches!(
        result,
        Err(ClientError::Transport {
            attempts: 2,
            source: TransportError::Timeout(_)
        })
    ));
}
