#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use httpmock::prelude::*;
use serde_json::json;
use sl_client::{ApiErrorKind, CallOptions, Client, Credential, RetryConfig, TransportKind};

fn struct_response(members: &[(&str, &str)]) -> String {
    let members: String = members
        .iter()
        .map(|(name, value)| format!("<member><name>{name}</name><value>{value}</value></member>"))
        .collect();
    format!(
        "<?xml version=\"1.0\"?><methodResponse><params><param><value><struct>{members}</struct></value></param></params></methodResponse>"
    )
}

fn client(server: &MockServer) -> Client {
    Client::builder()
        .transport_kind(TransportKind::XmlRpc)
        .endpoint_url(server.base_url())
        .credential(Credential::basic("user", "key"))
        .retry(RetryConfig::fast())
        .build()
}

#[tokio::test]
async fn mask_travels_in_the_header_container() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/SoftLayer_Account")
            .body_includes("<methodName>getObject</methodName>")
            .body_includes("SoftLayer_AccountObjectMask")
            .body_includes("mask[id,companyName]")
            .body_includes("<name>apiKey</name>");
        then.status(200).body(struct_response(&[
            ("id", "<int>1234</int>"),
            ("companyName", "<string>Example Corp</string>"),
        ]));
    });

    let account = client(&server)
        .call(
            "Account",
            "getObject",
            vec![],
            CallOptions::new().mask("id,companyName"),
        )
        .await
        .unwrap();

    mock.assert();
    assert_eq!(account, json!({"id": 1234, "companyName": "Example Corp"}));
}

#[tokio::test]
async fn init_parameters_carry_the_object_id() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/SoftLayer_Virtual_Guest")
            .body_includes("SoftLayer_Virtual_GuestInitParameters");
        then.status(200)
            .body(struct_response(&[("hostname", "<string>web1</string>")]));
    });

    let guest = client(&server)
        .service("Virtual_Guest")
        .call("getObject", vec![], CallOptions::new().id(42))
        .await
        .unwrap();

    mock.assert();
    assert_eq!(guest["hostname"], "web1");
}

#[tokio::test]
async fn faults_are_classified() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/SoftLayer_Account");
        then.status(200).body(
            "<methodResponse><fault><value><struct>\
             <member><name>faultCode</name><value><string>SoftLayer_Exception_InvalidLegacyToken</string></value></member>\
             <member><name>faultString</name><value><string>Invalid authentication token.</string></value></member>\
             </struct></value></fault></methodResponse>",
        );
    });

    let client = client(&server);
    let err = client
        .call("Account", "getObject", vec![], CallOptions::new())
        .await
        .unwrap_err();

    mock.assert_calls(1);
    assert_eq!(err.api_kind(), Some(ApiErrorKind::Authentication));
    assert_eq!(
        err.fault_code(),
        Some("SoftLayer_Exception_InvalidLegacyToken")
    );

    let calls = client.last_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].fault_code.as_deref(),
        Some("SoftLayer_Exception_InvalidLegacyToken")
    );
}

#[tokio::test]
async fn server_errors_are_retried_then_reported() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/SoftLayer_Account");
        then.status(503).body("unavailable");
    });

    let client = Client::builder()
        .endpoint_url(server.base_url())
        .retry(RetryConfig::fast())
        .build();
    let err = client
        .call(
            "Account",
            "getObject",
            vec![],
            CallOptions::new().retries(2),
        )
        .await
        .unwrap_err();

    mock.assert_calls(3);
    assert_eq!(err.kind(), "transport_error");
    assert_eq!(err.http_status(), Some(503));
    assert_eq!(client.last_calls().len(), 3);
}
