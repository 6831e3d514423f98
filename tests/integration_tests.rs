mod common;

use common::{test_config, STRIPE_MOCK_BASE};
use stripe_wire::mock::{MockResponse, MockServer};
use stripe_wire::{new_default_transport, Balance, Error, Requestor, PROXY_UPDATED_WARNING};
use tracing_test::traced_test;

#[test]
fn hits_api_base() {
    let mut server = MockServer::start().expect("mock server starts");
    let requestor = Requestor::new();
    let config = test_config().with_api_base(server.base_url());

    let balance = Balance::retrieve(&requestor, &config).expect("balance retrieved");

    assert_eq!(balance, serde_json::json!({}));
    assert_eq!(server.request_count(), 1);

    let records = server.recorded_requests();
    assert_eq!(records[0].method, "GET");
    assert_eq!(records[0].target, "/v1/balance");
    assert_eq!(records[0].headers["authorization"], "Bearer sk_test_123");

    server.shutdown();
}

#[traced_test]
#[test]
fn hits_stripe_proxy() {
    let mut server = MockServer::start().expect("mock server starts");
    let requestor = Requestor::new();
    let mut config = test_config().with_proxy(server.base_url());

    Balance::retrieve(&requestor, &config).expect("balance retrieved through proxy");
    assert_eq!(server.request_count(), 1);

    let records = server.recorded_requests();
    assert!(records[0].is_absolute_form());
    assert_eq!(records[0].target, format!("{}/v1/balance", STRIPE_MOCK_BASE));

    config.proxy = Some("http://bad-url".to_string());
    assert!(!logs_contain(PROXY_UPDATED_WARNING));

    Balance::retrieve(&requestor, &config).expect("stale proxy setting is a no-op");

    logs_assert(|lines: &[&str]| {
        match lines
            .iter()
            .filter(|line| line.contains(PROXY_UPDATED_WARNING))
            .count()
        {
            1 => Ok(()),
            n => Err(format!("expected the proxy warning once, saw it {n} times")),
        }
    });
    assert_eq!(server.request_count(), 2);

    server.shutdown();
}

#[test]
fn hits_client_proxy() {
    let mut server = MockServer::start().expect("mock server starts");
    let requestor = Requestor::new();
    let transport =
        new_default_transport(Some(&server.base_url())).expect("proxied transport builds");
    let config = test_config().with_default_transport(transport);

    Balance::retrieve(&requestor, &config).expect("balance retrieved through client proxy");

    assert_eq!(server.request_count(), 1);
    assert!(server.recorded_requests()[0].is_absolute_form());

    server.shutdown();
}

#[test]
fn assigned_transport_takes_precedence_over_proxy_setting() {
    let mut server = MockServer::start().expect("mock server starts");
    let requestor = Requestor::new();
    let transport = new_default_transport(Some(&server.base_url())).expect("transport builds");
    let config = test_config()
        .with_default_transport(transport)
        .with_proxy("http://bad-url");

    Balance::retrieve(&requestor, &config).expect("assigned transport is used");

    assert_eq!(server.request_count(), 1);

    server.shutdown();
}

#[test]
fn api_error_status_surfaces_as_error() {
    let mut server = MockServer::with_response(
        MockResponse::json(serde_json::json!({
            "error": {
                "type": "invalid_request_error",
                "message": "Invalid API Key provided: sk_test_***123"
            }
        }))
        .with_status(401),
    )
    .expect("mock server starts");
    let requestor = Requestor::new();
    let config = test_config().with_api_base(server.base_url());

    match Balance::retrieve(&requestor, &config) {
        Err(Error::Api { status, message }) => {
            assert_eq!(status, 401);
            assert!(message.starts_with("Invalid API Key provided"));
        }
        other => panic!("expected an api error, got {other:?}"),
    }
    assert_eq!(server.request_count(), 1);

    server.shutdown();
}

#[test]
fn unreachable_api_base_is_an_http_error() {
    let server = MockServer::start().expect("mock server starts");
    let base_url = server.base_url();
    drop(server);

    let requestor = Requestor::new();
    let config = test_config().with_api_base(base_url);

    assert!(matches!(
        Balance::retrieve(&requestor, &config),
        Err(Error::Http(_))
    ));
}
