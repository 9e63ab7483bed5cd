// Integration tests for `Gen2Client` using wiremock.

#![allow(clippy::unwrap_used)]

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shelly_api::component::SwitchStatus;
use shelly_api::{
    Component, ComponentKind, DeviceGeneration, Error, FailureKind, Gen2Client, PropertyKey,
    PropertyValue, TransportConfig,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, Gen2Client, String) {
    let server = MockServer::start().await;
    let client = Gen2Client::new(&TransportConfig::default()).unwrap();
    let address = server.address().to_string();
    (server, client, address)
}

// ── Happy-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_device_information() {
    let (server, client, address) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rpc/Shelly.GetDeviceInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": null,
            "id": "shellyplus1pm-a8032ab12345",
            "mac": "A8032AB12345",
            "model": "SNSW-001P16EU",
            "gen": 2,
            "fw_id": "20230913-114244/v1.0.3-g6176478",
            "ver": "1.0.3",
            "app": "Plus1PM",
            "auth_en": false,
            "auth_domain": null
        })))
        .mount(&server)
        .await;

    let identity = client.get_device_information(&address).await.unwrap();

    assert_eq!(identity.id, "shellyplus1pm-a8032ab12345");
    assert_eq!(identity.generation, DeviceGeneration::Gen2);
    assert_eq!(identity.firmware_version, "1.0.3");
    assert!(!identity.auth_enabled);
}

#[tokio::test]
async fn test_device_information_rejects_gen1_answer() {
    let (server, client, address) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rpc/Shelly.GetDeviceInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "x", "mac": "AA", "model": "m", "gen": 1
        })))
        .mount(&server)
        .await;

    let err = client.get_device_information(&address).await.unwrap_err();
    assert!(matches!(err, Error::UnexpectedGeneration(1)));
}

#[tokio::test]
async fn test_config_and_status() {
    let (server, client, address) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rpc/Shelly.GetConfig"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "switch:0": {"id": 0, "name": "Boiler"},
            "sys": {"device": {"name": null}}
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rpc/Shelly.GetStatus"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "switch:0": {"id": 0, "output": true, "apower": 12.3},
            "sys": {"uptime": 1000}
        })))
        .mount(&server)
        .await;

    let config = client.get_device_configuration(&address, None).await.unwrap();
    assert_eq!(
        config.components(),
        vec![(ComponentKind::Switch, 0, Some("Boiler".to_owned()))]
    );

    let status = client.get_device_status(&address, None).await.unwrap();
    assert_eq!(
        status.components,
        vec![Component::Switch(SwitchStatus {
            id: 0,
            output: Some(true),
            active_power: Some(12.3),
            ..SwitchStatus::default()
        })]
    );
}

#[tokio::test]
async fn test_set_switch_posts_rpc_frame() {
    let (server, client, address) = setup().await;

    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(json!({
            "method": "Switch.Set",
            "params": {"id": 0, "on": false}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1, "src": "shellyplus1pm-a8032ab12345", "result": {"was_on": true}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let key: PropertyKey = "switch_0_on".parse().unwrap();
    let result = client
        .set_device_state(&address, None, &key, &PropertyValue::Bool(false))
        .await
        .unwrap();
    assert_eq!(result, json!({"was_on": true}));
}

// ── Error classification ────────────────────────────────────────────

#[tokio::test]
async fn test_rpc_error_frame() {
    let (server, client, address) = setup().await;

    Mock::given(method("POST"))
        .and(path("/rpc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1, "error": {"code": -103, "message": "Invalid argument 'pos'"}
        })))
        .mount(&server)
        .await;

    let key: PropertyKey = "cover_0_position".parse().unwrap();
    let err = client
        .set_device_state(&address, None, &key, &PropertyValue::Integer(50))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Rpc { code: -103, .. }));
}

#[tokio::test]
async fn test_status_401_requires_authorization() {
    let (server, client, address) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rpc/Shelly.GetStatus"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client.get_device_status(&address, None).await.unwrap_err();
    assert_eq!(err.failure_kind(), FailureKind::AuthorizationRequired);
}

#[tokio::test]
async fn test_status_503_is_connection_lost() {
    let (server, client, address) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rpc/Shelly.GetStatus"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client.get_device_status(&address, None).await.unwrap_err();
    assert_eq!(err.failure_kind(), FailureKind::ConnectionLost);
}

#[tokio::test]
async fn test_read_only_property_is_rejected_locally() {
    let (_server, client, address) = setup().await;

    let key: PropertyKey = "switch_0_voltage".parse().unwrap();
    let err = client
        .set_device_state(&address, None, &key, &PropertyValue::Float(230.0))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ReadOnlyProperty(_)));
}
