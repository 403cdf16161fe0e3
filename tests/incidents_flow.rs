//! Integration tests for the incident commands using wiremock.
//!
//! These tests mock the XDR public API to verify listing, extra data
//! merging, and incident updates, including the exact request bodies sent.

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use xdr_adapter::auth::ApiKey;
use xdr_adapter::client::{DEFAULT_REQUEST_TIMEOUT, XdrClient};
use xdr_adapter::error::XdrError;
use xdr_adapter::incidents::*;
use xdr_adapter::output::INCIDENT_PATH;
use xdr_adapter::request::SortOrder;

/// Helper: creates an XdrClient pointed at the given wiremock server.
async fn mock_client(server: &MockServer) -> XdrClient {
    XdrClient::new(&server.uri(), ApiKey::new("7", "mock-key"), DEFAULT_REQUEST_TIMEOUT).unwrap()
}

// ── Get incidents ──────────────────────────────────────────────────────

#[tokio::test]
async fn get_incidents_outputs_reply_incidents() {
    let server = MockServer::start().await;
    let client = mock_client(&server).await;

    Mock::given(method("POST"))
        .and(path("/public_api/v1/incidents/get_incidents/"))
        .and(header("x-xdr-auth-id", "7"))
        .and(header("authorization", "mock-key"))
        .and(body_json(json!({
            "request_data": {
                "filters": [
                    {"field": "creation_time", "operator": "gte", "value": 1_577_836_800_000_i64}
                ],
                "search_from": 0,
                "search_to": 3,
                "sort": {"field": "creation_time", "keyword": "asc"}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "reply": {
                "total_count": 2,
                "result_count": 2,
                "incidents": [
                    {"incident_id": "1", "description": "'Local Analysis Malware' generated by XDR Agent", "severity": "medium"},
                    {"incident_id": "2", "description": "Phishing", "severity": "high"}
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let args = GetIncidentsArgs {
        gte_creation_time: Some(1_577_836_800_000),
        sort_by_creation_time: Some(SortOrder::Asc),
        limit: Some(3),
        ..Default::default()
    };
    let result = get_incidents_command(&client, &args).await.unwrap();

    let incidents = result.output(INCIDENT_PATH).unwrap();
    assert_eq!(incidents.as_array().unwrap().len(), 2);
    assert_eq!(incidents[1]["incident_id"], "2");
    assert!(result.readable.starts_with("### Incidents\n"));
    assert!(result.readable.contains("|2|Phishing||high|"));
    assert_eq!(result.raw["reply"]["total_count"], 2);
}

#[tokio::test]
async fn conflicting_sorts_fail_before_any_request() {
    let server = MockServer::start().await;
    let client = mock_client(&server).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let args = GetIncidentsArgs {
        sort_by_creation_time: Some(SortOrder::Asc),
        sort_by_modification_time: Some(SortOrder::Desc),
        ..Default::default()
    };
    let err = get_incidents_command(&client, &args).await.unwrap_err();
    assert!(matches!(err, XdrError::Validation { .. }));
}

#[tokio::test]
async fn api_error_keeps_status_and_body() {
    let server = MockServer::start().await;
    let client = mock_client(&server).await;

    Mock::given(method("POST"))
        .and(path("/public_api/v1/incidents/get_incidents/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "reply": {"err_code": 401, "err_msg": "Public API request unauthorized"}
        })))
        .mount(&server)
        .await;

    let err = get_incidents_command(&client, &GetIncidentsArgs::default())
        .await
        .unwrap_err();
    match err {
        XdrError::Api { status, body } => {
            assert_eq!(status.as_u16(), 401);
            assert!(body.contains("unauthorized"));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

// ── Extra data ─────────────────────────────────────────────────────────

#[tokio::test]
async fn extra_data_merges_alerts_and_artifacts_into_incident() {
    let server = MockServer::start().await;
    let client = mock_client(&server).await;

    Mock::given(method("POST"))
        .and(path("/public_api/v1/incidents/get_incident_extra_data/"))
        .and(body_json(json!({
            "request_data": {"incident_id": "1", "alerts_limit": 1000}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "reply": {
                "incident": {"incident_id": "1", "status": "new"},
                "alerts": {"total_count": 1, "data": [{"alert_id": "a1", "name": "Malware"}]},
                "network_artifacts": {"total_count": 0, "data": []},
                "file_artifacts": {"total_count": 1, "data": [{"file_sha256": "abc"}]}
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let args = IncidentExtraDataArgs {
        incident_id: "1".to_string(),
        alerts_limit: None,
    };
    let result = get_incident_extra_data_command(&client, &args).await.unwrap();

    assert_eq!(
        result.output(INCIDENT_PATH).unwrap(),
        &json!({
            "incident_id": "1",
            "status": "new",
            "alerts": [{"alert_id": "a1", "name": "Malware"}],
            "network_artifacts": [],
            "file_artifacts": [{"file_sha256": "abc"}]
        })
    );
    assert!(result.readable.contains("Malware"));
}

#[tokio::test]
async fn extra_data_defaults_missing_artifact_sections() {
    let server = MockServer::start().await;
    let client = mock_client(&server).await;

    Mock::given(method("POST"))
        .and(path("/public_api/v1/incidents/get_incident_extra_data/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "reply": {
                "incident": {"incident_id": "9"},
                "alerts": {"data": []}
            }
        })))
        .mount(&server)
        .await;

    let args = IncidentExtraDataArgs {
        incident_id: "9".to_string(),
        alerts_limit: Some(5),
    };
    let result = get_incident_extra_data_command(&client, &args).await.unwrap();
    let incident = result.output(INCIDENT_PATH).unwrap();
    assert_eq!(incident["network_artifacts"], json!([]));
    assert_eq!(incident["file_artifacts"], json!([]));
}

// ── Update ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn update_incident_sends_only_given_fields() {
    let server = MockServer::start().await;
    let client = mock_client(&server).await;

    Mock::given(method("POST"))
        .and(path("/public_api/v1/incidents/update_incident/"))
        .and(body_json(json!({
            "request_data": {
                "incident_id": "1",
                "update_data": {"assigned_user_mail": "none", "status": "under_investigation"}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"reply": true})))
        .expect(1)
        .mount(&server)
        .await;

    let args = UpdateIncidentArgs {
        incident_id: "1".to_string(),
        status: Some("UNDER_INVESTIGATION".to_string()),
        unassign_user: true,
        ..Default::default()
    };
    let result = update_incident_command(&client, &args).await.unwrap();
    assert_eq!(result.readable, "Incident 1 has been updated");
    assert!(result.outputs.is_none());
}
