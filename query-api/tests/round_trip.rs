// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::sync::Arc;

use flight_registry::{FlightRegistry, FlightRegistryReconciler};
use http_body_util::BodyExt;
use hyper::{Method, StatusCode};
use ledger_client::SimulatedLedger;
use metrics::ServiceMetrics;
use oracle_response_engine::DispatchMetrics;
use query_api::{serve, QuerySurface, ALLOW_HEADERS, API_MESSAGE};
use serde_json::Value;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::oneshot,
};

async fn surface_with_flights() -> (Arc<SimulatedLedger>, QuerySurface) {
    let ledger = Arc::new(SimulatedLedger::default());
    let owner = ledger.owner();
    ledger.register_flight(owner, "F1", 1000).unwrap();
    ledger.register_flight(owner, "F2", 2000).unwrap();
    let registry = Arc::new(FlightRegistry::new());
    FlightRegistryReconciler::new(ledger.clone(), registry.clone())
        .resync()
        .await
        .unwrap();
    let metrics = Arc::new(ServiceMetrics::new(DispatchMetrics::new(), registry.clone()).unwrap());
    let surface = QuerySurface::new(registry, ledger.clone()).with_metrics(metrics);
    (ledger, surface)
}

async fn get(surface: &QuerySurface, path: &str) -> (StatusCode, Value) {
    let response = surface.respond(&Method::GET, path).await;
    let status = response.status();
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn composite_lookup_returns_the_registered_flight() {
    let (ledger, surface) = surface_with_flights().await;
    let (status, body) = get(&surface, &format!("/flight/{}.F1.1000", ledger.owner())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["flightName"], "F1");
    assert_eq!(body["departureTime"], 1000);
    assert_eq!(body["id"], 1);
    assert_eq!(body["statusCode"], 0);
    assert_eq!(body["airline"], ledger.owner().to_string());
}

#[tokio::test]
async fn percent_encoded_flight_codes_are_decoded() {
    let (ledger, surface) = surface_with_flights().await;
    ledger.register_flight(ledger.owner(), "ND 1309", 3000).unwrap();

    let (status, body) = get(&surface, &format!("/flight/{}.ND%201309.3000", ledger.owner())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["flightName"], "ND 1309");
    assert_eq!(body["id"], 3);

    let (status, _) = get(&surface, &format!("/response/{}.ND%FF.3000", ledger.owner())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn flight_list_is_ordered_by_id() {
    let (_, surface) = surface_with_flights().await;
    let (status, body) = get(&surface, "/flightList").await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["flightName"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["F1", "F2"]);
}

#[tokio::test]
async fn api_banner_and_unknown_routes() {
    let (_, surface) = surface_with_flights().await;
    let (status, body) = get(&surface, "/api").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], API_MESSAGE);

    let (status, body) = get(&surface, "/nowhere").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("/nowhere"));
}

#[tokio::test]
async fn malformed_composites_are_bad_requests() {
    let (ledger, surface) = surface_with_flights().await;
    for path in [
        "/flight/not-an-address.F1.1000".to_string(),
        format!("/flight/{}.F1", ledger.owner()),
        format!("/flight/{}.F1.tomorrow", ledger.owner()),
        format!("/response/{}.F1.1000.1", ledger.owner()),
    ] {
        let (status, body) = get(&surface, &path).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{path}");
        assert!(body["error"].is_string());
    }
}

#[tokio::test]
async fn unknown_flight_is_not_found() {
    let (ledger, surface) = surface_with_flights().await;
    let (status, _) = get(&surface, &format!("/flight/{}.F9.1000", ledger.owner())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unrequested_response_slot_reads_as_zero() {
    let (ledger, surface) = surface_with_flights().await;
    let (status, body) = get(&surface, &format!("/response/{}.F1.1000", ledger.owner())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isOpen"], false);
    assert_eq!(body["statusCode"], 0);
    assert_eq!(
        body["requester"],
        "0x0000000000000000000000000000000000000000"
    );
}

#[tokio::test]
async fn non_get_methods_are_rejected_and_preflight_is_empty() {
    let (_, surface) = surface_with_flights().await;
    let response = surface.respond(&Method::POST, "/flightList").await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    let response = surface.respond(&Method::OPTIONS, "/anything").await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response.headers()["access-control-allow-headers"],
        ALLOW_HEADERS
    );
}

#[tokio::test]
async fn metrics_are_served_as_text() {
    let (_, surface) = surface_with_flights().await;
    let response = surface.respond(&Method::GET, "/metrics").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("registry_flights 2"));
    assert!(text.contains("registry_resyncs_total 1"));
}

#[tokio::test]
async fn server_answers_over_tcp_with_cors() {
    let (_, surface) = surface_with_flights().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(serve(Arc::new(surface), listener, async {
        let _ = stop_rx.await;
    }));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /api HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();

    assert!(raw.starts_with("HTTP/1.1 200 OK"), "{raw}");
    assert!(raw.to_ascii_lowercase().contains("access-control-allow-origin: *"));
    assert!(raw.contains(API_MESSAGE));

    stop_tx.send(()).unwrap();
    server.await.unwrap();
}
