mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use facematch::config::Config;
use facematch::extractor::SelectionPolicy;
use serde_json::json;
use std::time::Duration;
use tower::ServiceExt;

#[tokio::test]
async fn test_extract_returns_embedding() {
    let response = router(vec![0.75])
        .oneshot(extract_request("image", &png_bytes()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["success"], json!(true));
    let embedding = body["embedding"].as_array().unwrap();
    assert_eq!(embedding.len(), 128);
    assert_eq!(embedding[0].as_f64().unwrap(), 0.75);
    assert!(body.get("msg").is_none());
}

#[tokio::test]
async fn test_extract_is_deterministic() {
    let app = router(vec![0.5]);
    let first = json_body(
        app.clone()
            .oneshot(extract_request("image", &png_bytes()))
            .await
            .unwrap(),
    )
    .await;
    let second = json_body(
        app.oneshot(extract_request("image", &png_bytes()))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_extract_no_face() {
    let response = router(vec![])
        .oneshot(extract_request("image", &png_bytes()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body, json!({"success": false, "msg": "No face found"}));
}

#[tokio::test]
async fn test_extract_uses_configured_selection() {
    let cfg = Config {
        face_selection: SelectionPolicy::HighestScore,
        ..Config::default()
    };
    let response = router_with(cfg, vec![0.25, 0.5])
        .oneshot(extract_request("image", &png_bytes()))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["embedding"][0].as_f64().unwrap(), 0.5);
}

#[tokio::test]
async fn test_extract_undecodable_image() {
    let response = router(vec![0.9])
        .oneshot(extract_request("image", b"\x00\x01not-a-png"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["code"], json!("DECODE_ERROR"));
    assert!(body.get("embedding").is_none());
}

#[tokio::test]
async fn test_extract_missing_image_field() {
    let response = router(vec![0.9])
        .oneshot(extract_request("photo", &png_bytes()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], json!("MISSING_FIELD"));
}

#[tokio::test]
async fn test_extract_requires_multipart() {
    let request = Request::builder()
        .method("POST")
        .uri("/extract-embedding")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = router(vec![0.9]).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], json!("BAD_REQUEST"));
}

#[tokio::test]
async fn test_extract_rejects_oversized_upload() {
    let cfg = Config {
        max_upload_mb: 1,
        ..Config::default()
    };
    let big = vec![0u8; 2 * 1024 * 1024];
    let response = router_with(cfg, vec![0.9])
        .oneshot(extract_request("image", &big))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json_body(response).await["code"], json!("PAYLOAD_TOO_LARGE"));
}

#[tokio::test]
async fn test_compare_identical() {
    let response = router(vec![])
        .oneshot(compare_request(json!({
            "embedding1": [0.0, 0.0, 0.0],
            "embedding2": [0.0, 0.0, 0.0],
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({"match": true, "distance": 0.0})
    );
}

#[tokio::test]
async fn test_compare_unit_distance_is_not_a_match() {
    let response = router(vec![])
        .oneshot(compare_request(json!({
            "embedding1": [1.0, 0.0],
            "embedding2": [0.0, 0.0],
        })))
        .await
        .unwrap();
    assert_eq!(
        json_body(response).await,
        json!({"match": false, "distance": 1.0})
    );
}

#[tokio::test]
async fn test_compare_threshold_from_config() {
    let cfg = Config {
        match_threshold: 1.5,
        ..Config::default()
    };
    let response = router_with(cfg, vec![])
        .oneshot(compare_request(json!({
            "embedding1": [1.0, 0.0],
            "embedding2": [0.0, 0.0],
        })))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["match"], json!(true));
}

#[tokio::test]
async fn test_compare_dimension_mismatch() {
    let response = router(vec![])
        .oneshot(compare_request(json!({
            "embedding1": vec![0.0; 128],
            "embedding2": vec![0.0; 64],
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["code"], json!("DIMENSION_MISMATCH"));
    assert!(body.get("distance").is_none());
}

#[tokio::test]
async fn test_compare_missing_field() {
    let response = router(vec![])
        .oneshot(compare_request(json!({"embedding1": [0.5]})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["code"], json!("MISSING_FIELD"));
    assert!(body["msg"].as_str().unwrap().contains("embedding2"));
}

#[tokio::test]
async fn test_compare_rejects_non_numeric_and_extra_fields() {
    for payload in [
        json!({"embedding1": [0.5, "x"], "embedding2": [0.5, 0.5]}),
        json!({"embedding1": [0.5, null], "embedding2": [0.5, 0.5]}),
        json!({"embedding1": [0.5], "embedding2": [0.5], "embedding3": [0.5]}),
        json!({"embedding1": "0.5", "embedding2": [0.5]}),
    ] {
        let response = router(vec![]).oneshot(compare_request(payload)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], json!("BAD_REQUEST"));
    }
}

#[tokio::test]
async fn test_compare_empty_embeddings() {
    let response = router(vec![])
        .oneshot(compare_request(json!({"embedding1": [], "embedding2": []})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], json!("INVALID_EMBEDDING"));
}

#[tokio::test]
async fn test_compare_expected_dimension() {
    let cfg = Config {
        expected_dimension: Some(128),
        ..Config::default()
    };
    let response = router_with(cfg, vec![])
        .oneshot(compare_request(json!({
            "embedding1": [0.0, 0.0, 0.0],
            "embedding2": [0.0, 0.0, 0.0],
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], json!("INVALID_EMBEDDING"));
}

#[tokio::test]
async fn test_health_and_request_id() {
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "abc-123")
        .body(Body::empty())
        .unwrap();
    let response = router(vec![]).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "abc-123");

    let body = json_body(response).await;
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["workers"], json!(1));
    assert_eq!(body["match_threshold"], json!(0.6));
}

#[tokio::test]
async fn test_request_id_is_generated() {
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = router(vec![]).oneshot(request).await.unwrap();
    let id = response.headers()["x-request-id"].to_str().unwrap();
    assert_eq!(id.len(), 36);
}

#[tokio::test]
async fn test_unknown_route() {
    let request = Request::builder()
        .uri("/nope")
        .body(Body::empty())
        .unwrap();
    let response = router(vec![]).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["code"], json!("NOT_FOUND"));
}

#[tokio::test]
async fn test_concurrent_requests_are_independent() {
    let app = router(vec![0.5]);
    let extract = app.clone().oneshot(extract_request("image", &png_bytes()));
    let compare = app.clone().oneshot(compare_request(json!({
        "embedding1": [0.3, 0.4],
        "embedding2": [0.0, 0.0],
    })));
    let bad = app.oneshot(extract_request("image", b"junk"));

    let (extract, compare, bad) = tokio::join!(extract, compare, bad);
    assert_eq!(extract.unwrap().status(), StatusCode::OK);
    assert_eq!(bad.unwrap().status(), StatusCode::BAD_REQUEST);

    let body = json_body(compare.unwrap()).await;
    assert_eq!(body["match"], json!(true));
    assert!((body["distance"].as_f64().unwrap() - 0.5).abs() < 1e-12);
}

#[tokio::test]
async fn test_large_components_give_a_finite_distance() {
    let response = router(vec![])
        .oneshot(compare_request(json!({
            "embedding1": [1e200],
            "embedding2": [0.0],
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({"match": false, "distance": 1e200})
    );
}

#[tokio::test]
async fn test_compare_rejects_oversized_body() {
    let cfg = Config {
        max_upload_mb: 1,
        ..Config::default()
    };
    let values = vec!["0.125"; 400_000].join(",");
    let body = format!(r#"{{"embedding1": [{v}], "embedding2": [{v}]}}"#, v = values);
    let request = Request::builder()
        .method("POST")
        .uri("/compare-embedding")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();

    let response = router_with(cfg, vec![]).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = json_body(response).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["code"], json!("PAYLOAD_TOO_LARGE"));
}

#[tokio::test]
async fn test_wrong_method_has_error_body() {
    for uri in ["/compare-embedding", "/extract-embedding"] {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = router(vec![]).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{}", uri);
        let body = json_body(response).await;
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["code"], json!("METHOD_NOT_ALLOWED"));
    }
}

#[tokio::test]
async fn test_timeout_has_error_body() {
    let cfg = Config {
        timeout_secs: 1,
        ..Config::default()
    };
    let app = router_with_backend(cfg, Box::new(Stalled(Duration::from_millis(1500))));
    let response = app
        .oneshot(extract_request("image", &png_bytes()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    assert!(response.headers().contains_key("x-request-id"));
    let body = json_body(response).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["code"], json!("REQUEST_TIMEOUT"));
}

#[tokio::test]
async fn test_worker_recovers_after_panic() {
    let app = router_with_backend(Config::default(), Box::new(PanicsOnce { panicked: false }));

    let response = app
        .clone()
        .oneshot(extract_request("image", &png_bytes()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["code"], json!("BACKEND_ERROR"));

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(extract_request("image", &png_bytes()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["success"], json!(true));
    }
}
