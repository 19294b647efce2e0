//! Module registry protocol tests against a running gateway

use bytes::Bytes;
use canopy::core::messages::{
    BeginVersionRequest, EndVersionRequest, UploadSourceZipRequest, VersionAction, VersionedName,
};
use canopy::core::{message_channel, CallContext, MessageSink};
use canopy::gateway::{serve, AppState, GatewayConfig};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Start a gateway with one published module version and return its base URL
async fn start_gateway(archive: &'static [u8]) -> String {
    let config = GatewayConfig {
        use_memory_store: true,
        chunk_size: 8,
        ..Default::default()
    };
    let state = Arc::new(AppState::new(config).await.unwrap());

    let ctx = CallContext::new();
    let module = VersionedName::new("cie/vpc/aws", "1.0.0");
    let modules = state.gateway.modules();

    let session = modules
        .begin_version(&ctx, BeginVersionRequest { module: module.clone() })
        .await
        .unwrap();

    let (mut sink, mut source) = message_channel(4);
    sink.send(UploadSourceZipRequest {
        module: module.clone(),
        zip_data_chunk: Bytes::from_static(archive),
    })
    .await
    .unwrap();
    drop(sink);
    modules.upload_source_zip(&ctx, &mut source).await.unwrap();

    modules
        .end_version(
            &ctx,
            EndVersionRequest {
                session_key: session.session_key,
                module,
                action: VersionAction::Publish.as_i32(),
            },
        )
        .await
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, state, std::future::pending()));

    format!("http://{}", addr)
}

const ARCHIVE: &[u8] = b"PK\x03\x04 module archive contents";

#[tokio::test]
async fn test_health_check() {
    let base = start_gateway(ARCHIVE).await;

    let response = reqwest::get(format!("{}/healthz", base)).await.unwrap();

    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_list_versions() {
    let base = start_gateway(ARCHIVE).await;

    let response = reqwest::get(format!("{}/modules/v1/cie/vpc/aws/versions", base))
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body,
        serde_json::json!({ "modules": [{ "versions": [{ "version": "1.0.0" }] }] })
    );
}

#[tokio::test]
async fn test_unknown_module_versions_not_found() {
    let base = start_gateway(ARCHIVE).await;

    let response = reqwest::get(format!("{}/modules/v1/cie/nothing/aws/versions", base))
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], 404);
}

#[tokio::test]
async fn test_download_points_at_archive() {
    let base = start_gateway(ARCHIVE).await;

    let response = reqwest::get(format!("{}/modules/v1/cie/vpc/aws/1.0.0/download", base))
        .await
        .unwrap();

    assert_eq!(response.status(), 204);
    assert_eq!(
        response.headers()["x-terraform-get"],
        "./archive?archive=zip"
    );
}

#[tokio::test]
async fn test_archive_streams_stored_bytes() {
    let base = start_gateway(ARCHIVE).await;

    let response = reqwest::get(format!("{}/modules/v1/cie/vpc/aws/1.0.0/archive", base))
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "application/zip");
    assert_eq!(response.bytes().await.unwrap().as_ref(), ARCHIVE);
}

#[tokio::test]
async fn test_missing_archive_not_found() {
    let base = start_gateway(ARCHIVE).await;

    let response = reqwest::get(format!("{}/modules/v1/cie/vpc/aws/9.9.9/archive", base))
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], 404);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("404 Not Found - "));
}
