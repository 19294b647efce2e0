//! End-to-end tests of the gateway router over the all-in-one backends
//!
//! These tests drive a complete module and provider release the way a
//! publishing pipeline would.

use bytes::Bytes;
use canopy::core::messages::{
    BeginVersionRequest, ContainerImage, DownloadShasumRequest, DownloadShasumResponse,
    DownloadSourceZipRequest, EndVersionRequest, PlatformItem, ProviderPlatformRequest,
    PublishRequest, PublishTagRequest,
    RegisterContainerDependenciesRequest, RegisterModuleDependenciesRequest,
    RegisterModuleRequest, RegisterProviderRequest, ReleaseType,
    RetrieveContainerDependenciesRequest, RetrieveModuleDependenciesRequest, SourceZipResponse,
    UploadShasumRequest, UploadSourceZipRequest, VersionAction, VersionedName,
};
use canopy::core::{
    message_channel, CallContext, MessageSink, MessageSource, StorageConfig, StorageService,
};
use canopy::gateway::{local, Gateway};
use canopy::objectstore::MemoryObjectStore;
use std::sync::Arc;
use tonic::Code;

async fn gateway(chunk_size: usize) -> Gateway {
    let config = StorageConfig::new("terrarium-modules", "eu-west-1").with_chunk_size(chunk_size);
    let storage = StorageService::new(MemoryObjectStore::new(), config).unwrap();
    storage.initialize().await.unwrap();
    Gateway::new(local::all_in_one(Arc::new(storage)))
}

fn vpc(version: &str) -> VersionedName {
    VersionedName::new("cie/vpc/aws", version)
}

async fn upload_source(gateway: &Gateway, ctx: &CallContext, module: VersionedName, data: &[u8]) {
    let (mut sink, mut source) = message_channel(16);
    for chunk in data.chunks(8) {
        sink.send(UploadSourceZipRequest {
            module: module.clone(),
            zip_data_chunk: Bytes::copy_from_slice(chunk),
        })
        .await
        .unwrap();
    }
    drop(sink);

    gateway
        .modules()
        .upload_source_zip(ctx, &mut source)
        .await
        .unwrap();
}

async fn download_source(
    gateway: &Gateway,
    ctx: &CallContext,
    module: VersionedName,
) -> canopy::core::Result<Vec<Bytes>> {
    let (mut sink, mut source) = message_channel::<SourceZipResponse>(64);
    gateway
        .modules()
        .download_source_zip(ctx, DownloadSourceZipRequest { module }, &mut sink)
        .await?;
    drop(sink);

    let mut chunks = Vec::new();
    while let Some(message) = source.recv().await.unwrap() {
        chunks.push(message.zip_data_chunk);
    }
    Ok(chunks)
}

#[tokio::test]
async fn test_module_release_flow() {
    let gateway = gateway(16).await;
    let ctx = CallContext::new();
    let modules = gateway.modules();

    let reply = modules
        .register(
            &ctx,
            RegisterModuleRequest {
                name: "cie/vpc/aws".to_string(),
                description: "Shared VPC".to_string(),
                source_url: "https://git.example.com/cie/vpc".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(reply.message, "Module registered successfully.");

    modules
        .publish_tag(
            &ctx,
            PublishTagRequest {
                name: "cie/vpc/aws".to_string(),
                tags: vec!["network".to_string()],
            },
        )
        .await
        .unwrap();

    let session = modules
        .begin_version(&ctx, BeginVersionRequest { module: vpc("1.2.0") })
        .await
        .unwrap();

    let archive: Vec<u8> = (0..40u8).collect();
    upload_source(&gateway, &ctx, vpc("1.2.0"), &archive).await;

    modules
        .register_module_dependencies(
            &ctx,
            RegisterModuleDependenciesRequest {
                session_key: session.session_key.clone(),
                module: vpc("1.2.0"),
                dependencies: vec![VersionedName::new("cie/subnet/aws", "0.3.0")],
            },
        )
        .await
        .unwrap();
    modules
        .register_container_dependencies(
            &ctx,
            RegisterContainerDependenciesRequest {
                session_key: session.session_key.clone(),
                module: vpc("1.2.0"),
                images: vec![ContainerImage {
                    name: "nginx".to_string(),
                    reference: "1.27".to_string(),
                }],
            },
        )
        .await
        .unwrap();

    // Not visible until published
    assert!(modules.list_versions(&ctx, "cie/vpc/aws").await.unwrap().is_empty());

    modules
        .end_version(
            &ctx,
            EndVersionRequest {
                session_key: session.session_key,
                module: vpc("1.2.0"),
                action: VersionAction::Publish.as_i32(),
            },
        )
        .await
        .unwrap();

    assert_eq!(
        modules.list_versions(&ctx, "cie/vpc/aws").await.unwrap(),
        vec!["1.2.0".to_string()]
    );

    let chunks = download_source(&gateway, &ctx, vpc("1.2.0")).await.unwrap();
    assert_eq!(chunks.len(), 3);
    assert!(chunks.iter().all(|chunk| chunk.len() <= 16));
    assert_eq!(chunks.concat(), archive);

    let (mut sink, mut source) = message_channel(4);
    modules
        .retrieve_module_dependencies(
            &ctx,
            RetrieveModuleDependenciesRequest { module: vpc("1.2.0") },
            &mut sink,
        )
        .await
        .unwrap();
    let dependencies = source.recv().await.unwrap().unwrap();
    assert_eq!(
        dependencies.dependencies,
        vec![VersionedName::new("cie/subnet/aws", "0.3.0")]
    );

    let (mut sink, mut source) = message_channel(4);
    modules
        .retrieve_container_dependencies(
            &ctx,
            RetrieveContainerDependenciesRequest { module: vpc("1.2.0") },
            &mut sink,
        )
        .await
        .unwrap();
    let images = source.recv().await.unwrap().unwrap();
    assert_eq!(images.images[0].name, "nginx");

    let reply = gateway
        .releases()
        .publish(
            &ctx,
            PublishRequest {
                release_type: ReleaseType::Module,
                organization: "cie".to_string(),
                name: "vpc".to_string(),
                version: "1.2.0".to_string(),
                description: "IPv6 support".to_string(),
                links: vec![],
            },
        )
        .await
        .unwrap();
    assert_eq!(reply.message, "Release published.");
}

#[tokio::test]
async fn test_versions_sorted_by_semver() {
    let gateway = gateway(16).await;
    let ctx = CallContext::new();
    let modules = gateway.modules();

    for version in ["1.10.0", "1.2.0", "0.9.1"] {
        let session = modules
            .begin_version(&ctx, BeginVersionRequest { module: vpc(version) })
            .await
            .unwrap();
        modules
            .end_version(
                &ctx,
                EndVersionRequest {
                    session_key: session.session_key,
                    module: vpc(version),
                    action: VersionAction::Publish.as_i32(),
                },
            )
            .await
            .unwrap();
    }

    assert_eq!(
        modules.list_versions(&ctx, "cie/vpc/aws").await.unwrap(),
        vec!["0.9.1", "1.2.0", "1.10.0"]
    );
}

#[tokio::test]
async fn test_discarded_version_is_not_listed() {
    let gateway = gateway(16).await;
    let ctx = CallContext::new();
    let modules = gateway.modules();

    let session = modules
        .begin_version(&ctx, BeginVersionRequest { module: vpc("2.0.0") })
        .await
        .unwrap();
    let reply = modules
        .end_version(
            &ctx,
            EndVersionRequest {
                session_key: session.session_key.clone(),
                module: vpc("2.0.0"),
                action: VersionAction::Discard.as_i32(),
            },
        )
        .await
        .unwrap();
    assert_eq!(reply.message, "Version aborted.");

    // The session is gone
    let err = modules
        .end_version(
            &ctx,
            EndVersionRequest {
                session_key: session.session_key,
                module: vpc("2.0.0"),
                action: VersionAction::Publish.as_i32(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);
    assert!(modules.list_versions(&ctx, "cie/vpc/aws").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_archive_is_not_found() {
    let gateway = gateway(16).await;

    let err = download_source(&gateway, &CallContext::new(), vpc("9.9.9"))
        .await
        .unwrap_err();

    assert_eq!(err.code(), Code::NotFound);
}

#[tokio::test]
async fn test_provider_release_flow() {
    let gateway = gateway(16).await;
    let ctx = CallContext::new();
    let providers = gateway.providers();
    let aws = VersionedName::new("cie/aws", "5.1.0");

    let reply = providers
        .register(
            &ctx,
            RegisterProviderRequest {
                name: "cie/aws".to_string(),
                description: "AWS provider".to_string(),
                source_url: "https://git.example.com/cie/terraform-provider-aws".to_string(),
                version: "5.1.0".to_string(),
                protocols: vec!["5.0".to_string()],
                platforms: vec![PlatformItem {
                    os: "linux".to_string(),
                    arch: "amd64".to_string(),
                    ..Default::default()
                }],
            },
        )
        .await
        .unwrap();
    assert_eq!(reply.message, "Provider registered successfully.");

    let session = providers
        .begin_version(&ctx, BeginVersionRequest { module: aws.clone() })
        .await
        .unwrap();

    let (mut sink, mut source) = message_channel(4);
    sink.send(UploadShasumRequest {
        provider: aws.clone(),
        shasum_data_chunk: Bytes::from_static(
            b"deadbeef  terraform-provider-aws_5.1.0_linux_amd64.zip\n",
        ),
    })
    .await
    .unwrap();
    drop(sink);
    providers.upload_shasum(&ctx, &mut source).await.unwrap();

    providers
        .end_version(
            &ctx,
            EndVersionRequest {
                session_key: session.session_key,
                module: aws.clone(),
                action: VersionAction::Publish.as_i32(),
            },
        )
        .await
        .unwrap();

    let (mut sink, mut source) = message_channel::<DownloadShasumResponse>(4);
    providers
        .download_shasum(&ctx, DownloadShasumRequest { provider: aws.clone() }, &mut sink)
        .await
        .unwrap();
    drop(sink);

    let message = source.recv().await.unwrap().unwrap();
    assert!(message.shasum_data_chunk.starts_with(b"deadbeef"));

    let versions = providers.list_versions(&ctx, "cie/aws").await.unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version, "5.1.0");
    assert_eq!(versions[0].protocols, vec!["5.0".to_string()]);

    let package = providers
        .platform(
            &ctx,
            ProviderPlatformRequest {
                provider: aws,
                os: "linux".to_string(),
                arch: "amd64".to_string(),
            },
        )
        .await
        .unwrap();
    assert!(package.matches("linux", "amd64"));
}
