//! Provider family operations

use super::{Gateway, Operation};
use canopy_core::messages::{
    BeginVersionRequest, BeginVersionResponse, DownloadProviderSourceZipRequest,
    DownloadShasumRequest, DownloadShasumResponse, DownloadShasumSignatureRequest,
    EndVersionRequest, PlatformItem, ProviderPlatformRequest, ProviderVersionItem,
    RegisterProviderRequest, Response, SourceZipResponse, UploadProviderBinaryZipRequest,
    UploadShasumRequest, UploadShasumSignatureRequest,
};
use canopy_core::{Artifact, CallContext, MessageSink, MessageSource, Result, VersionLifecycle};

/// Provider operations of a [`Gateway`]
pub struct ProviderGateway<'g> {
    gateway: &'g Gateway,
}

impl<'g> ProviderGateway<'g> {
    pub(super) fn new(gateway: &'g Gateway) -> Self {
        Self { gateway }
    }

    pub async fn register(
        &self,
        ctx: &CallContext,
        request: RegisterProviderRequest,
    ) -> Result<Response> {
        let registrar = &self.gateway.backends().provider_registrar;
        let resource = Some(request.name.clone());
        self.gateway
            .unary(ctx, Operation::RegisterProvider, resource, registrar.register(request))
            .await
    }

    pub async fn begin_version(
        &self,
        ctx: &CallContext,
        request: BeginVersionRequest,
    ) -> Result<BeginVersionResponse> {
        let backend = self.gateway.backends().provider_versions.as_ref();
        let resource = Some(request.module.to_string());
        self.gateway
            .unary(ctx, Operation::BeginProviderVersion, resource, async move {
                VersionLifecycle::new(backend, request.module).begin(ctx).await
            })
            .await
    }

    pub async fn end_version(&self, ctx: &CallContext, request: EndVersionRequest) -> Result<Response> {
        let backend = self.gateway.backends().provider_versions.as_ref();
        let resource = Some(request.module.to_string());
        self.gateway
            .unary(ctx, Operation::EndProviderVersion, resource, async move {
                VersionLifecycle::resume(backend, request.module, request.session_key)
                    .end(ctx, request.action)
                    .await
            })
            .await
    }

    /// Published versions of `provider`, lowest first
    pub async fn list_versions(
        &self,
        ctx: &CallContext,
        provider: &str,
    ) -> Result<Vec<ProviderVersionItem>> {
        let index = &self.gateway.backends().provider_version_index;
        self.gateway
            .unary(
                ctx,
                Operation::ListProviderVersions,
                Some(provider.to_string()),
                index.list_provider_versions(provider),
            )
            .await
    }

    /// Package of a published version for one platform
    pub async fn platform(
        &self,
        ctx: &CallContext,
        request: ProviderPlatformRequest,
    ) -> Result<PlatformItem> {
        let index = &self.gateway.backends().provider_version_index;
        let resource = Some(format!("{} {}_{}", request.provider, request.os, request.arch));
        self.gateway
            .unary(ctx, Operation::GetProviderPlatform, resource, index.platform(request))
            .await
    }

    pub async fn upload_provider_binary_zip<C>(
        &self,
        ctx: &CallContext,
        client: &mut C,
    ) -> Result<Response>
    where
        C: MessageSource<UploadProviderBinaryZipRequest> + ?Sized,
    {
        let storage = &self.gateway.backends().provider_storage;
        self.gateway
            .bridge(ctx, Operation::UploadProviderBinaryZip, None)
            .forward_client_stream::<UploadProviderBinaryZipRequest, Response, _, _, _>(
                client,
                storage.upload_provider_binary_zip(ctx),
                Response::new(Artifact::BinaryZip.uploaded_message()),
            )
            .await
    }

    pub async fn upload_shasum<C>(&self, ctx: &CallContext, client: &mut C) -> Result<Response>
    where
        C: MessageSource<UploadShasumRequest> + ?Sized,
    {
        let storage = &self.gateway.backends().provider_storage;
        self.gateway
            .bridge(ctx, Operation::UploadShasum, None)
            .forward_client_stream::<UploadShasumRequest, Response, _, _, _>(
                client,
                storage.upload_shasum(ctx),
                Response::new(Artifact::Shasum.uploaded_message()),
            )
            .await
    }

    pub async fn upload_shasum_signature<C>(
        &self,
        ctx: &CallContext,
        client: &mut C,
    ) -> Result<Response>
    where
        C: MessageSource<UploadShasumSignatureRequest> + ?Sized,
    {
        let storage = &self.gateway.backends().provider_storage;
        self.gateway
            .bridge(ctx, Operation::UploadShasumSignature, None)
            .forward_client_stream::<UploadShasumSignatureRequest, Response, _, _, _>(
                client,
                storage.upload_shasum_signature(ctx),
                Response::new(Artifact::ShasumSignature.uploaded_message()),
            )
            .await
    }

    pub async fn download_provider_source_zip<K>(
        &self,
        ctx: &CallContext,
        request: DownloadProviderSourceZipRequest,
        client: &mut K,
    ) -> Result<()>
    where
        K: MessageSink<SourceZipResponse> + ?Sized,
    {
        let storage = &self.gateway.backends().provider_storage;
        let resource = Some(format!("{} {}_{}", request.provider, request.os, request.arch));
        self.gateway
            .bridge(ctx, Operation::DownloadProviderSourceZip, resource)
            .forward_server_stream::<SourceZipResponse, _, _, _>(
                storage.download_provider_source_zip(ctx, request),
                client,
            )
            .await
    }

    pub async fn download_shasum<K>(
        &self,
        ctx: &CallContext,
        request: DownloadShasumRequest,
        client: &mut K,
    ) -> Result<()>
    where
        K: MessageSink<DownloadShasumResponse> + ?Sized,
    {
        let storage = &self.gateway.backends().provider_storage;
        let resource = Some(request.provider.to_string());
        self.gateway
            .bridge(ctx, Operation::DownloadShasum, resource)
            .forward_server_stream::<DownloadShasumResponse, _, _, _>(
                storage.download_shasum(ctx, request),
                client,
            )
            .await
    }

    pub async fn download_shasum_signature<K>(
        &self,
        ctx: &CallContext,
        request: DownloadShasumSignatureRequest,
        client: &mut K,
    ) -> Result<()>
    where
        K: MessageSink<DownloadShasumResponse> + ?Sized,
    {
        let storage = &self.gateway.backends().provider_storage;
        let resource = Some(request.provider.to_string());
        self.gateway
            .bridge(ctx, Operation::DownloadShasumSignature, resource)
            .forward_server_stream::<DownloadShasumResponse, _, _, _>(
                storage.download_shasum_signature(ctx, request),
                client,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local;
    use bytes::Bytes;
    use canopy_core::messages::{VersionAction, VersionedName};
    use canopy_core::{message_channel, StorageConfig, StorageService};
    use canopy_objectstore::MemoryObjectStore;
    use std::sync::Arc;
    use tonic::Code;

    async fn gateway() -> Gateway {
        let config = StorageConfig::new("registry", "eu-west-1");
        let storage = StorageService::new(MemoryObjectStore::new(), config).unwrap();
        storage.initialize().await.unwrap();
        Gateway::new(local::all_in_one(Arc::new(storage)))
    }

    fn aws() -> VersionedName {
        VersionedName::new("cie/aws", "5.1.0")
    }

    #[tokio::test]
    async fn test_shasum_and_signature_are_separate_objects() {
        let gateway = gateway().await;
        let ctx = CallContext::new();
        let providers = gateway.providers();

        let (mut sink, mut source) = message_channel(4);
        sink.send(UploadShasumRequest {
            provider: aws(),
            shasum_data_chunk: Bytes::from_static(b"abc123  terraform-provider-aws.zip\n"),
        })
        .await
        .unwrap();
        drop(sink);
        let reply = providers.upload_shasum(&ctx, &mut source).await.unwrap();
        assert_eq!(reply.message, Artifact::Shasum.uploaded_message());

        let (mut sink, mut source) = message_channel(4);
        sink.send(UploadShasumSignatureRequest {
            provider: aws(),
            shasum_data_chunk: Bytes::from_static(b"signature"),
        })
        .await
        .unwrap();
        drop(sink);
        providers
            .upload_shasum_signature(&ctx, &mut source)
            .await
            .unwrap();

        let (mut sink, mut source) = message_channel::<DownloadShasumResponse>(4);
        providers
            .download_shasum(&ctx, DownloadShasumRequest { provider: aws() }, &mut sink)
            .await
            .unwrap();
        drop(sink);

        let message = source.recv().await.unwrap().unwrap();
        assert_eq!(
            message.shasum_data_chunk,
            Bytes::from_static(b"abc123  terraform-provider-aws.zip\n")
        );
        assert!(source.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_binary_download_for_other_platform_is_not_found() {
        let gateway = gateway().await;
        let ctx = CallContext::new();
        let providers = gateway.providers();

        let (mut sink, mut source) = message_channel(4);
        sink.send(UploadProviderBinaryZipRequest {
            provider: aws(),
            os: "linux".to_string(),
            arch: "amd64".to_string(),
            zip_data_chunk: Bytes::from_static(b"PK\x03\x04"),
        })
        .await
        .unwrap();
        drop(sink);
        providers
            .upload_provider_binary_zip(&ctx, &mut source)
            .await
            .unwrap();

        let (mut sink, _source) = message_channel::<SourceZipResponse>(4);
        let err = providers
            .download_provider_source_zip(
                &ctx,
                DownloadProviderSourceZipRequest {
                    provider: aws(),
                    os: "darwin".to_string(),
                    arch: "arm64".to_string(),
                },
                &mut sink,
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), Code::NotFound);
    }

    #[tokio::test]
    async fn test_published_release_lists_platforms() {
        let gateway = gateway().await;
        let ctx = CallContext::new();
        let providers = gateway.providers();

        providers
            .register(
                &ctx,
                RegisterProviderRequest {
                    name: "cie/aws".to_string(),
                    version: "5.1.0".to_string(),
                    protocols: vec!["5.0".to_string()],
                    platforms: vec![PlatformItem {
                        os: "linux".to_string(),
                        arch: "amd64".to_string(),
                        shasum: "deadbeef".to_string(),
                        ..Default::default()
                    }],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(providers.list_versions(&ctx, "cie/aws").await.unwrap().is_empty());

        let session = providers
            .begin_version(&ctx, BeginVersionRequest { module: aws() })
            .await
            .unwrap();
        providers
            .end_version(
                &ctx,
                EndVersionRequest {
                    session_key: session.session_key,
                    module: aws(),
                    action: VersionAction::Publish.as_i32(),
                },
            )
            .await
            .unwrap();

        let versions = providers.list_versions(&ctx, "cie/aws").await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version, "5.1.0");
        assert_eq!(versions[0].platforms[0].arch, "amd64");

        let package = providers
            .platform(
                &ctx,
                ProviderPlatformRequest {
                    provider: aws(),
                    os: "linux".to_string(),
                    arch: "amd64".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(package.shasum, "deadbeef");
    }
}
