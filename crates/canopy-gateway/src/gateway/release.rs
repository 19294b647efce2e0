//! Release family operations

use super::{Gateway, Operation};
use canopy_core::messages::{PublishRequest, Response};
use canopy_core::{CallContext, Result};

/// Release operations of a [`Gateway`]
pub struct ReleaseGateway<'g> {
    gateway: &'g Gateway,
}

impl<'g> ReleaseGateway<'g> {
    pub(super) fn new(gateway: &'g Gateway) -> Self {
        Self { gateway }
    }

    /// Announce a published module or provider version
    pub async fn publish(&self, ctx: &CallContext, request: PublishRequest) -> Result<Response> {
        let publisher = &self.gateway.backends().releases;
        let resource = Some(format!(
            "{}/{}@{}",
            request.organization, request.name, request.version
        ));
        self.gateway
            .unary(ctx, Operation::PublishRelease, resource, publisher.publish(request))
            .await
    }
}
