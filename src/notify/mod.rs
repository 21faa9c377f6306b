use async_trait::async_trait;
use uuid::Uuid;

use crate::model::permission::PermissionLevel;
use crate::model::resource::Resource;

/// Outbound notification hook. Delivery, templating and retry live entirely
/// outside the core; failures here never fail the triggering operation.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn access_granted(
        &self,
        target_user: Uuid,
        resource: &Resource,
        level: PermissionLevel,
        granted_by: Uuid,
    );
}

/// Default notifier that only logs.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn access_granted(
        &self,
        target_user: Uuid,
        resource: &Resource,
        level: PermissionLevel,
        granted_by: Uuid,
    ) {
        tracing::debug!(
            "notification skipped: access_granted user={} resource={}/{} level={} by={}",
            target_user,
            resource.kind,
            resource.id,
            level,
            granted_by
        );
    }
}
