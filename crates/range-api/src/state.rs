use std::sync::Arc;

use crate::config::Config;
use crate::db::PgPool;
use crate::engine::EnginePool;
use crate::logstore::RequestLogStore;
use crate::services::admins::AdminService;
use crate::services::images::ImageService;
use crate::services::instances::InstanceService;

/// Shared application state passed to all route handlers. Everything here is
/// constructed once during boot and handed down explicitly.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: PgPool,
    pub engines: Arc<EnginePool>,
    pub instances: InstanceService,
    pub images: ImageService,
    pub admins: AdminService,
    pub request_logs: RequestLogStore,
}
