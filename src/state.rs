use crate::audit::{ActivityLogger, DbAuditSink};
use crate::db::DbPool;
use crate::session::InactivityPolicy;
use crate::settings::Settings;

/// Shared state managed by Rocket.
pub struct AppState {
    pub db_pool: DbPool,
    pub audit: ActivityLogger,
    pub inactivity: InactivityPolicy,
    pub settings: Settings,
}

impl AppState {
    pub fn new(db_pool: DbPool, settings: Settings) -> Self {
        Self {
            audit: ActivityLogger::new(DbAuditSink::new(db_pool.clone())),
            inactivity: InactivityPolicy::new(settings.auto_logout_delay),
            db_pool,
            settings,
        }
    }
}
