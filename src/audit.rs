//! Append-only activity log.
//!
//! Every write goes through [`ActivityLogger::record`], which stamps the event
//! at write time and swallows sink failures so the request that triggered the
//! event is never aborted. Failures surface only in the process log.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use diesel::prelude::*;
use log::warn;
use serde::Serialize;

use crate::db::DbPool;
use crate::models::NewAuditEvent;
use crate::rbac::UnknownVariant;
use crate::schema::audit_events;

/// Target entity name used for events about user accounts.
pub const USER_ENTITY: &str = "auth_user";

/// Closed set of audit actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Login,
    Logout,
    AutoLogout,
    Create,
    Update,
    Delete,
    View,
    Export,
    Import,
    PasswordChange,
    ProfileUpdate,
    ThemeChange,
    ReportSent,
    StockAlert,
    System,
}

impl AuditAction {
    pub const ALL: [AuditAction; 15] = [
        AuditAction::Login,
        AuditAction::Logout,
        AuditAction::AutoLogout,
        AuditAction::Create,
        AuditAction::Update,
        AuditAction::Delete,
        AuditAction::View,
        AuditAction::Export,
        AuditAction::Import,
        AuditAction::PasswordChange,
        AuditAction::ProfileUpdate,
        AuditAction::ThemeChange,
        AuditAction::ReportSent,
        AuditAction::StockAlert,
        AuditAction::System,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Login => "login",
            AuditAction::Logout => "logout",
            AuditAction::AutoLogout => "auto_logout",
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::View => "view",
            AuditAction::Export => "export",
            AuditAction::Import => "import",
            AuditAction::PasswordChange => "password_change",
            AuditAction::ProfileUpdate => "profile_update",
            AuditAction::ThemeChange => "theme_change",
            AuditAction::ReportSent => "report_sent",
            AuditAction::StockAlert => "stock_alert",
            AuditAction::System => "system",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AuditAction::Login => "User Login",
            AuditAction::Logout => "User Logout",
            AuditAction::AutoLogout => "Auto Logout",
            AuditAction::Create => "Create Record",
            AuditAction::Update => "Update Record",
            AuditAction::Delete => "Delete Record",
            AuditAction::View => "View Record",
            AuditAction::Export => "Export Data",
            AuditAction::Import => "Import Data",
            AuditAction::PasswordChange => "Password Change",
            AuditAction::ProfileUpdate => "Profile Update",
            AuditAction::ThemeChange => "Theme Change",
            AuditAction::ReportSent => "Report Sent",
            AuditAction::StockAlert => "Stock Alert",
            AuditAction::System => "System Action",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

/// The identity an event is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: i32,
    pub username: String,
}

/// Request-derived fields attached to every event.
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    pub actor: Option<Actor>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditContext {
    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }
}

/// First hop of `X-Forwarded-For` when present, otherwise the peer address.
pub fn client_ip(forwarded_for: Option<&str>, peer: Option<IpAddr>) -> Option<String> {
    forwarded_for
        .and_then(|list| list.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|ip| ip.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("no database connection: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("insert failed: {0}")]
    Insert(#[from] diesel::result::Error),
}

/// Where audit events are appended.
pub trait AuditSink: Send + Sync {
    fn append(&self, event: &NewAuditEvent) -> Result<(), AuditError>;
}

/// Appends to the `audit_events` table through the shared pool.
pub struct DbAuditSink {
    pool: DbPool,
}

impl DbAuditSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl AuditSink for DbAuditSink {
    fn append(&self, event: &NewAuditEvent) -> Result<(), AuditError> {
        let mut conn = self.pool.get()?;
        diesel::insert_into(audit_events::table)
            .values(event)
            .execute(&mut conn)?;
        Ok(())
    }
}

/// Per-request "a page view was already recorded" marker.
#[derive(Debug, Default)]
pub struct ViewMark(AtomicBool);

impl ViewMark {
    /// True for the first caller only.
    pub fn claim(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    pub fn is_claimed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Clone)]
pub struct ActivityLogger {
    sink: Arc<dyn AuditSink>,
}

impl ActivityLogger {
    pub fn new(sink: impl AuditSink + 'static) -> Self {
        Self { sink: Arc::new(sink) }
    }

    /// Writes one event. Never fails.
    pub fn record(
        &self,
        ctx: &AuditContext,
        action: AuditAction,
        description: &str,
        target_entity: Option<&str>,
        target_id: Option<i32>,
    ) {
        let event = NewAuditEvent {
            user_id: ctx.actor.as_ref().map(|a| a.id),
            action: action.as_str().to_string(),
            description: description.to_string(),
            target_entity: target_entity.map(str::to_string),
            target_id,
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
            created_at: Utc::now().naive_utc(),
        };

        if let Err(e) = self.sink.append(&event) {
            warn!("Logging failed for {} event: {}", action, e);
        }
    }

    pub fn log_login(&self, ctx: &AuditContext, user: &Actor) {
        self.record(
            ctx,
            AuditAction::Login,
            &format!("User '{}' logged in successfully", user.username),
            Some(USER_ENTITY),
            Some(user.id),
        );
    }

    pub fn log_logout(&self, ctx: &AuditContext, user: &Actor) {
        self.record(
            ctx,
            AuditAction::Logout,
            &format!("User '{}' logged out", user.username),
            Some(USER_ENTITY),
            Some(user.id),
        );
    }

    pub fn log_auto_logout(&self, ctx: &AuditContext, user: &Actor) {
        self.record(
            ctx,
            AuditAction::AutoLogout,
            &format!("User '{}' automatically logged out due to inactivity", user.username),
            Some(USER_ENTITY),
            Some(user.id),
        );
    }

    pub fn log_create(&self, ctx: &AuditContext, entity: &str, id: i32, name: &str) {
        self.record(ctx, AuditAction::Create, &format!("Created {entity}: {name}"), Some(entity), Some(id));
    }

    pub fn log_update(&self, ctx: &AuditContext, entity: &str, id: i32, name: &str) {
        self.record(ctx, AuditAction::Update, &format!("Updated {entity}: {name}"), Some(entity), Some(id));
    }

    pub fn log_delete(&self, ctx: &AuditContext, entity: &str, id: i32, name: &str) {
        self.record(ctx, AuditAction::Delete, &format!("Deleted {entity}: {name}"), Some(entity), Some(id));
    }

    /// Records a view unless one was already recorded for this request.
    pub fn log_view(
        &self,
        ctx: &AuditContext,
        mark: &ViewMark,
        entity: &str,
        id: Option<i32>,
        name: Option<&str>,
    ) -> bool {
        if !mark.claim() {
            return false;
        }
        let description = match name {
            Some(name) => format!("Viewed {entity}: {name}"),
            None => format!("Viewed {entity}"),
        };
        self.record(ctx, AuditAction::View, &description, Some(entity), id);
        true
    }

    /// Generic page view, skipped for denylisted route names.
    pub fn log_page_view(
        &self,
        ctx: &AuditContext,
        mark: &ViewMark,
        view_name: &str,
        skip: &[String],
    ) -> bool {
        if skip.iter().any(|s| view_name.contains(s.as_str())) || !mark.claim() {
            return false;
        }
        self.record(
            ctx,
            AuditAction::View,
            &format!("Viewed page: {view_name}"),
            Some("page_view"),
            None,
        );
        true
    }

    pub fn log_export(&self, ctx: &AuditContext, entity: &str, format: &str) {
        self.record(
            ctx,
            AuditAction::Export,
            &format!("Exported {entity} data in {format} format"),
            Some(entity),
            None,
        );
    }

    pub fn log_password_change(&self, ctx: &AuditContext, user: &Actor) {
        self.record(
            ctx,
            AuditAction::PasswordChange,
            &format!("User '{}' changed their password", user.username),
            Some(USER_ENTITY),
            Some(user.id),
        );
    }

    pub fn log_profile_update(&self, ctx: &AuditContext, user: &Actor) {
        self.record(
            ctx,
            AuditAction::ProfileUpdate,
            &format!("User '{}' updated their profile", user.username),
            Some(USER_ENTITY),
            Some(user.id),
        );
    }

    pub fn log_theme_change(&self, ctx: &AuditContext, user: &Actor, theme: &str) {
        self.record(
            ctx,
            AuditAction::ThemeChange,
            &format!("User '{}' changed theme to {theme}", user.username),
            Some(USER_ENTITY),
            Some(user.id),
        );
    }

    pub fn log_report_sent(&self, ctx: &AuditContext, sender: &str, subject: &str, recipient: &str) {
        self.record(
            ctx,
            AuditAction::ReportSent,
            &format!("User '{sender}' sent report '{subject}' to {recipient}"),
            Some("Report"),
            None,
        );
    }

    pub fn log_stock_alert(&self, ctx: &AuditContext, product: &str, quantity: i32, threshold: i32) {
        self.record(
            ctx,
            AuditAction::StockAlert,
            &format!("Stock alert: {product} has {quantity} items remaining (threshold: {threshold})"),
            Some("Product"),
            None,
        );
    }

    pub fn log_system(&self, ctx: &AuditContext, description: &str) {
        self.record(ctx, AuditAction::System, description, None, None);
    }
}


#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::testing::memory_logger;
    use super::*;

    fn ctx() -> AuditContext {
        AuditContext {
            actor: Some(Actor { id: 7, username: "alice".into() }),
            ip_address: Some("10.0.0.1".into()),
            user_agent: Some("test-agent".into()),
        }
    }

    #[test]
    fn forwarded_for_takes_precedence() {
        let peer = Some(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)));
        assert_eq!(client_ip(Some("203.0.113.9, 10.0.0.2"), peer).as_deref(), Some("203.0.113.9"));
        assert_eq!(client_ip(None, peer).as_deref(), Some("127.0.0.1"));
        assert_eq!(client_ip(Some("  "), peer).as_deref(), Some("127.0.0.1"));
        assert_eq!(client_ip(None, None), None);
    }

    #[test]
    fn create_wrapper_formats_description() {
        let (logger, sink) = memory_logger();
        logger.log_create(&ctx(), "Client", 3, "Jane Doe");

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.action, "create");
        assert_eq!(event.description, "Created Client: Jane Doe");
        assert_eq!(event.target_entity.as_deref(), Some("Client"));
        assert_eq!(event.target_id, Some(3));
        assert_eq!(event.user_id, Some(7));
        assert_eq!(event.ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(event.user_agent.as_deref(), Some("test-agent"));
    }

    #[test]
    fn anonymous_events_have_no_actor() {
        let (logger, sink) = memory_logger();
        logger.log_system(&AuditContext::default(), "startup");
        let events = sink.events.lock().unwrap();
        assert_eq!(events[0].user_id, None);
        assert_eq!(events[0].action, "system");
    }

    #[test]
    fn sink_failure_is_swallowed() {
        let (logger, sink) = memory_logger();
        sink.failing.store(true, Ordering::Release);
        logger.log_delete(&ctx(), "Animal", 1, "Rex");
        assert!(sink.events.lock().unwrap().is_empty());
    }

    #[test]
    fn at_most_one_view_per_request() {
        let (logger, sink) = memory_logger();
        let mark = ViewMark::default();

        assert!(logger.log_view(&ctx(), &mark, "Client", Some(1), Some("Jane Doe")));
        assert!(!logger.log_view(&ctx(), &mark, "Client", Some(1), Some("Jane Doe")));
        assert!(!logger.log_page_view(&ctx(), &mark, "clients", &[]));

        assert_eq!(sink.actions(), vec!["view"]);
    }

    #[test]
    fn denylisted_views_are_skipped_without_claiming() {
        let (logger, sink) = memory_logger();
        let mark = ViewMark::default();
        let skip = vec!["static".to_string()];

        assert!(!logger.log_page_view(&ctx(), &mark, "FileServer: static", &skip));
        assert!(!mark.is_claimed());
        assert!(logger.log_page_view(&ctx(), &mark, "dashboard", &skip));
        assert_eq!(sink.events.lock().unwrap()[0].description, "Viewed page: dashboard");
    }

    #[test]
    fn action_text_round_trips() {
        for action in AuditAction::ALL {
            assert_eq!(action.as_str().parse::<AuditAction>(), Ok(action));
        }
        assert!("rename".parse::<AuditAction>().is_err());
    }
}
