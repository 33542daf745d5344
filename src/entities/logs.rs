//! Read-only view over the activity log.

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::Serialize;

use crate::audit::{ActivityLogger, AuditAction, AuditContext};
use crate::crud::{self, CrudError};
use crate::entities::reservations::DATE_FORMAT;
use crate::models::AuditEvent;
use crate::schema::{audit_events, users};

/// Number of events shown on the log page.
pub const PAGE_SIZE: i64 = 100;

const CSV_HEADER: &[&str] = &["User", "Action", "Description", "Date", "Table", "Element ID", "IP Address"];

#[derive(Debug, Clone, Serialize)]
pub struct LogRow {
    #[serde(flatten)]
    pub event: AuditEvent,
    pub username: Option<String>,
    pub user_display: String,
    pub action_label: String,
}

type RowTuple = (AuditEvent, Option<String>, Option<String>, Option<String>);

fn into_row((event, username, first_name, last_name): RowTuple) -> LogRow {
    let full = format!(
        "{} {}",
        first_name.unwrap_or_default(),
        last_name.unwrap_or_default()
    );
    let user_display = match (full.trim(), &username) {
        (_, None) => "Anonymous".to_string(),
        ("", Some(username)) => username.clone(),
        (full, Some(_)) => full.to_string(),
    };
    let action_label = event
        .action
        .parse::<AuditAction>()
        .map(|a| a.label().to_string())
        .unwrap_or_else(|_| event.action.clone());

    LogRow { event, username, user_display, action_label }
}

impl LogRow {
    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![
            self.user_display.as_str(),
            self.event.action.as_str(),
            self.event.description.as_str(),
        ];
        fields.extend(self.username.as_deref());
        fields.extend(self.event.target_entity.as_deref());
        fields
    }

    fn csv_row(&self) -> Vec<String> {
        vec![
            self.user_display.clone(),
            self.action_label.clone(),
            self.event.description.clone(),
            self.event.created_at.format(DATE_FORMAT).to_string(),
            self.event.target_entity.clone().unwrap_or_default(),
            self.event.target_id.map(|id| id.to_string()).unwrap_or_default(),
            self.event.ip_address.clone().unwrap_or_default(),
        ]
    }
}

/// Newest first, at most `limit` rows when given.
pub fn latest(conn: &mut SqliteConnection, limit: Option<i64>) -> QueryResult<Vec<LogRow>> {
    let mut query = audit_events::table
        .left_join(users::table)
        .order((audit_events::created_at.desc(), audit_events::id.desc()))
        .select((
            AuditEvent::as_select(),
            users::username.nullable(),
            users::first_name.nullable(),
            users::last_name.nullable(),
        ))
        .into_boxed();
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    let rows = query.load::<RowTuple>(conn)?;
    Ok(rows.into_iter().map(into_row).collect())
}

fn filtered(rows: Vec<LogRow>, search: Option<&str>) -> Vec<LogRow> {
    match search.map(str::trim).filter(|s| !s.is_empty()) {
        Some(needle) => rows
            .into_iter()
            .filter(|r| crud::matches(&r.search_fields(), needle))
            .collect(),
        None => rows,
    }
}

/// The log page: latest events matching `search`.
pub fn page(conn: &mut SqliteConnection, search: Option<&str>) -> Result<Vec<LogRow>, CrudError> {
    let mut rows = filtered(latest(conn, None)?, search);
    rows.truncate(PAGE_SIZE as usize);
    Ok(rows)
}

/// Every matching event as CSV; records one export event.
pub fn export(
    conn: &mut SqliteConnection,
    logger: &ActivityLogger,
    ctx: &AuditContext,
    search: Option<&str>,
) -> Result<String, CrudError> {
    let rows = filtered(latest(conn, None)?, search);
    let csv = crud::to_csv(CSV_HEADER, rows.iter().map(LogRow::csv_row));
    logger.log_export(ctx, "Log", "CSV");
    Ok(csv)
}
