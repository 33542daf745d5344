//! Generic create/read/update/delete over the business entities.
//!
//! Each entity implements [`Resource`] (queries, labels, search and CSV
//! columns) and its submitted form implements [`ResourceForm`]. The flows
//! here are the only place mutations happen, so every successful one writes
//! exactly one audit event.

use std::borrow::Cow;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sqlite::SqliteConnection;
use diesel::QueryResult;
use rocket::http::Status;
use serde::Serialize;

use crate::audit::{ActivityLogger, AuditContext, ViewMark};

#[derive(Debug, thiserror::Error)]
pub enum CrudError {
    #[error("{0}")]
    Validation(String),
    #[error("record not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] DieselError),
    #[error("no database connection: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

impl CrudError {
    pub fn invalid(message: impl Into<String>) -> Self {
        CrudError::Validation(message.into())
    }

    /// Maps a unique-constraint failure to a validation message.
    pub fn unique(err: DieselError, message: &str) -> Self {
        match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                CrudError::invalid(message)
            }
            other => CrudError::Database(other),
        }
    }
}

impl From<CrudError> for Status {
    fn from(err: CrudError) -> Self {
        match err {
            CrudError::NotFound => Status::NotFound,
            CrudError::Validation(_) => Status::BadRequest,
            other => {
                log::error!("Request failed: {}", other);
                Status::InternalServerError
            }
        }
    }
}

/// A listable, editable business entity.
pub trait Resource: Serialize + Sized {
    /// Validated field values for insert and update.
    type Input;

    /// Name used as the audit target entity and in messages.
    const ENTITY: &'static str;

    const CSV_HEADER: &'static [&'static str] = &[];

    fn list(conn: &mut SqliteConnection) -> QueryResult<Vec<Self>>;

    fn find(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<Self>>;

    /// Inserts and returns the new id.
    fn insert(conn: &mut SqliteConnection, input: &Self::Input) -> Result<i32, CrudError>;

    /// Number of rows touched.
    fn update(conn: &mut SqliteConnection, id: i32, input: &Self::Input) -> Result<usize, CrudError>;

    fn delete(conn: &mut SqliteConnection, id: i32) -> QueryResult<usize>;

    fn id(&self) -> i32;

    /// Human-readable name for audit descriptions.
    fn label(&self) -> String;

    /// Text fields matched by the listing search.
    fn search_fields(&self) -> Vec<&str>;

    fn csv_row(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A submitted create/update form.
pub trait ResourceForm {
    type Input;

    /// Present when the form edits an existing record.
    fn edit_id(&self) -> Option<i32>;

    fn validate(self, editing: bool) -> Result<Self::Input, CrudError>;
}

pub enum Saved<R> {
    Created(R),
    Updated(R),
}

impl<R> Saved<R> {
    pub fn record(&self) -> &R {
        match self {
            Saved::Created(r) | Saved::Updated(r) => r,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Saved::Created(_) => "created",
            Saved::Updated(_) => "updated",
        }
    }
}

/// Case-insensitive substring match over any of `fields`.
pub fn matches(fields: &[&str], needle: &str) -> bool {
    let needle = needle.to_lowercase();
    fields.iter().any(|f| f.to_lowercase().contains(&needle))
}

fn normalized(search: Option<&str>) -> Option<&str> {
    search.map(str::trim).filter(|s| !s.is_empty())
}

/// All records, narrowed by `search` when one is given.
pub fn search<R: Resource>(conn: &mut SqliteConnection, search: Option<&str>) -> Result<Vec<R>, CrudError> {
    let rows = R::list(conn)?;
    Ok(match normalized(search) {
        Some(needle) => rows
            .into_iter()
            .filter(|r| matches(&r.search_fields(), needle))
            .collect(),
        None => rows,
    })
}

/// Data behind a listing page.
#[derive(Serialize)]
pub struct Listing<R> {
    pub records: Vec<R>,
    pub editing: Option<R>,
    pub search: String,
}

/// Listing plus the record selected for editing. Opening a record for edit
/// is recorded as a view of that record.
pub fn listing<R: Resource>(
    conn: &mut SqliteConnection,
    logger: &ActivityLogger,
    ctx: &AuditContext,
    mark: &ViewMark,
    search_text: Option<&str>,
    edit: Option<i32>,
) -> Result<Listing<R>, CrudError> {
    let editing = match edit {
        Some(id) => {
            let record = R::find(conn, id)?.ok_or(CrudError::NotFound)?;
            logger.log_view(ctx, mark, R::ENTITY, Some(id), Some(&record.label()));
            Some(record)
        }
        None => None,
    };

    Ok(Listing {
        records: search::<R>(conn, search_text)?,
        editing,
        search: normalized(search_text).unwrap_or_default().to_string(),
    })
}

/// Creates or updates from a submitted form.
pub fn save<R, F>(
    conn: &mut SqliteConnection,
    logger: &ActivityLogger,
    ctx: &AuditContext,
    form: F,
) -> Result<Saved<R>, CrudError>
where
    R: Resource,
    F: ResourceForm<Input = R::Input>,
{
    match form.edit_id() {
        Some(id) => {
            R::find(conn, id)?.ok_or(CrudError::NotFound)?;
            let input = form.validate(true)?;
            if R::update(conn, id, &input)? == 0 {
                return Err(CrudError::NotFound);
            }
            let record = R::find(conn, id)?.ok_or(CrudError::NotFound)?;
            logger.log_update(ctx, R::ENTITY, id, &record.label());
            Ok(Saved::Updated(record))
        }
        None => {
            let input = form.validate(false)?;
            let id = R::insert(conn, &input)?;
            let record = R::find(conn, id)?.ok_or(CrudError::NotFound)?;
            logger.log_create(ctx, R::ENTITY, id, &record.label());
            Ok(Saved::Created(record))
        }
    }
}

/// Deletes one record; the returned value is the record as it was.
pub fn remove<R: Resource>(
    conn: &mut SqliteConnection,
    logger: &ActivityLogger,
    ctx: &AuditContext,
    id: i32,
) -> Result<R, CrudError> {
    let record = R::find(conn, id)?.ok_or(CrudError::NotFound)?;
    if R::delete(conn, id)? == 0 {
        return Err(CrudError::NotFound);
    }
    logger.log_delete(ctx, R::ENTITY, id, &record.label());
    Ok(record)
}

/// CSV of the (searched) listing; records one export event.
pub fn export<R: Resource>(
    conn: &mut SqliteConnection,
    logger: &ActivityLogger,
    ctx: &AuditContext,
    search_text: Option<&str>,
) -> Result<String, CrudError> {
    let records = search::<R>(conn, search_text)?;
    let csv = to_csv(R::CSV_HEADER, records.iter().map(R::csv_row));
    logger.log_export(ctx, R::ENTITY, "CSV");
    Ok(csv)
}

fn escape(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

fn push_line<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    let line: Vec<Cow<'a, str>> = fields.map(escape).collect();
    out.push_str(&line.join(","));
    out.push_str("\r\n");
}

/// RFC 4180 text: header line, then one line per row.
pub fn to_csv<I>(header: &[&str], rows: I) -> String
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut out = String::new();
    push_line(&mut out, header.iter().copied());
    for row in rows {
        push_line(&mut out, row.iter().map(String::as_str));
    }
    out
}

// Form field helpers. Rocket hands every field over as an optional string so
// that a malformed value becomes a message instead of a rejected request.

pub fn required(value: Option<String>, field: &str) -> Result<String, CrudError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CrudError::invalid(format!("{field} is required.")))
}

pub fn optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub fn required_parse<T: FromStr>(value: Option<String>, field: &str) -> Result<T, CrudError> {
    required(value, field)?
        .parse()
        .map_err(|_| CrudError::invalid(format!("{field} is not a valid value.")))
}

pub fn parse_date(value: Option<String>, field: &str) -> Result<NaiveDate, CrudError> {
    let raw = required(value, field)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|_| CrudError::invalid(format!("{field} must be a date (YYYY-MM-DD).")))
}

/// Accepts `datetime-local` input values as well as a space-separated form.
pub fn parse_datetime(value: Option<String>, field: &str) -> Result<NaiveDateTime, CrudError> {
    let raw = required(value, field)?;
    ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&raw, fmt).ok())
        .ok_or_else(|| CrudError::invalid(format!("{field} must be a date and time.")))
}
