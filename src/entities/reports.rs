use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::Serialize;

use crate::crud::{self, CrudError, Resource, ResourceForm};
use crate::db::last_insert_id;
use crate::entities::reservations::DATE_FORMAT;
use crate::models::{Report, ReportInput};
use crate::schema::{reports, users};

/// A report with its sender's username, if the sender still exists.
#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    #[serde(flatten)]
    pub report: Report,
    pub sender: Option<String>,
}

#[derive(Debug, FromForm)]
pub struct ReportForm {
    pub edit_id: Option<i32>,
    pub user: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
    pub sent_at: Option<String>,
    pub recipient: Option<String>,
}

impl ResourceForm for ReportForm {
    type Input = ReportInput;

    fn edit_id(&self) -> Option<i32> {
        self.edit_id
    }

    fn validate(self, _editing: bool) -> Result<ReportInput, CrudError> {
        Ok(ReportInput {
            user_id: Some(crud::required_parse(self.user, "User")?),
            subject: crud::required(self.subject, "Subject")?,
            message: crud::required(self.message, "Message")?,
            sent_at: crud::parse_datetime(self.sent_at, "Date")?,
            recipient: crud::required(self.recipient, "Recipient")?,
        })
    }
}

fn sender_exists(conn: &mut SqliteConnection, input: &ReportInput) -> Result<(), CrudError> {
    let Some(user_id) = input.user_id else {
        return Ok(());
    };
    let found: i64 = users::table
        .filter(users::id.eq(user_id))
        .count()
        .get_result(conn)?;
    if found == 0 {
        return Err(CrudError::invalid("Selected user does not exist."));
    }
    Ok(())
}

impl Resource for ReportRow {
    type Input = ReportInput;

    const ENTITY: &'static str = "Report";
    const CSV_HEADER: &'static [&'static str] = &["User", "Subject", "Message", "Date", "Recipient"];

    fn list(conn: &mut SqliteConnection) -> QueryResult<Vec<Self>> {
        let rows = reports::table
            .left_join(users::table)
            .order(reports::sent_at.desc())
            .select((Report::as_select(), users::username.nullable()))
            .load::<(Report, Option<String>)>(conn)?;
        Ok(rows
            .into_iter()
            .map(|(report, sender)| ReportRow { report, sender })
            .collect())
    }

    fn find(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<Self>> {
        let row = reports::table
            .left_join(users::table)
            .filter(reports::id.eq(id))
            .select((Report::as_select(), users::username.nullable()))
            .first::<(Report, Option<String>)>(conn)
            .optional()?;
        Ok(row.map(|(report, sender)| ReportRow { report, sender }))
    }

    fn insert(conn: &mut SqliteConnection, input: &ReportInput) -> Result<i32, CrudError> {
        sender_exists(conn, input)?;
        diesel::insert_into(reports::table).values(input).execute(conn)?;
        Ok(last_insert_id(conn)?)
    }

    fn update(conn: &mut SqliteConnection, id: i32, input: &ReportInput) -> Result<usize, CrudError> {
        sender_exists(conn, input)?;
        Ok(diesel::update(reports::table.find(id)).set(input).execute(conn)?)
    }

    fn delete(conn: &mut SqliteConnection, id: i32) -> QueryResult<usize> {
        diesel::delete(reports::table.find(id)).execute(conn)
    }

    fn id(&self) -> i32 {
        self.report.id
    }

    fn label(&self) -> String {
        self.report.subject.clone()
    }

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.report.subject.as_str(), self.report.recipient.as_str()];
        if let Some(sender) = &self.sender {
            fields.push(sender.as_str());
        }
        fields
    }

    fn csv_row(&self) -> Vec<String> {
        vec![
            self.sender.clone().unwrap_or_default(),
            self.report.subject.clone(),
            self.report.message.clone(),
            self.report.sent_at.format(DATE_FORMAT).to_string(),
            self.report.recipient.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::audit::testing::memory_logger;
    use crate::audit::AuditContext;
    use crate::db::testing::temp_pool;
    use crate::models::NewUser;

    fn sender(conn: &mut SqliteConnection) -> i32 {
        diesel::insert_into(users::table)
            .values(&NewUser {
                username: "drvet",
                email: "vet@example.com",
                first_name: "Dr",
                last_name: "Vet",
                password_hash: "x",
                is_active: true,
                is_superuser: false,
                date_joined: Utc::now().naive_utc(),
            })
            .execute(conn)
            .unwrap();
        last_insert_id(conn).unwrap()
    }

    fn form(user: i32) -> ReportForm {
        ReportForm {
            edit_id: None,
            user: Some(user.to_string()),
            subject: Some("Monthly stock".into()),
            message: Some("Line one\nLine two".into()),
            sent_at: Some("2025-04-01T17:00".into()),
            recipient: Some("owner@clinic.test".into()),
        }
    }

    #[test]
    fn export_quotes_multiline_messages() {
        let (pool, _dir) = temp_pool();
        let mut conn = pool.get().unwrap();
        let (logger, _sink) = memory_logger();
        let user = sender(&mut conn);
        crud::save::<ReportRow, _>(&mut conn, &logger, &AuditContext::default(), form(user)).unwrap();

        let csv = crud::export::<ReportRow>(&mut conn, &logger, &AuditContext::default(), None).unwrap();
        assert_eq!(
            csv,
            "User,Subject,Message,Date,Recipient\r\n\
             drvet,Monthly stock,\"Line one\nLine two\",2025-04-01 17:00,owner@clinic.test\r\n"
        );
    }

    #[test]
    fn reports_outlive_their_sender() {
        let (pool, _dir) = temp_pool();
        let mut conn = pool.get().unwrap();
        let (logger, _sink) = memory_logger();
        let user = sender(&mut conn);
        let saved = crud::save::<ReportRow, _>(&mut conn, &logger, &AuditContext::default(), form(user)).unwrap();

        diesel::delete(users::table.find(user)).execute(&mut conn).unwrap();

        let row = ReportRow::find(&mut conn, saved.record().report.id).unwrap().unwrap();
        assert_eq!(row.sender, None);
        assert_eq!(row.report.user_id, None);
    }

    #[test]
    fn unknown_sender_is_rejected() {
        let (pool, _dir) = temp_pool();
        let mut conn = pool.get().unwrap();
        let (logger, sink) = memory_logger();

        let result = crud::save::<ReportRow, _>(&mut conn, &logger, &AuditContext::default(), form(404));
        assert!(matches!(result, Err(CrudError::Validation(_))));
        assert!(sink.actions().is_empty());
    }
}
