use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::Serialize;

use crate::crud::{self, CrudError, Resource, ResourceForm};
use crate::db::last_insert_id;
use crate::models::{Reservation, ReservationInput};
use crate::schema::{animals, clients, reservations};

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// A reservation with client and animal names.
#[derive(Debug, Clone, Serialize)]
pub struct ReservationRow {
    #[serde(flatten)]
    pub reservation: Reservation,
    pub client_first_name: String,
    pub client_last_name: String,
    pub animal_name: String,
}

impl ReservationRow {
    pub fn client(&self) -> String {
        format!("{} {}", self.client_first_name, self.client_last_name)
    }

    /// Reservations scheduled in `[from, until)`, earliest first.
    pub fn between(
        conn: &mut SqliteConnection,
        from: NaiveDateTime,
        until: NaiveDateTime,
        limit: i64,
    ) -> QueryResult<Vec<Self>> {
        let rows = reservations::table
            .inner_join(clients::table)
            .inner_join(animals::table)
            .filter(reservations::scheduled_at.ge(from))
            .filter(reservations::scheduled_at.lt(until))
            .order(reservations::scheduled_at.asc())
            .limit(limit)
            .select(row_selection())
            .load::<RowTuple>(conn)?;
        Ok(rows.into_iter().map(into_row).collect())
    }
}

#[derive(Debug, FromForm)]
pub struct ReservationForm {
    pub edit_id: Option<i32>,
    pub client: Option<String>,
    pub animal: Option<String>,
    pub scheduled_at: Option<String>,
    pub service: Option<String>,
    pub status: Option<String>,
    pub note: Option<String>,
}

impl ResourceForm for ReservationForm {
    type Input = ReservationInput;

    fn edit_id(&self) -> Option<i32> {
        self.edit_id
    }

    fn validate(self, _editing: bool) -> Result<ReservationInput, CrudError> {
        Ok(ReservationInput {
            client_id: crud::required_parse(self.client, "Client")?,
            animal_id: crud::required_parse(self.animal, "Animal")?,
            scheduled_at: crud::parse_datetime(self.scheduled_at, "Date")?,
            service: crud::required(self.service, "Service")?,
            status: crud::required(self.status, "Status")?,
            note: crud::optional(self.note),
        })
    }
}

fn references_exist(conn: &mut SqliteConnection, input: &ReservationInput) -> Result<(), CrudError> {
    let clients_found: i64 = clients::table
        .filter(clients::id.eq(input.client_id))
        .count()
        .get_result(conn)?;
    if clients_found == 0 {
        return Err(CrudError::invalid("Selected client does not exist."));
    }
    let animals_found: i64 = animals::table
        .filter(animals::id.eq(input.animal_id))
        .count()
        .get_result(conn)?;
    if animals_found == 0 {
        return Err(CrudError::invalid("Selected animal does not exist."));
    }
    Ok(())
}

type RowTuple = (Reservation, String, String, String);

type RowSelection = (
    diesel::dsl::AsSelect<Reservation, diesel::sqlite::Sqlite>,
    clients::first_name,
    clients::last_name,
    animals::name,
);

fn row_selection() -> RowSelection {
    (Reservation::as_select(), clients::first_name, clients::last_name, animals::name)
}

fn into_row((reservation, client_first_name, client_last_name, animal_name): RowTuple) -> ReservationRow {
    ReservationRow { reservation, client_first_name, client_last_name, animal_name }
}

impl Resource for ReservationRow {
    type Input = ReservationInput;

    const ENTITY: &'static str = "Reservation";
    const CSV_HEADER: &'static [&'static str] = &["Client", "Animal", "Date", "Service", "Status", "Note"];

    fn list(conn: &mut SqliteConnection) -> QueryResult<Vec<Self>> {
        let rows = reservations::table
            .inner_join(clients::table)
            .inner_join(animals::table)
            .order(reservations::scheduled_at.desc())
            .select(row_selection())
            .load::<RowTuple>(conn)?;
        Ok(rows.into_iter().map(into_row).collect())
    }

    fn find(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<Self>> {
        let row = reservations::table
            .inner_join(clients::table)
            .inner_join(animals::table)
            .filter(reservations::id.eq(id))
            .select(row_selection())
            .first::<RowTuple>(conn)
            .optional()?;
        Ok(row.map(into_row))
    }

    fn insert(conn: &mut SqliteConnection, input: &ReservationInput) -> Result<i32, CrudError> {
        references_exist(conn, input)?;
        diesel::insert_into(reservations::table).values(input).execute(conn)?;
        Ok(last_insert_id(conn)?)
    }

    fn update(conn: &mut SqliteConnection, id: i32, input: &ReservationInput) -> Result<usize, CrudError> {
        references_exist(conn, input)?;
        Ok(diesel::update(reservations::table.find(id)).set(input).execute(conn)?)
    }

    fn delete(conn: &mut SqliteConnection, id: i32) -> QueryResult<usize> {
        diesel::delete(reservations::table.find(id)).execute(conn)
    }

    fn id(&self) -> i32 {
        self.reservation.id
    }

    fn label(&self) -> String {
        format!("Reservation {} - {}", self.reservation.id, self.client())
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.client_first_name.as_str(),
            self.client_last_name.as_str(),
            self.animal_name.as_str(),
            self.reservation.service.as_str(),
            self.reservation.status.as_str(),
        ]
    }

    fn csv_row(&self) -> Vec<String> {
        vec![
            self.client(),
            self.animal_name.clone(),
            self.reservation.scheduled_at.format(DATE_FORMAT).to_string(),
            self.reservation.service.clone(),
            self.reservation.status.clone(),
            self.reservation.note.clone().unwrap_or_default(),
        ]
    }
}

/// One entry of the calendar feed.
#[derive(Debug, Serialize)]
pub struct Appointment {
    pub id: i32,
    pub title: String,
    pub start: String,
    pub color: &'static str,
}

impl From<&ReservationRow> for Appointment {
    fn from(row: &ReservationRow) -> Self {
        Appointment {
            id: row.reservation.id,
            title: format!("{} - {}", row.reservation.service, row.animal_name),
            start: row.reservation.scheduled_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
            color: "#F39C12",
        }
    }
}
