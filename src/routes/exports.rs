//! CSV downloads. Each export is gated like the page it mirrors and honours
//! the same `search` filter. The export event is the only one recorded for
//! the request, so the view mark is claimed up front.

use rocket::http::Status;
use rocket::State;

use crate::audit::ViewMark;
use crate::auth::{AdminUser, AnyStaff, AssistantUser, GateLevel, Staff, VeterinarianUser};
use crate::crud::{self, Resource};
use crate::entities::{AccountRow, AnimalRow, ProductRow, ReportRow, ReservationRow, logs};
use crate::models::Client;
use crate::routes::{CsvFile, connection};
use crate::state::AppState;

fn export<R: Resource, G: GateLevel>(
    staff: &Staff<G>,
    state: &AppState,
    mark: &ViewMark,
    search: Option<&str>,
    filename: &str,
) -> Result<CsvFile, Status> {
    mark.claim();
    let mut conn = connection(state)?;
    let body = crud::export::<R>(&mut conn, &state.audit, &staff.audit, search)?;
    Ok(CsvFile::new(body, filename))
}

#[get("/export/clients/csv?<search>")]
pub fn clients_csv(
    staff: AnyStaff,
    state: &State<AppState>,
    mark: &ViewMark,
    search: Option<&str>,
) -> Result<CsvFile, Status> {
    export::<Client, _>(&staff, state, mark, search, "clients.csv")
}

#[get("/export/animals/csv?<search>")]
pub fn animals_csv(
    staff: AnyStaff,
    state: &State<AppState>,
    mark: &ViewMark,
    search: Option<&str>,
) -> Result<CsvFile, Status> {
    export::<AnimalRow, _>(&staff, state, mark, search, "animals.csv")
}

#[get("/export/reservations/csv?<search>")]
pub fn reservations_csv(
    staff: AnyStaff,
    state: &State<AppState>,
    mark: &ViewMark,
    search: Option<&str>,
) -> Result<CsvFile, Status> {
    export::<ReservationRow, _>(&staff, state, mark, search, "reservations.csv")
}

#[get("/export/products/csv?<search>")]
pub fn products_csv(
    staff: AssistantUser,
    state: &State<AppState>,
    mark: &ViewMark,
    search: Option<&str>,
) -> Result<CsvFile, Status> {
    export::<ProductRow, _>(&staff, state, mark, search, "products.csv")
}

#[get("/export/reports/csv?<search>")]
pub fn reports_csv(
    staff: VeterinarianUser,
    state: &State<AppState>,
    mark: &ViewMark,
    search: Option<&str>,
) -> Result<CsvFile, Status> {
    export::<ReportRow, _>(&staff, state, mark, search, "reports.csv")
}

#[get("/export/users/csv?<search>")]
pub fn users_csv(
    staff: AdminUser,
    state: &State<AppState>,
    mark: &ViewMark,
    search: Option<&str>,
) -> Result<CsvFile, Status> {
    export::<AccountRow, _>(&staff, state, mark, search, "users.csv")
}

#[get("/export/logs/csv?<search>")]
pub fn logs_csv(
    staff: VeterinarianUser,
    state: &State<AppState>,
    mark: &ViewMark,
    search: Option<&str>,
) -> Result<CsvFile, Status> {
    mark.claim();
    let mut conn = connection(state)?;
    let body = logs::export(&mut conn, &state.audit, &staff.audit, search)?;
    Ok(CsvFile::new(body, "logs.csv"))
}
