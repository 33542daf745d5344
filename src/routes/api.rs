use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;

use crate::auth::AnyStaff;
use crate::crud::{CrudError, Resource};
use crate::entities::{Appointment, ReservationRow};
use crate::routes::connection;
use crate::state::AppState;

/// Every reservation as a calendar event.
#[get("/all_appointments")]
pub fn all_appointments(_staff: AnyStaff, state: &State<AppState>) -> Result<Json<Vec<Appointment>>, Status> {
    let mut conn = connection(state)?;
    let rows = ReservationRow::list(&mut conn).map_err(CrudError::from)?;
    Ok(Json(rows.iter().map(Appointment::from).collect()))
}
