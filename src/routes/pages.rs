use chrono::{TimeDelta, Utc};
use diesel::prelude::*;
use rocket::http::Status;
use rocket::request::FlashMessage;
use rocket::response::Redirect;
use rocket::State;
use rocket_dyn_templates::{Template, context};

use crate::auth::AnyStaff;
use crate::crud::{CrudError, Resource};
use crate::entities::{ProductRow, ReservationRow, StockSummary, logs, users};
use crate::routes::{Chrome, connection};
use crate::schema::{animals, clients, products, reservations};
use crate::state::AppState;

#[get("/")]
pub fn root() -> Redirect {
    Redirect::to("/dashboard")
}

/// Dashboard with counts, stock figures and upcoming appointments
#[get("/dashboard")]
pub fn dashboard(
    staff: AnyStaff,
    state: &State<AppState>,
    flash: Option<FlashMessage<'_>>,
) -> Result<Template, Status> {
    let mut conn = connection(state)?;

    let total_clients: i64 = clients::table.count().get_result(&mut conn).map_err(CrudError::from)?;
    let total_animals: i64 = animals::table.count().get_result(&mut conn).map_err(CrudError::from)?;
    let total_reservations: i64 = reservations::table
        .count()
        .get_result(&mut conn)
        .map_err(CrudError::from)?;
    let total_products: i64 = products::table.count().get_result(&mut conn).map_err(CrudError::from)?;

    let now = Utc::now();
    let today = now.date_naive();
    let product_rows = ProductRow::list(&mut conn).map_err(CrudError::from)?;
    let stock = StockSummary::compute(&product_rows, today, state.settings.stock_alert_threshold);

    let from = today.and_hms_opt(0, 0, 0).unwrap_or_else(|| now.naive_utc());
    let upcoming = ReservationRow::between(&mut conn, from, from + TimeDelta::days(2), 5)
        .map_err(CrudError::from)?;

    let team = users::team(&mut conn, 5).map_err(CrudError::from)?;
    let recent_logs = logs::latest(&mut conn, Some(3)).map_err(CrudError::from)?;

    Ok(Template::render(
        "dashboard",
        context! {
            chrome: Chrome::new(&staff.user, flash),
            total_clients,
            total_animals,
            total_reservations,
            total_products,
            total_value: format!("{:.2}", stock.total_value),
            recent_value: format!("{:.2}", stock.recent_value),
            stock_alerts: stock.low_stock,
            threshold: state.settings.stock_alert_threshold,
            upcoming,
            team,
            recent_logs,
        },
    ))
}

#[get("/invoice")]
pub fn invoice(staff: AnyStaff, flash: Option<FlashMessage<'_>>) -> Template {
    Template::render("invoice", context! { chrome: Chrome::new(&staff.user, flash) })
}
