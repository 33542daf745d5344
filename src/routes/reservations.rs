use rocket::form::Form;
use rocket::http::Status;
use rocket::request::FlashMessage;
use rocket::response::{Flash, Redirect};
use rocket::State;
use rocket_dyn_templates::{Template, context};

use crate::audit::ViewMark;
use crate::auth::AnyStaff;
use crate::crud::{self, CrudError, Resource};
use crate::entities::{AnimalRow, ReservationForm, ReservationRow};
use crate::models::Client;
use crate::routes::{Chrome, Page, connection, removed_redirect, saved_redirect};
use crate::state::AppState;

#[get("/reservations?<search>&<edit>&<delete>")]
pub fn reservations_page(
    staff: AnyStaff,
    state: &State<AppState>,
    mark: &ViewMark,
    flash: Option<FlashMessage<'_>>,
    search: Option<&str>,
    edit: Option<i32>,
    delete: Option<i32>,
) -> Result<Page, Status> {
    let mut conn = connection(state)?;

    if let Some(id) = delete {
        let result = crud::remove::<ReservationRow>(&mut conn, &state.audit, &staff.audit, id);
        return removed_redirect(result, "/reservations");
    }

    let listing =
        crud::listing::<ReservationRow>(&mut conn, &state.audit, &staff.audit, mark, search, edit)?;
    let clients = Client::list(&mut conn).map_err(CrudError::from)?;
    let animals = AnimalRow::list(&mut conn).map_err(CrudError::from)?;
    Ok(Page::Render(Template::render(
        "reservations",
        context! { chrome: Chrome::new(&staff.user, flash), listing, clients, animals },
    )))
}

#[post("/reservations", data = "<form>")]
pub fn save_reservation(
    staff: AnyStaff,
    state: &State<AppState>,
    form: Form<ReservationForm>,
) -> Result<Flash<Redirect>, Status> {
    let mut conn = connection(state)?;
    let result =
        crud::save::<ReservationRow, _>(&mut conn, &state.audit, &staff.audit, form.into_inner());
    saved_redirect(result, "/reservations")
}
