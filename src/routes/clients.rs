use rocket::form::Form;
use rocket::http::Status;
use rocket::request::FlashMessage;
use rocket::response::{Flash, Redirect};
use rocket::State;
use rocket_dyn_templates::{Template, context};

use crate::audit::ViewMark;
use crate::auth::AnyStaff;
use crate::crud;
use crate::entities::ClientForm;
use crate::models::Client;
use crate::routes::{Chrome, Page, connection, removed_redirect, saved_redirect};
use crate::state::AppState;

#[get("/clients?<search>&<edit>&<delete>")]
pub fn clients_page(
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
        let result = crud::remove::<Client>(&mut conn, &state.audit, &staff.audit, id);
        return removed_redirect(result, "/clients");
    }

    let listing = crud::listing::<Client>(&mut conn, &state.audit, &staff.audit, mark, search, edit)?;
    Ok(Page::Render(Template::render(
        "clients",
        context! { chrome: Chrome::new(&staff.user, flash), listing },
    )))
}

#[post("/clients", data = "<form>")]
pub fn save_client(
    staff: AnyStaff,
    state: &State<AppState>,
    form: Form<ClientForm>,
) -> Result<Flash<Redirect>, Status> {
    let mut conn = connection(state)?;
    let result = crud::save::<Client, _>(&mut conn, &state.audit, &staff.audit, form.into_inner());
    saved_redirect(result, "/clients")
}
