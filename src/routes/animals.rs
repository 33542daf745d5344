use rocket::form::Form;
use rocket::http::Status;
use rocket::request::FlashMessage;
use rocket::response::{Flash, Redirect};
use rocket::State;
use rocket_dyn_templates::{Template, context};

use crate::audit::ViewMark;
use crate::auth::AnyStaff;
use crate::crud::{self, CrudError, Resource};
use crate::entities::{AnimalForm, AnimalRow};
use crate::models::Client;
use crate::routes::{Chrome, Page, connection, removed_redirect, saved_redirect};
use crate::state::AppState;

#[get("/animals?<search>&<edit>&<delete>")]
pub fn animals_page(
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
        let result = crud::remove::<AnimalRow>(&mut conn, &state.audit, &staff.audit, id);
        return removed_redirect(result, "/animals");
    }

    let listing = crud::listing::<AnimalRow>(&mut conn, &state.audit, &staff.audit, mark, search, edit)?;
    let clients = Client::list(&mut conn).map_err(CrudError::from)?;
    Ok(Page::Render(Template::render(
        "animals",
        context! { chrome: Chrome::new(&staff.user, flash), listing, clients },
    )))
}

#[post("/animals", data = "<form>")]
pub fn save_animal(
    staff: AnyStaff,
    state: &State<AppState>,
    form: Form<AnimalForm>,
) -> Result<Flash<Redirect>, Status> {
    let mut conn = connection(state)?;
    let result = crud::save::<AnimalRow, _>(&mut conn, &state.audit, &staff.audit, form.into_inner());
    saved_redirect(result, "/animals")
}
