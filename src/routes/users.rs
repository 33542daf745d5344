use rocket::form::Form;
use rocket::http::Status;
use rocket::request::FlashMessage;
use rocket::response::{Flash, Redirect};
use rocket::State;
use rocket_dyn_templates::{Template, context};

use crate::audit::ViewMark;
use crate::auth::AdminUser;
use crate::crud;
use crate::entities::users::delete_account;
use crate::entities::{AccountForm, AccountRow};
use crate::rbac::Role;
use crate::routes::{Chrome, Page, connection, removed_redirect, saved_redirect};
use crate::state::AppState;

/// Staff accounts; admins only
#[get("/users?<search>&<edit>&<delete>")]
pub fn users_page(
    staff: AdminUser,
    state: &State<AppState>,
    mark: &ViewMark,
    flash: Option<FlashMessage<'_>>,
    search: Option<&str>,
    edit: Option<i32>,
    delete: Option<i32>,
) -> Result<Page, Status> {
    let mut conn = connection(state)?;

    if let Some(id) = delete {
        let result = delete_account(&mut conn, &state.audit, &staff.audit, staff.user.id, id);
        return removed_redirect(result, "/users");
    }

    let listing = crud::listing::<AccountRow>(&mut conn, &state.audit, &staff.audit, mark, search, edit)?;
    let roles: Vec<_> = Role::ALL
        .iter()
        .map(|r| context! { value: r.as_str(), label: r.label() })
        .collect();
    Ok(Page::Render(Template::render(
        "users",
        context! { chrome: Chrome::new(&staff.user, flash), listing, roles },
    )))
}

#[post("/users", data = "<form>")]
pub fn save_user(
    staff: AdminUser,
    state: &State<AppState>,
    form: Form<AccountForm>,
) -> Result<Flash<Redirect>, Status> {
    let mut conn = connection(state)?;
    let result = crud::save::<AccountRow, _>(&mut conn, &state.audit, &staff.audit, form.into_inner());
    saved_redirect(result, "/users")
}
