use rocket::http::Status;
use rocket::request::FlashMessage;
use rocket::State;
use rocket_dyn_templates::{Template, context};

use crate::auth::VeterinarianUser;
use crate::entities::logs;
use crate::routes::{Chrome, connection};
use crate::state::AppState;

/// Latest activity, read only
#[get("/logs?<search>")]
pub fn logs_page(
    staff: VeterinarianUser,
    state: &State<AppState>,
    flash: Option<FlashMessage<'_>>,
    search: Option<&str>,
) -> Result<Template, Status> {
    let mut conn = connection(state)?;
    let rows = logs::page(&mut conn, search)?;

    Ok(Template::render(
        "logs",
        context! {
            chrome: Chrome::new(&staff.user, flash),
            logs: rows,
            search: search.map(str::trim).unwrap_or_default(),
        },
    ))
}
