use rocket::form::Form;
use rocket::http::Status;
use rocket::request::FlashMessage;
use rocket::response::{Flash, Redirect};
use rocket::State;
use rocket_dyn_templates::{Template, context};

use crate::audit::ViewMark;
use crate::auth::VeterinarianUser;
use crate::crud::{self, CrudError, Resource, Saved};
use crate::entities::{AccountRow, ReportForm, ReportRow};
use crate::routes::{Chrome, Page, connection, removed_redirect, saved_redirect};
use crate::state::AppState;

#[get("/reports?<search>&<edit>&<delete>")]
pub fn reports_page(
    staff: VeterinarianUser,
    state: &State<AppState>,
    mark: &ViewMark,
    flash: Option<FlashMessage<'_>>,
    search: Option<&str>,
    edit: Option<i32>,
    delete: Option<i32>,
) -> Result<Page, Status> {
    let mut conn = connection(state)?;

    if let Some(id) = delete {
        let result = crud::remove::<ReportRow>(&mut conn, &state.audit, &staff.audit, id);
        return removed_redirect(result, "/reports");
    }

    let listing = crud::listing::<ReportRow>(&mut conn, &state.audit, &staff.audit, mark, search, edit)?;
    let users = AccountRow::list(&mut conn).map_err(CrudError::from)?;
    Ok(Page::Render(Template::render(
        "reports",
        context! { chrome: Chrome::new(&staff.user, flash), listing, users },
    )))
}

/// Saves a report; a new one is also logged as sent.
#[post("/reports", data = "<form>")]
pub fn save_report(
    staff: VeterinarianUser,
    state: &State<AppState>,
    form: Form<ReportForm>,
) -> Result<Flash<Redirect>, Status> {
    let mut conn = connection(state)?;
    let result = crud::save::<ReportRow, _>(&mut conn, &state.audit, &staff.audit, form.into_inner());

    if let Ok(Saved::Created(row)) = &result {
        let sender = row.sender.as_deref().unwrap_or(&staff.user.username);
        state
            .audit
            .log_report_sent(&staff.audit, sender, &row.report.subject, &row.report.recipient);
    }
    saved_redirect(result, "/reports")
}
