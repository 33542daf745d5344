use rocket::form::Form;
use rocket::http::{CookieJar, Status};
use rocket::request::FlashMessage;
use rocket::response::{Flash, Redirect};
use rocket::State;
use rocket_dyn_templates::{Template, context};

use crate::auth::{AnyStaff, ensure_profile};
use crate::crud::CrudError;
use crate::entities::users::{self, PasswordForm, ProfileForm};
use crate::rbac::Theme;
use crate::routes::{Chrome, connection};
use crate::session::SessionStore;
use crate::state::AppState;

/// Flash a validation message back to the settings page, fail anything else.
fn settings_error(err: CrudError) -> Result<Flash<Redirect>, Status> {
    match err {
        CrudError::Validation(message) => Ok(Flash::error(Redirect::to("/settings"), message)),
        other => Err(other.into()),
    }
}

#[get("/settings")]
pub fn settings_page(
    staff: AnyStaff,
    state: &State<AppState>,
    flash: Option<FlashMessage<'_>>,
) -> Result<Template, Status> {
    let mut conn = connection(state)?;
    let profile = ensure_profile(&mut conn, staff.user.id).map_err(CrudError::from)?;
    let themes: Vec<_> = Theme::ALL
        .iter()
        .map(|t| context! { value: t.as_str(), label: t.label(), selected: *t == staff.user.theme })
        .collect();

    Ok(Template::render(
        "settings",
        context! { chrome: Chrome::new(&staff.user, flash), profile, themes },
    ))
}

#[post("/settings/profile", data = "<form>")]
pub fn update_profile(
    staff: AnyStaff,
    state: &State<AppState>,
    form: Form<ProfileForm>,
) -> Result<Flash<Redirect>, Status> {
    let mut conn = connection(state)?;
    match users::update_own_profile(&mut conn, staff.user.id, form.into_inner()) {
        Ok(()) => {
            state.audit.log_profile_update(&staff.audit, &staff.user.actor());
            Ok(Flash::success(Redirect::to("/settings"), "Profile updated successfully!"))
        }
        Err(e) => settings_error(e),
    }
}

/// A successful change ends the session; the user signs in again.
#[post("/settings/password", data = "<form>")]
pub fn change_password(
    staff: AnyStaff,
    state: &State<AppState>,
    cookies: &CookieJar<'_>,
    form: Form<PasswordForm>,
) -> Result<Flash<Redirect>, Status> {
    let mut conn = connection(state)?;
    match users::change_password(&mut conn, staff.user.id, &form) {
        Ok(()) => {
            state.audit.log_password_change(&staff.audit, &staff.user.actor());
            cookies.destroy();
            Ok(Flash::success(
                Redirect::to("/login"),
                "Password changed successfully! Please login again.",
            ))
        }
        Err(e) => settings_error(e),
    }
}

#[derive(Debug, FromForm)]
pub struct ThemeForm {
    pub theme: Option<String>,
}

#[post("/settings/theme", data = "<form>")]
pub fn change_theme(
    staff: AnyStaff,
    state: &State<AppState>,
    form: Form<ThemeForm>,
) -> Result<Flash<Redirect>, Status> {
    let Some(Ok(theme)) = form.theme.as_deref().map(str::parse::<Theme>) else {
        return Ok(Flash::error(Redirect::to("/settings"), "Unknown theme."));
    };

    let mut conn = connection(state)?;
    match users::set_theme(&mut conn, staff.user.id, theme) {
        Ok(()) => {
            state.audit.log_theme_change(&staff.audit, &staff.user.actor(), theme.as_str());
            Ok(Flash::success(
                Redirect::to("/settings"),
                format!("Theme changed to {}!", theme.label()),
            ))
        }
        Err(e) => settings_error(e),
    }
}
