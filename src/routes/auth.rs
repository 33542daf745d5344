use chrono::Utc;
use log::{error, info};
use rocket::form::Form;
use rocket::http::{CookieJar, Status};
use rocket::request::FlashMessage;
use rocket::response::{Flash, Redirect};
use rocket::State;
use rocket_dyn_templates::{Template, context};

use crate::audit::Actor;
use crate::auth::{AuthError, RequestMeta, SessionResolution, authenticate, ensure_profile};
use crate::rbac::Denial;
use crate::routes::{Notice, Page, connection};
use crate::session::SessionStore;
use crate::state::AppState;

#[derive(FromForm)]
pub struct LoginForm {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[get("/login")]
pub fn login_page(
    session: &SessionResolution,
    cookies: &CookieJar<'_>,
    flash: Option<FlashMessage<'_>>,
) -> Page {
    let notice = match session {
        SessionResolution::Active(_) => return Page::Redirect(Redirect::to("/dashboard")),
        SessionResolution::Expired(_) => {
            cookies.destroy();
            Some(Notice::new("warning", Denial::Expired.message()))
        }
        SessionResolution::Anonymous => Notice::from_flash(flash),
    };

    Page::Render(Template::render("login", context! { flash: notice }))
}

#[post("/login", data = "<form>")]
pub fn login(
    form: Form<LoginForm>,
    cookies: &CookieJar<'_>,
    state: &State<AppState>,
    meta: RequestMeta,
) -> Result<Flash<Redirect>, Status> {
    let username = form.username.as_deref().map(str::trim).unwrap_or_default();
    let password = form.password.as_deref().unwrap_or_default();
    if username.is_empty() || password.is_empty() {
        return Ok(Flash::error(Redirect::to("/login"), "Username and password are required."));
    }

    let mut conn = connection(state)?;
    match authenticate(&mut conn, username, password) {
        Ok(user) => {
            ensure_profile(&mut conn, user.id).map_err(|e| {
                error!("Failed to ensure profile for user {}: {}", user.id, e);
                Status::InternalServerError
            })?;
            cookies.begin(user.id, Utc::now());

            let actor = Actor { id: user.id, username: user.username.clone() };
            state.audit.log_login(&meta.context(Some(actor.clone())), &actor);
            info!("User '{}' logged in", user.username);

            Ok(Flash::success(
                Redirect::to("/dashboard"),
                format!("Welcome back, {}!", user.display_name()),
            ))
        }
        Err(AuthError::InvalidCredentials | AuthError::Inactive) => {
            Ok(Flash::error(Redirect::to("/login"), "Invalid credentials"))
        }
        Err(e) => {
            error!("Login failed: {}", e);
            Err(Status::InternalServerError)
        }
    }
}

#[get("/logout")]
pub fn logout(
    session: &SessionResolution,
    cookies: &CookieJar<'_>,
    state: &State<AppState>,
    meta: RequestMeta,
) -> Flash<Redirect> {
    if let SessionResolution::Active(user) = session {
        let actor = user.actor();
        state.audit.log_logout(&meta.context(Some(actor.clone())), &actor);
    }
    cookies.destroy();
    Flash::success(Redirect::to("/login"), "You have been logged out.")
}
