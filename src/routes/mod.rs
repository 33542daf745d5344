use log::error;
use rocket::http::{ContentType, Header, Status};
use rocket::request::FlashMessage;
use rocket::response::{Flash, Redirect};
use rocket::Route;
use rocket_dyn_templates::Template;
use serde::Serialize;

use crate::auth::SessionUser;
use crate::crud::{CrudError, Resource, Saved};
use crate::db::DbConn;
use crate::rbac::Gate;
use crate::state::AppState;

pub mod animals;
pub mod api;
pub mod auth;
pub mod clients;
pub mod exports;
pub mod logs;
pub mod pages;
pub mod reports;
pub mod reservations;
pub mod settings;
pub mod stock;
pub mod users;

/// Flash message as handed to templates.
#[derive(Debug, Serialize)]
pub struct Notice {
    pub kind: String,
    pub message: String,
}

impl Notice {
    pub fn new(kind: &str, message: &str) -> Self {
        Notice { kind: kind.to_string(), message: message.to_string() }
    }

    pub fn from_flash(flash: Option<FlashMessage<'_>>) -> Option<Self> {
        flash.map(|f| Notice::new(f.kind(), f.message()))
    }
}

/// Layout data shared by every authenticated page.
#[derive(Debug, Serialize)]
pub struct Chrome {
    pub user: SessionUser,
    pub role_label: &'static str,
    pub can_manage_users: bool,
    pub can_view_logs: bool,
    pub can_view_reports: bool,
    pub can_manage_stock: bool,
    pub flash: Option<Notice>,
}

impl Chrome {
    pub fn new(user: &SessionUser, flash: Option<FlashMessage<'_>>) -> Self {
        Chrome {
            role_label: match (user.is_superuser, user.role) {
                (true, _) => "Superuser",
                (false, Some(role)) => role.label(),
                (false, None) => "",
            },
            can_manage_users: user.can(Gate::AdminOnly),
            can_view_logs: user.can(Gate::VeterinarianOrAbove),
            can_view_reports: user.can(Gate::VeterinarianOrAbove),
            can_manage_stock: user.can(Gate::AssistantOrAbove),
            user: user.clone(),
            flash: Notice::from_flash(flash),
        }
    }
}

/// A rendered page, or a redirect when a query parameter triggered an action.
#[derive(Responder)]
pub enum Page {
    Render(Template),
    Notify(Flash<Redirect>),
    Redirect(Redirect),
}

/// A CSV download.
#[derive(Responder)]
pub struct CsvFile {
    body: String,
    content_type: ContentType,
    disposition: Header<'static>,
}

impl CsvFile {
    pub fn new(body: String, filename: &str) -> Self {
        CsvFile {
            body,
            content_type: ContentType::CSV,
            disposition: Header::new(
                "Content-Disposition",
                format!("attachment; filename=\"{filename}\""),
            ),
        }
    }
}

/// Get a pooled connection or fail the request with 500.
pub fn connection(state: &AppState) -> Result<DbConn, Status> {
    state.db_pool.get().map_err(|e| {
        error!("Failed to get DB connection: {}", e);
        Status::InternalServerError
    })
}

/// Redirect back after a save: success or validation message as a flash.
pub fn saved_redirect<R: Resource>(
    result: Result<Saved<R>, CrudError>,
    back: &'static str,
) -> Result<Flash<Redirect>, Status> {
    match result {
        Ok(saved) => Ok(Flash::success(
            Redirect::to(back),
            format!("{} {} successfully!", R::ENTITY, saved.verb()),
        )),
        Err(CrudError::Validation(message)) => Ok(Flash::error(Redirect::to(back), message)),
        Err(e) => Err(e.into()),
    }
}

/// Redirect back after a delete.
pub fn removed_redirect<R: Resource>(
    result: Result<R, CrudError>,
    back: &'static str,
) -> Result<Page, Status> {
    match result {
        Ok(_) => Ok(Page::Notify(Flash::success(
            Redirect::to(back),
            format!("{} deleted successfully!", R::ENTITY),
        ))),
        Err(CrudError::Validation(message)) => Ok(Page::Notify(Flash::error(Redirect::to(back), message))),
        Err(e) => Err(e.into()),
    }
}

/// Login, logout and landing pages
pub fn auth_routes() -> Vec<Route> {
    routes![
        auth::login_page,
        auth::login,
        auth::logout,
        pages::root,
        pages::dashboard,
        pages::invoice,
    ]
}

/// Entity listing pages and their forms
pub fn entity_routes() -> Vec<Route> {
    routes![
        clients::clients_page,
        clients::save_client,
        animals::animals_page,
        animals::save_animal,
        reservations::reservations_page,
        reservations::save_reservation,
        stock::stock_page,
        stock::categories_page,
        stock::suppliers_page,
        stock::save_product,
        stock::save_category,
        stock::save_supplier,
        logs::logs_page,
        reports::reports_page,
        reports::save_report,
        users::users_page,
        users::save_user,
    ]
}

/// Current user's own settings
pub fn settings_routes() -> Vec<Route> {
    routes![
        settings::settings_page,
        settings::update_profile,
        settings::change_password,
        settings::change_theme,
    ]
}

/// CSV exports
pub fn export_routes() -> Vec<Route> {
    routes![
        exports::clients_csv,
        exports::animals_csv,
        exports::reservations_csv,
        exports::products_csv,
        exports::logs_csv,
        exports::reports_csv,
        exports::users_csv,
    ]
}

/// JSON API
pub fn api_routes() -> Vec<Route> {
    routes![api::all_appointments]
}
