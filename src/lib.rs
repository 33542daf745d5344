#[macro_use]
extern crate rocket;

pub mod audit;
pub mod auth;
pub mod crud;
pub mod db;
pub mod entities;
pub mod fairings;
pub mod models;
pub mod rbac;
pub mod routes;
pub mod schema;
pub mod session;
pub mod settings;
pub mod state;

use rocket::fs::FileServer;
use rocket::{Build, Rocket};
use rocket_dyn_templates::Template;

use crate::db::DbPool;
use crate::fairings::PageViewFairing;
use crate::settings::Settings;
use crate::state::AppState;

/// Assemble the server around an initialized pool. Rocket's own settings
/// (port, secret key, template directory) come from its usual configuration.
pub fn build_rocket(settings: Settings, pool: DbPool) -> Rocket<Build> {
    let static_dir = settings.static_dir.clone();

    rocket::build()
        .manage(AppState::new(pool, settings))
        .mount("/", routes::auth_routes())
        .mount("/", routes::entity_routes())
        .mount("/", routes::settings_routes())
        .mount("/", routes::export_routes())
        .mount("/api", routes::api_routes())
        .mount("/static", FileServer::from(static_dir))
        .register("/", catchers![auth::unauthorized, auth::forbidden])
        .attach(Template::fairing())
        .attach(PageViewFairing)
}
