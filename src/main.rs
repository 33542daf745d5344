use log::{error, info};
use rocket::{Build, Rocket, launch};

use vetdesk_server::settings::Settings;
use vetdesk_server::{build_rocket, db};

fn prepare() -> anyhow::Result<Rocket<Build>> {
    let settings = Settings::load()?;

    // The handle flushes and rotates log files; it must outlive the server.
    let logger = db::init_logger(&settings)?;
    Box::leak(Box::new(logger));

    let pool = db::initialize(&settings)?;
    info!(
        "Starting with database {} (auto-logout after {}s)",
        settings.database_url, settings.auto_logout_delay
    );
    Ok(build_rocket(settings, pool))
}

#[launch]
fn rocket() -> _ {
    match prepare() {
        Ok(rocket) => rocket,
        Err(e) => {
            error!("Startup failed: {:#}", e);
            eprintln!("Startup failed: {e:#}");
            std::process::exit(1);
        }
    }
}
