use std::thread::sleep;
use std::time::Duration;

use diesel::prelude::*;
use rocket::http::{ContentType, Status};
use rocket::local::blocking::{Client, LocalResponse};
use tempfile::TempDir;

use vetdesk_server::db::{self, DbPool};
use vetdesk_server::schema::{audit_events, users};
use vetdesk_server::settings::Settings;
use vetdesk_server::build_rocket;

struct App {
    client: Client,
    pool: DbPool,
    _dir: TempDir,
}

impl App {
    fn start(auto_logout_delay: i64) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = Settings {
            database_url: dir.path().join("vetdesk.db").to_string_lossy().into_owned(),
            log_dir: dir.path().join("logs").to_string_lossy().into_owned(),
            auto_logout_delay,
            ..Settings::default()
        };
        let pool = db::initialize(&settings).expect("database");
        let client = Client::tracked(build_rocket(settings, pool.clone())).expect("rocket");
        App { client, pool, _dir: dir }
    }

    fn post_form(&self, uri: &'static str, body: &str) -> LocalResponse<'_> {
        self.client
            .post(uri)
            .header(ContentType::Form)
            .body(body.to_string())
            .dispatch()
    }

    fn login(&self, username: &str, password: &str) -> LocalResponse<'_> {
        self.post_form("/login", &format!("username={username}&password={password}"))
    }

    fn count(&self, action: &str) -> i64 {
        let mut conn = self.pool.get().expect("conn");
        audit_events::table
            .filter(audit_events::action.eq(action))
            .count()
            .get_result(&mut conn)
            .expect("count")
    }
}

fn location(response: &LocalResponse<'_>) -> Option<String> {
    response.headers().get_one("Location").map(str::to_string)
}

fn flash(response: &LocalResponse<'_>) -> Option<String> {
    response.cookies().get("_flash").map(|c| c.value().to_string())
}

#[test]
fn login_and_logout_are_recorded() {
    let app = App::start(1800);

    let response = app.login("admin", "pass1234");
    assert_eq!(response.status(), Status::SeeOther);
    assert_eq!(location(&response).as_deref(), Some("/dashboard"));

    assert_eq!(app.client.get("/dashboard").dispatch().status(), Status::Ok);

    let response = app.client.get("/logout").dispatch();
    assert_eq!(location(&response).as_deref(), Some("/login"));

    let response = app.client.get("/dashboard").dispatch();
    assert_eq!(response.status(), Status::SeeOther);
    assert_eq!(location(&response).as_deref(), Some("/login"));

    assert_eq!(app.count("login"), 1);
    assert_eq!(app.count("logout"), 1);
    assert_eq!(app.count("view"), 1);
}

#[test]
fn bad_password_is_rejected_without_a_session() {
    let app = App::start(1800);

    let response = app.login("admin", "wrong-password");
    assert_eq!(location(&response).as_deref(), Some("/login"));

    let response = app.client.get("/clients").dispatch();
    assert_eq!(location(&response).as_deref(), Some("/login"));
    assert_eq!(app.count("login"), 0);
}

#[test]
fn receptionist_is_kept_out_of_admin_pages() {
    let app = App::start(1800);
    app.login("admin", "pass1234");

    let response = app.post_form(
        "/users",
        "username=desk&email=desk%40clinic.test&role=receptionist&password=frontdesk1&is_active=true",
    );
    assert_eq!(location(&response).as_deref(), Some("/users"));
    app.client.get("/logout").dispatch();

    app.login("desk", "frontdesk1");
    assert_eq!(app.client.get("/clients").dispatch().status(), Status::Ok);

    for uri in ["/users", "/logs", "/stock", "/export/users/csv"] {
        let response = app.client.get(uri).dispatch();
        assert_eq!(response.status(), Status::SeeOther, "{uri}");
        assert_eq!(location(&response).as_deref(), Some("/dashboard"), "{uri}");
    }
}

#[test]
fn idle_session_is_logged_out_once() {
    let app = App::start(1);
    app.login("admin", "pass1234");
    sleep(Duration::from_millis(2100));

    let response = app.client.get("/dashboard").dispatch();
    assert_eq!(response.status(), Status::SeeOther);
    assert_eq!(location(&response).as_deref(), Some("/login"));

    let response = app.client.get("/dashboard").dispatch();
    assert_eq!(location(&response).as_deref(), Some("/login"));

    assert_eq!(app.count("auto_logout"), 1);
    assert_eq!(app.count("logout"), 0);
}

#[test]
fn client_changes_and_export_are_audited() {
    let app = App::start(1800);
    app.login("admin", "pass1234");

    let response = app.post_form(
        "/clients",
        "first_name=Jane&last_name=Doe&phone=0600000000&email=jane%40example.com",
    );
    assert_eq!(location(&response).as_deref(), Some("/clients"));
    assert_eq!(app.count("create"), 1);

    let response = app.client.get("/export/clients/csv").dispatch();
    assert_eq!(response.status(), Status::Ok);
    assert_eq!(response.content_type(), Some(ContentType::CSV));
    let body = response.into_string().expect("body");
    assert!(body.starts_with("First Name,Last Name,Phone,Email\r\n"));
    assert!(body.contains("Jane,Doe,0600000000,jane@example.com\r\n"));
    assert_eq!(app.count("export"), 1);
    assert_eq!(app.count("view"), 0);

    let response = app.client.get("/clients?delete=1").dispatch();
    assert_eq!(location(&response).as_deref(), Some("/clients"));
    assert_eq!(app.count("delete"), 1);
}

#[test]
fn invalid_form_is_flashed_back_without_saving() {
    let app = App::start(1800);
    app.login("admin", "pass1234");

    let response = app.post_form("/animals", "name=Rex&species=Dog&breed=Lab&age=-1&client=1");
    assert_eq!(location(&response).as_deref(), Some("/animals"));
    assert_eq!(app.count("create"), 0);
}

#[test]
fn appointments_feed_lists_reservations() {
    let app = App::start(1800);
    app.login("admin", "pass1234");

    app.post_form(
        "/clients",
        "first_name=Jane&last_name=Doe&phone=0600000000&email=jane%40example.com",
    );
    app.post_form("/animals", "name=Rex&species=Dog&breed=Lab&age=3&client=1");
    app.post_form(
        "/reservations",
        "client=1&animal=1&scheduled_at=2026-03-01T09%3A30&service=Checkup&status=Confirmed",
    );
    assert_eq!(app.count("create"), 3);

    let response = app.client.get("/api/all_appointments").dispatch();
    assert_eq!(response.status(), Status::Ok);
    let events: serde_json::Value = response.into_json().expect("json");
    assert_eq!(events[0]["title"], "Checkup - Rex");
    assert_eq!(events[0]["start"], "2026-03-01T09:30:00");
    assert_eq!(events[0]["color"], "#F39C12");
}

#[test]
fn appointments_feed_requires_login() {
    let app = App::start(1800);
    let response = app.client.get("/api/all_appointments").dispatch();
    assert_eq!(response.status(), Status::SeeOther);
    assert_eq!(location(&response).as_deref(), Some("/login"));
}

#[test]
fn admin_cannot_delete_own_account() {
    let app = App::start(1800);
    app.login("admin", "pass1234");

    let response = app.client.get("/users?delete=1").dispatch();
    assert_eq!(location(&response).as_deref(), Some("/users"));
    assert!(flash(&response).is_some_and(|f| f.contains("You cannot delete your own account!")));
    assert_eq!(app.client.get("/dashboard").dispatch().status(), Status::Ok);

    let mut conn = app.pool.get().expect("conn");
    let remaining: i64 = users::table.count().get_result(&mut conn).expect("count");
    assert_eq!(remaining, 1);
    assert_eq!(app.count("delete"), 0);
}

#[test]
fn password_change_ends_the_session() {
    let app = App::start(1800);
    app.login("admin", "pass1234");

    let response = app.post_form(
        "/settings/password",
        "current_password=pass1234&new_password=evenbetter1&confirm_password=evenbetter1",
    );
    assert_eq!(location(&response).as_deref(), Some("/login"));
    assert_eq!(app.count("password_change"), 1);

    let response = app.client.get("/dashboard").dispatch();
    assert_eq!(location(&response).as_deref(), Some("/login"));

    let response = app.login("admin", "evenbetter1");
    assert_eq!(location(&response).as_deref(), Some("/dashboard"));
}

#[test]
fn incomplete_forms_redirect_with_a_message() {
    let app = App::start(1800);

    let response = app.post_form("/login", "username=admin");
    assert_eq!(response.status(), Status::SeeOther);
    assert_eq!(location(&response).as_deref(), Some("/login"));
    assert!(flash(&response).is_some_and(|f| f.contains("Username and password are required.")));

    app.login("admin", "pass1234");

    let response = app.post_form(
        "/settings/password",
        "current_password=pass1234&new_password=evenbetter1",
    );
    assert_eq!(response.status(), Status::SeeOther);
    assert_eq!(location(&response).as_deref(), Some("/settings"));
    assert!(flash(&response).is_some_and(|f| f.contains("Password confirmation is required.")));

    let response = app.post_form("/settings/theme", "");
    assert_eq!(response.status(), Status::SeeOther);
    assert_eq!(location(&response).as_deref(), Some("/settings"));
    assert!(flash(&response).is_some_and(|f| f.contains("Unknown theme.")));

    assert_eq!(app.count("password_change"), 0);
    assert_eq!(app.count("theme_change"), 0);
    assert_eq!(app.client.get("/dashboard").dispatch().status(), Status::Ok);
}
