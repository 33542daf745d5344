use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use flexi_logger::{Age, Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming};
use chrono::Utc;
use log::info;

use crate::models::{NewProfile, NewUser};
use crate::rbac::{Role, Theme};
use crate::settings::Settings;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Per-connection pragmas; SQLite keeps both off by default.
#[derive(Debug)]
struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Initialize logger
pub fn init_logger(settings: &Settings) -> anyhow::Result<LoggerHandle> {
    std::fs::create_dir_all(&settings.log_dir)?;

    let handle = Logger::try_with_env_or_str("info")?
        .log_to_file(
            FileSpec::default()
                .directory(&settings.log_dir)
                .basename("vetdesk_server"),
        )
        .rotate(
            Criterion::Age(Age::Day),
            Naming::Numbers,
            Cleanup::KeepLogFiles(7),
        )
        .duplicate_to_stderr(Duplicate::Info)
        .start()?;

    Ok(handle)
}

/// Initialize DB connection pool
pub fn init_pool(database_url: &str) -> anyhow::Result<DbPool> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = Pool::builder()
        .connection_customizer(Box::new(SqlitePragmas))
        .build(manager)?;
    Ok(pool)
}

/// Apply embedded migrations that have not run yet
pub fn run_migrations(conn: &mut SqliteConnection) -> anyhow::Result<()> {
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("migrations failed: {e}"))?;
    for version in applied {
        info!("Applied migration {}", version);
    }
    Ok(())
}

/// Pool, migrations and bootstrap account
pub fn initialize(settings: &Settings) -> anyhow::Result<DbPool> {
    let pool = init_pool(&settings.database_url)?;
    let mut conn = pool.get()?;
    run_migrations(&mut conn)?;
    create_default_admin(&mut conn, &settings.admin_password)?;
    Ok(pool)
}

/// Create default admin user if DB is empty
pub fn create_default_admin(conn: &mut SqliteConnection, password: &str) -> anyhow::Result<()> {
    use crate::schema::{profiles, users};

    let count: i64 = users::table.count().get_result(conn)?;
    if count > 0 {
        return Ok(());
    }

    let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::insert_into(users::table)
            .values(&NewUser {
                username: "admin",
                email: "",
                first_name: "",
                last_name: "",
                password_hash: &hash,
                is_active: true,
                is_superuser: true,
                date_joined: Utc::now().naive_utc(),
            })
            .execute(conn)?;

        let admin_id = last_insert_id(conn)?;

        diesel::insert_into(profiles::table)
            .values(&NewProfile {
                user_id: admin_id,
                role: Role::Admin.as_str(),
                phone: None,
                address: None,
                theme: Theme::default().as_str(),
            })
            .execute(conn)?;
        Ok(())
    })?;

    info!("Default admin created (username: admin)");
    Ok(())
}

/// Row id of the last insert on this connection.
pub fn last_insert_id(conn: &mut SqliteConnection) -> QueryResult<i32> {
    diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("last_insert_rowid()"))
        .get_result(conn)
}


#[cfg(test)]
mod tests {
    use super::testing::temp_pool;
    use super::*;
    use crate::models::{Profile, User};
    use crate::schema::{profiles, users};

    #[test]
    fn default_admin_is_created_once() {
        let (pool, _dir) = temp_pool();
        let mut conn = pool.get().unwrap();

        create_default_admin(&mut conn, "pass1234").unwrap();
        create_default_admin(&mut conn, "other").unwrap();

        let all: Vec<User> = users::table.select(User::as_select()).load(&mut conn).unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].is_superuser);

        let profile: Profile = profiles::table
            .filter(profiles::user_id.eq(all[0].id))
            .select(Profile::as_select())
            .first(&mut conn)
            .unwrap();
        assert_eq!(profile.role(), Role::Admin);
    }
}
