//! Staff accounts and their profiles.

use chrono::Utc;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::Serialize;

use crate::audit::{ActivityLogger, AuditContext};
use crate::auth::{MIN_PASSWORD_LEN, hash_password};
use crate::crud::{self, CrudError, Resource, ResourceForm};
use crate::db::last_insert_id;
use crate::models::{NewProfile, NewUser, User};
use crate::rbac::{Role, Theme};
use crate::schema::{profiles, users};

/// A user joined with the profile fields shown in the staff table.
#[derive(Debug, Clone, Serialize)]
pub struct AccountRow {
    #[serde(flatten)]
    pub user: User,
    pub role: Option<Role>,
    pub role_label: &'static str,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug)]
pub struct AccountInput {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub is_active: bool,
    /// `None` keeps the current password on update.
    pub password_hash: Option<String>,
}

#[derive(Debug, FromForm)]
pub struct AccountForm {
    pub edit_id: Option<i32>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub password: Option<String>,
    pub is_active: Option<bool>,
}

impl ResourceForm for AccountForm {
    type Input = AccountInput;

    fn edit_id(&self) -> Option<i32> {
        self.edit_id
    }

    fn validate(self, editing: bool) -> Result<AccountInput, CrudError> {
        let username = crud::required(self.username, "Username")?;
        let email = crud::required(self.email, "Email")?;
        let role: Role = crud::required(self.role, "Role")?
            .parse()
            .map_err(|_| CrudError::invalid("Role is not a valid value."))?;

        let password = match self.password.filter(|p| !p.is_empty()) {
            Some(p) if p.chars().count() < MIN_PASSWORD_LEN => {
                return Err(CrudError::invalid(format!(
                    "Password must be at least {MIN_PASSWORD_LEN} characters long."
                )));
            }
            Some(p) => Some(p),
            None if editing => None,
            None => return Err(CrudError::invalid("Password is required.")),
        };

        Ok(AccountInput {
            username,
            first_name: crud::optional(self.first_name).unwrap_or_default(),
            last_name: crud::optional(self.last_name).unwrap_or_default(),
            email,
            role,
            phone: crud::optional(self.phone),
            address: crud::optional(self.address),
            // An unticked checkbox is absent from the submitted form.
            is_active: self.is_active.unwrap_or(!editing),
            password_hash: password.as_deref().map(hash_password).transpose()?,
        })
    }
}

const DUPLICATE_USERNAME: &str = "Username already exists.";

type RowTuple = (User, Option<String>, Option<String>, Option<String>);

fn into_row((user, role, phone, address): RowTuple) -> AccountRow {
    let role: Option<Role> = role.and_then(|r| r.parse().ok());
    AccountRow {
        user,
        role_label: role.map(Role::label).unwrap_or(""),
        role,
        phone,
        address,
    }
}

impl Resource for AccountRow {
    type Input = AccountInput;

    const ENTITY: &'static str = "User";
    const CSV_HEADER: &'static [&'static str] =
        &["Username", "First Name", "Last Name", "Email", "Role", "Phone"];

    fn list(conn: &mut SqliteConnection) -> QueryResult<Vec<Self>> {
        let rows = users::table
            .left_join(profiles::table)
            .order(users::username.asc())
            .select((
                User::as_select(),
                profiles::role.nullable(),
                profiles::phone.nullable(),
                profiles::address.nullable(),
            ))
            .load::<RowTuple>(conn)?;
        Ok(rows.into_iter().map(into_row).collect())
    }

    fn find(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<Self>> {
        let row = users::table
            .left_join(profiles::table)
            .filter(users::id.eq(id))
            .select((
                User::as_select(),
                profiles::role.nullable(),
                profiles::phone.nullable(),
                profiles::address.nullable(),
            ))
            .first::<RowTuple>(conn)
            .optional()?;
        Ok(row.map(into_row))
    }

    fn insert(conn: &mut SqliteConnection, input: &AccountInput) -> Result<i32, CrudError> {
        let Some(password_hash) = input.password_hash.as_deref() else {
            return Err(CrudError::invalid("Password is required."));
        };

        conn.transaction::<_, CrudError, _>(|conn| {
            diesel::insert_into(users::table)
                .values(&NewUser {
                    username: &input.username,
                    email: &input.email,
                    first_name: &input.first_name,
                    last_name: &input.last_name,
                    password_hash,
                    is_active: input.is_active,
                    is_superuser: false,
                    date_joined: Utc::now().naive_utc(),
                })
                .execute(conn)
                .map_err(|e| CrudError::unique(e, DUPLICATE_USERNAME))?;
            let user_id = last_insert_id(conn)?;

            diesel::insert_into(profiles::table)
                .values(&NewProfile {
                    user_id,
                    role: input.role.as_str(),
                    phone: input.phone.as_deref(),
                    address: input.address.as_deref(),
                    theme: Theme::default().as_str(),
                })
                .execute(conn)?;
            Ok(user_id)
        })
    }

    fn update(conn: &mut SqliteConnection, id: i32, input: &AccountInput) -> Result<usize, CrudError> {
        conn.transaction::<_, CrudError, _>(|conn| {
            let touched = diesel::update(users::table.find(id))
                .set((
                    users::username.eq(&input.username),
                    users::first_name.eq(&input.first_name),
                    users::last_name.eq(&input.last_name),
                    users::email.eq(&input.email),
                    users::is_active.eq(input.is_active),
                ))
                .execute(conn)
                .map_err(|e| CrudError::unique(e, DUPLICATE_USERNAME))?;
            if touched == 0 {
                return Ok(0);
            }

            if let Some(hash) = &input.password_hash {
                diesel::update(users::table.find(id))
                    .set(users::password_hash.eq(hash))
                    .execute(conn)?;
            }

            diesel::insert_or_ignore_into(profiles::table)
                .values(&NewProfile {
                    user_id: id,
                    role: input.role.as_str(),
                    phone: None,
                    address: None,
                    theme: Theme::default().as_str(),
                })
                .execute(conn)?;
            diesel::update(profiles::table.filter(profiles::user_id.eq(id)))
                .set((
                    profiles::role.eq(input.role.as_str()),
                    profiles::phone.eq(input.phone.as_deref()),
                    profiles::address.eq(input.address.as_deref()),
                ))
                .execute(conn)?;
            Ok(touched)
        })
    }

    fn delete(conn: &mut SqliteConnection, id: i32) -> QueryResult<usize> {
        diesel::delete(users::table.find(id)).execute(conn)
    }

    fn id(&self) -> i32 {
        self.user.id
    }

    fn label(&self) -> String {
        self.user.username.clone()
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.user.username.as_str(),
            self.user.first_name.as_str(),
            self.user.last_name.as_str(),
            self.user.email.as_str(),
            self.role.map(Role::as_str).unwrap_or(""),
        ]
    }

    fn csv_row(&self) -> Vec<String> {
        vec![
            self.user.username.clone(),
            self.user.first_name.clone(),
            self.user.last_name.clone(),
            self.user.email.clone(),
            self.role_label.to_string(),
            self.phone.clone().unwrap_or_default(),
        ]
    }
}

pub const SELF_DELETE_MESSAGE: &str = "You cannot delete your own account!";

/// Deletes an account other than the acting user's own.
pub fn delete_account(
    conn: &mut SqliteConnection,
    logger: &ActivityLogger,
    ctx: &AuditContext,
    acting_user_id: i32,
    id: i32,
) -> Result<AccountRow, CrudError> {
    if id == acting_user_id {
        return Err(CrudError::invalid(SELF_DELETE_MESSAGE));
    }
    crud::remove::<AccountRow>(conn, logger, ctx, id)
}

/// First `limit` accounts, for the dashboard team panel.
pub fn team(conn: &mut SqliteConnection, limit: usize) -> QueryResult<Vec<AccountRow>> {
    let mut rows = AccountRow::list(conn)?;
    rows.retain(|r| r.role.is_some());
    rows.truncate(limit);
    Ok(rows)
}

/// Fields a user may change on their own account.
#[derive(Debug, FromForm)]
pub struct ProfileForm {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

pub fn update_own_profile(conn: &mut SqliteConnection, user_id: i32, form: ProfileForm) -> Result<(), CrudError> {
    let email = crud::required(form.email, "Email")?;
    conn.transaction::<_, CrudError, _>(|conn| {
        diesel::update(users::table.find(user_id))
            .set((
                users::first_name.eq(crud::optional(form.first_name).unwrap_or_default()),
                users::last_name.eq(crud::optional(form.last_name).unwrap_or_default()),
                users::email.eq(&email),
            ))
            .execute(conn)?;
        crate::auth::ensure_profile(conn, user_id)?;
        diesel::update(profiles::table.filter(profiles::user_id.eq(user_id)))
            .set((
                profiles::phone.eq(crud::optional(form.phone)),
                profiles::address.eq(crud::optional(form.address)),
            ))
            .execute(conn)?;
        Ok(())
    })
}

#[derive(Debug, FromForm)]
pub struct PasswordForm {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
    pub confirm_password: Option<String>,
}

/// Like [`crud::required`], without trimming: whitespace is part of a password.
fn password_field<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, CrudError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CrudError::invalid(format!("{field} is required.")))
}

/// Replaces the password after checking the current one.
pub fn change_password(conn: &mut SqliteConnection, user_id: i32, form: &PasswordForm) -> Result<(), CrudError> {
    let current = password_field(&form.current_password, "Current password")?;
    let new = password_field(&form.new_password, "New password")?;
    let confirm = password_field(&form.confirm_password, "Password confirmation")?;

    let current_hash: String = users::table
        .find(user_id)
        .select(users::password_hash)
        .first(conn)
        .optional()?
        .ok_or(CrudError::NotFound)?;

    if !bcrypt::verify(current, &current_hash).unwrap_or(false) {
        return Err(CrudError::invalid("Current password is incorrect."));
    }
    if new != confirm {
        return Err(CrudError::invalid("New passwords do not match."));
    }
    if new.chars().count() < MIN_PASSWORD_LEN {
        return Err(CrudError::invalid(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long."
        )));
    }

    let hash = hash_password(new)?;
    diesel::update(users::table.find(user_id))
        .set(users::password_hash.eq(hash))
        .execute(conn)?;
    Ok(())
}

pub fn set_theme(conn: &mut SqliteConnection, user_id: i32, theme: Theme) -> Result<(), CrudError> {
    crate::auth::ensure_profile(conn, user_id)?;
    diesel::update(profiles::table.filter(profiles::user_id.eq(user_id)))
        .set(profiles::theme.eq(theme.as_str()))
        .execute(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::testing::memory_logger;
    use crate::audit::Actor;
    use crate::auth::authenticate;
    use crate::db::{create_default_admin, testing::temp_pool};

    fn form(username: &str, password: &str) -> AccountForm {
        AccountForm {
            edit_id: None,
            username: Some(username.into()),
            first_name: Some("Sam".into()),
            last_name: Some("Helper".into()),
            email: Some(format!("{username}@clinic.test")),
            role: Some("assistant".into()),
            phone: Some("0611111111".into()),
            address: None,
            password: Some(password.into()),
            is_active: None,
        }
    }

    fn admin_ctx() -> AuditContext {
        AuditContext::default().with_actor(Actor { id: 1, username: "admin".into() })
    }

    #[test]
    fn create_makes_user_and_profile_together() {
        let (pool, _dir) = temp_pool();
        let mut conn = pool.get().unwrap();
        let (logger, sink) = memory_logger();

        let saved = crud::save::<AccountRow, _>(&mut conn, &logger, &admin_ctx(), form("sam", "longenough")).unwrap();
        let row = saved.record();

        assert_eq!(row.role, Some(Role::Assistant));
        assert_eq!(row.phone.as_deref(), Some("0611111111"));
        assert!(row.user.is_active);
        assert!(authenticate(&mut conn, "sam", "longenough").is_ok());
        assert_eq!(sink.actions(), vec!["create"]);
        assert_eq!(sink.events.lock().unwrap()[0].target_entity.as_deref(), Some("User"));
    }

    #[test]
    fn duplicate_username_is_a_validation_error() {
        let (pool, _dir) = temp_pool();
        let mut conn = pool.get().unwrap();
        let (logger, _sink) = memory_logger();

        crud::save::<AccountRow, _>(&mut conn, &logger, &admin_ctx(), form("sam", "longenough")).unwrap();
        let again = crud::save::<AccountRow, _>(&mut conn, &logger, &admin_ctx(), form("sam", "longenough"));

        match again {
            Err(CrudError::Validation(msg)) => assert_eq!(msg, DUPLICATE_USERNAME),
            _ => panic!("expected validation error"),
        }
        assert_eq!(AccountRow::list(&mut conn).unwrap().len(), 1);
    }

    #[test]
    fn short_or_missing_password_is_rejected_on_create() {
        let (pool, _dir) = temp_pool();
        let mut conn = pool.get().unwrap();
        let (logger, sink) = memory_logger();

        for password in ["short", ""] {
            let result = crud::save::<AccountRow, _>(&mut conn, &logger, &admin_ctx(), form("sam", password));
            assert!(matches!(result, Err(CrudError::Validation(_))));
        }
        assert!(sink.actions().is_empty());
    }

    #[test]
    fn update_keeps_password_unless_given_and_can_deactivate() {
        let (pool, _dir) = temp_pool();
        let mut conn = pool.get().unwrap();
        let (logger, _sink) = memory_logger();
        let id = crud::save::<AccountRow, _>(&mut conn, &logger, &admin_ctx(), form("sam", "longenough"))
            .unwrap()
            .record()
            .user
            .id;

        let mut edit = form("sam", "");
        edit.edit_id = Some(id);
        edit.role = Some("veterinarian".into());
        edit.is_active = Some(true);
        let row = crud::save::<AccountRow, _>(&mut conn, &logger, &admin_ctx(), edit).unwrap();
        assert_eq!(row.record().role, Some(Role::Veterinarian));
        assert!(authenticate(&mut conn, "sam", "longenough").is_ok());

        let mut deactivate = form("sam", "brandnewpass");
        deactivate.edit_id = Some(id);
        crud::save::<AccountRow, _>(&mut conn, &logger, &admin_ctx(), deactivate).unwrap();
        assert!(matches!(
            authenticate(&mut conn, "sam", "brandnewpass"),
            Err(crate::auth::AuthError::Inactive)
        ));
    }

    #[test]
    fn users_cannot_delete_themselves() {
        let (pool, _dir) = temp_pool();
        let mut conn = pool.get().unwrap();
        let (logger, sink) = memory_logger();
        create_default_admin(&mut conn, "pass1234").unwrap();
        let admin = AccountRow::list(&mut conn).unwrap().remove(0);

        let result = delete_account(&mut conn, &logger, &admin_ctx(), admin.user.id, admin.user.id);

        match result {
            Err(CrudError::Validation(msg)) => assert_eq!(msg, SELF_DELETE_MESSAGE),
            _ => panic!("expected rejection"),
        }
        assert_eq!(AccountRow::list(&mut conn).unwrap().len(), 1);
        assert!(sink.actions().is_empty());
    }

    #[test]
    fn csv_has_no_password_column() {
        let (pool, _dir) = temp_pool();
        let mut conn = pool.get().unwrap();
        let (logger, _sink) = memory_logger();
        crud::save::<AccountRow, _>(&mut conn, &logger, &admin_ctx(), form("sam", "longenough")).unwrap();

        let csv = crud::export::<AccountRow>(&mut conn, &logger, &admin_ctx(), None).unwrap();
        assert_eq!(
            csv,
            "Username,First Name,Last Name,Email,Role,Phone\r\nsam,Sam,Helper,sam@clinic.test,Assistant,0611111111\r\n"
        );
    }

    #[test]
    fn password_change_checks_current_and_confirmation() {
        let (pool, _dir) = temp_pool();
        let mut conn = pool.get().unwrap();
        create_default_admin(&mut conn, "pass1234").unwrap();
        let admin = AccountRow::list(&mut conn).unwrap().remove(0).user.id;

        let attempt = |current: &str, new: &str, confirm: &str| PasswordForm {
            current_password: Some(current.into()),
            new_password: Some(new.into()),
            confirm_password: Some(confirm.into()),
        };

        let wrong = change_password(&mut conn, admin, &attempt("nope", "newsecret1", "newsecret1"));
        assert_eq!(wrong.unwrap_err().to_string(), "Current password is incorrect.");
        let mismatch = change_password(&mut conn, admin, &attempt("pass1234", "newsecret1", "newsecret2"));
        assert_eq!(mismatch.unwrap_err().to_string(), "New passwords do not match.");
        let unconfirmed = PasswordForm { confirm_password: None, ..attempt("pass1234", "newsecret1", "") };
        let missing = change_password(&mut conn, admin, &unconfirmed);
        assert_eq!(missing.unwrap_err().to_string(), "Password confirmation is required.");
        let short = change_password(&mut conn, admin, &attempt("pass1234", "short", "short"));
        assert!(matches!(short, Err(CrudError::Validation(_))));

        change_password(&mut conn, admin, &attempt("pass1234", "newsecret1", "newsecret1")).unwrap();
        assert!(authenticate(&mut conn, "admin", "newsecret1").is_ok());
        assert!(authenticate(&mut conn, "admin", "pass1234").is_err());
    }

    #[test]
    fn own_profile_and_theme_updates() {
        let (pool, _dir) = temp_pool();
        let mut conn = pool.get().unwrap();
        create_default_admin(&mut conn, "pass1234").unwrap();
        let admin = AccountRow::list(&mut conn).unwrap().remove(0).user.id;

        update_own_profile(
            &mut conn,
            admin,
            ProfileForm {
                first_name: Some("Ada".into()),
                last_name: Some("Admin".into()),
                email: Some("ada@clinic.test".into()),
                phone: Some("0622222222".into()),
                address: Some(" ".into()),
            },
        )
        .unwrap();
        set_theme(&mut conn, admin, Theme::Light).unwrap();

        let row = AccountRow::find(&mut conn, admin).unwrap().unwrap();
        assert_eq!(row.user.display_name(), "Ada Admin");
        assert_eq!(row.phone.as_deref(), Some("0622222222"));
        assert_eq!(row.address, None);
        let session = crate::auth::SessionUser::load(&mut conn, admin).unwrap().unwrap();
        assert_eq!(session.theme, Theme::Light);
    }
}
