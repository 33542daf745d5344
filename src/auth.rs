//! Request guards: session resolution, role gates and request metadata.
//!
//! Every gated route takes a [`Staff<G>`] guard. Building it resolves the
//! session once per request (running the inactivity check), then walks the
//! guard chain for `G`. A failing chain yields 401/403; the catchers at the
//! bottom of this file turn those into redirects with a flash message.

use std::marker::PhantomData;

use chrono::Utc;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::{error, warn};
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::response::{Flash, Redirect};
use serde::Serialize;

use crate::audit::{Actor, AuditContext, ViewMark, client_ip};
use crate::models::{NewProfile, Profile, User};
use crate::rbac::{self, Denial, Gate, Privileged, Role, Standing, Theme};
use crate::schema::{profiles, users};
use crate::session::{SessionStore, Verdict};
use crate::state::AppState;

/// Identity behind the current session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionUser {
    pub id: i32,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Option<Role>,
    pub is_superuser: bool,
    pub theme: Theme,
}

impl Privileged for SessionUser {
    fn role(&self) -> Option<Role> {
        self.role
    }

    fn is_superuser(&self) -> bool {
        self.is_superuser
    }
}

impl SessionUser {
    /// Active user with their profile fields, if any.
    pub fn load(conn: &mut SqliteConnection, user_id: i32) -> QueryResult<Option<Self>> {
        let row = users::table
            .left_join(profiles::table)
            .filter(users::id.eq(user_id))
            .filter(users::is_active.eq(true))
            .select((
                User::as_select(),
                profiles::role.nullable(),
                profiles::theme.nullable(),
            ))
            .first::<(User, Option<String>, Option<String>)>(conn)
            .optional()?;

        Ok(row.map(|(user, role, theme)| SessionUser {
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            role: role.and_then(|r| r.parse().ok()),
            is_superuser: user.is_superuser,
            theme: theme.and_then(|t| t.parse().ok()).unwrap_or_default(),
        }))
    }

    pub fn actor(&self) -> Actor {
        Actor { id: self.id, username: self.username.clone() }
    }

    pub fn can(&self, gate: Gate) -> bool {
        rbac::allows(Some(self), gate)
    }
}

/// Session state for this request, computed once and cached on the request.
#[derive(Debug, Clone)]
pub enum SessionResolution {
    Anonymous,
    Expired(SessionUser),
    Active(SessionUser),
}

impl SessionResolution {
    pub fn standing(&self) -> Standing<'_, SessionUser> {
        match self {
            SessionResolution::Anonymous => Standing::Anonymous,
            SessionResolution::Expired(_) => Standing::Expired,
            SessionResolution::Active(user) => Standing::Active(user),
        }
    }

    pub fn user(&self) -> Option<&SessionUser> {
        match self {
            SessionResolution::Active(user) => Some(user),
            _ => None,
        }
    }
}

/// Client address and user agent, as recorded on audit events.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMeta {
    pub fn of(request: &Request<'_>) -> Self {
        let headers = request.headers();
        RequestMeta {
            ip_address: client_ip(
                headers.get_one("X-Forwarded-For"),
                request.remote().map(|addr| addr.ip()),
            ),
            user_agent: headers.get_one("User-Agent").map(str::to_string),
        }
    }

    pub fn context(&self, actor: Option<Actor>) -> AuditContext {
        AuditContext {
            actor,
            ip_address: self.ip_address.clone(),
            user_agent: self.user_agent.clone(),
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequestMeta {
    type Error = std::convert::Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(RequestMeta::of(request))
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for &'r ViewMark {
    type Error = std::convert::Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(request.local_cache(ViewMark::default))
    }
}

async fn resolve(request: &Request<'_>) -> SessionResolution {
    let cookies = request.cookies();
    let Some(user_id) = cookies.user_id() else {
        return SessionResolution::Anonymous;
    };
    let Some(state) = request.rocket().state::<AppState>() else {
        error!("AppState not managed; treating request as anonymous");
        return SessionResolution::Anonymous;
    };

    let last_activity = cookies.last_activity();
    let meta = RequestMeta::of(request);
    let pool = state.db_pool.clone();
    let logger = state.audit.clone();
    let policy = state.inactivity;

    let outcome = rocket::tokio::task::spawn_blocking(move || {
        let mut conn = match pool.get() {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to get DB connection for session lookup: {}", e);
                return None;
            }
        };
        let user = match SessionUser::load(&mut conn, user_id) {
            Ok(Some(user)) => user,
            Ok(None) => return None,
            Err(e) => {
                error!("Session lookup for user {} failed: {}", user_id, e);
                return None;
            }
        };
        drop(conn);

        let actor = user.actor();
        let ctx = meta.context(Some(actor.clone()));
        let verdict = policy.enforce(last_activity.as_deref(), Utc::now(), &logger, &ctx, &actor);
        Some((user, verdict))
    })
    .await;

    match outcome {
        Ok(Some((user, verdict @ Verdict::Active { .. }))) => {
            verdict.apply(cookies);
            SessionResolution::Active(user)
        }
        // Cookies changed by a failing guard are discarded, so the session is
        // destroyed by whoever answers the request (catcher or login page).
        Ok(Some((user, Verdict::Expired))) => SessionResolution::Expired(user),
        Ok(None) => SessionResolution::Anonymous,
        Err(e) => {
            error!("Session lookup task failed: {}", e);
            SessionResolution::Anonymous
        }
    }
}

/// Resolves (once) and returns the session for this request.
pub async fn current_session<'r>(request: &'r Request<'_>) -> &'r SessionResolution {
    request.local_cache_async(resolve(request)).await
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for &'r SessionResolution {
    type Error = std::convert::Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(current_session(request).await)
    }
}

/// Compile-time gate for [`Staff`].
pub trait GateLevel: Send + Sync + 'static {
    const GATE: Gate;
}

pub struct AdminGate;
pub struct VeterinarianGate;
pub struct AssistantGate;
pub struct ReceptionistGate;

impl GateLevel for AdminGate {
    const GATE: Gate = Gate::AdminOnly;
}

impl GateLevel for VeterinarianGate {
    const GATE: Gate = Gate::VeterinarianOrAbove;
}

impl GateLevel for AssistantGate {
    const GATE: Gate = Gate::AssistantOrAbove;
}

impl GateLevel for ReceptionistGate {
    const GATE: Gate = Gate::ReceptionistOrAbove;
}

/// An authenticated user who passed gate `G`, with the audit context of the request.
pub struct Staff<G: GateLevel> {
    pub user: SessionUser,
    pub audit: AuditContext,
    _gate: PhantomData<fn() -> G>,
}

pub type AdminUser = Staff<AdminGate>;
pub type VeterinarianUser = Staff<VeterinarianGate>;
pub type AssistantUser = Staff<AssistantGate>;
pub type AnyStaff = Staff<ReceptionistGate>;

fn denial_status(denial: Denial) -> Status {
    match denial {
        Denial::Expired | Denial::Unauthenticated => Status::Unauthorized,
        Denial::Forbidden(_) => Status::Forbidden,
    }
}

#[rocket::async_trait]
impl<'r, G: GateLevel> FromRequest<'r> for Staff<G> {
    type Error = Denial;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let session = current_session(request).await;
        let verdict = rbac::evaluate(&rbac::chain(G::GATE), session.standing());

        let denial = match (verdict, session) {
            (Ok(()), SessionResolution::Active(user)) => {
                let audit = RequestMeta::of(request).context(Some(user.actor()));
                return Outcome::Success(Staff {
                    user: user.clone(),
                    audit,
                    _gate: PhantomData,
                });
            }
            (Ok(()), _) => Denial::Unauthenticated,
            (Err(denial), _) => denial,
        };

        request.local_cache(|| denial);
        Outcome::Error((denial_status(denial), denial))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account is disabled")]
    Inactive,
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

/// Checks a username/password pair against the stored bcrypt hash.
pub fn authenticate(conn: &mut SqliteConnection, username: &str, password: &str) -> Result<User, AuthError> {
    let user = users::table
        .filter(users::username.eq(username))
        .select(User::as_select())
        .first::<User>(conn)
        .optional()?
        .ok_or(AuthError::InvalidCredentials)?;

    if !bcrypt::verify(password, &user.password_hash).unwrap_or(false) {
        return Err(AuthError::InvalidCredentials);
    }
    if !user.is_active {
        return Err(AuthError::Inactive);
    }
    Ok(user)
}

/// Guarantees exactly one profile for `user_id`, creating a receptionist
/// profile when none exists.
pub fn ensure_profile(conn: &mut SqliteConnection, user_id: i32) -> QueryResult<Profile> {
    diesel::insert_or_ignore_into(profiles::table)
        .values(&NewProfile {
            user_id,
            role: Role::default().as_str(),
            phone: None,
            address: None,
            theme: Theme::default().as_str(),
        })
        .execute(conn)?;

    profiles::table
        .filter(profiles::user_id.eq(user_id))
        .select(Profile::as_select())
        .first(conn)
}

/// Minimum length for any password set through the application.
pub const MIN_PASSWORD_LEN: usize = 8;

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
}

fn cached_denial(req: &Request<'_>) -> Denial {
    let denial = *req.local_cache(|| Denial::Unauthenticated);
    match (denial, req.local_cache(|| SessionResolution::Anonymous)) {
        (Denial::Unauthenticated, SessionResolution::Expired(_)) => Denial::Expired,
        (denial, _) => denial,
    }
}

#[catch(401)]
pub fn unauthorized(req: &Request<'_>) -> Flash<Redirect> {
    let denial = cached_denial(req);
    req.cookies().destroy();
    Flash::warning(Redirect::to(denial.redirect_to()), denial.message())
}

#[catch(403)]
pub fn forbidden(req: &Request<'_>) -> Flash<Redirect> {
    let denial = cached_denial(req);
    if !matches!(denial, Denial::Forbidden(_)) {
        warn!("403 without a cached denial for {}", req.uri());
    }
    Flash::warning(Redirect::to(denial.redirect_to()), denial.message())
}
