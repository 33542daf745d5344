//! Session state kept in private cookies, and the inactivity timeout applied to it.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeDelta, Utc};
use log::debug;
use rocket::http::{Cookie, CookieJar};

use crate::audit::{ActivityLogger, Actor, AuditContext};

pub const SESSION_USER: &str = "user_id";
pub const LAST_ACTIVITY: &str = "last_activity";

/// Read/write access to the current request's session.
pub trait SessionStore {
    fn user_id(&self) -> Option<i32>;
    fn last_activity(&self) -> Option<String>;
    fn begin(&self, user_id: i32, now: DateTime<Utc>);
    fn touch(&self, stamp: DateTime<Utc>);
    fn destroy(&self);
}

impl SessionStore for CookieJar<'_> {
    fn user_id(&self) -> Option<i32> {
        self.get_private(SESSION_USER)
            .and_then(|c| c.value().parse().ok())
    }

    fn last_activity(&self) -> Option<String> {
        self.get_private(LAST_ACTIVITY)
            .map(|c| c.value().to_string())
    }

    fn begin(&self, user_id: i32, now: DateTime<Utc>) {
        self.add_private(Cookie::new(SESSION_USER, user_id.to_string()));
        self.touch(now);
    }

    fn touch(&self, stamp: DateTime<Utc>) {
        self.add_private(Cookie::new(LAST_ACTIVITY, format_stamp(stamp)));
    }

    fn destroy(&self) {
        self.remove_private(SESSION_USER);
        self.remove_private(LAST_ACTIVITY);
    }
}

pub fn format_stamp(stamp: DateTime<Utc>) -> String {
    stamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// RFC 3339, or a naive ISO-8601 timestamp taken as UTC.
pub fn parse_stamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|n| n.and_utc())
        })
}

/// What the stored `last_activity` says about the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// No stamp yet.
    First,
    Active { last: DateTime<Utc> },
    /// Stamp present but unreadable; treated like `First`.
    Corrupt,
    Expired { elapsed: TimeDelta },
}

impl Activity {
    /// Stamp to store after this request, `None` once expired.
    /// Never moves an existing stamp backwards.
    pub fn refreshed_stamp(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Activity::First | Activity::Corrupt => Some(now),
            Activity::Active { last } => Some(last.max(now)),
            Activity::Expired { .. } => None,
        }
    }
}

/// Outcome of the inactivity check for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Active { refresh: DateTime<Utc> },
    Expired,
}

impl Verdict {
    pub fn apply<S: SessionStore + ?Sized>(self, store: &S) {
        match self {
            Verdict::Active { refresh } => store.touch(refresh),
            Verdict::Expired => store.destroy(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InactivityPolicy {
    timeout: TimeDelta,
}

impl InactivityPolicy {
    pub fn new(timeout_secs: i64) -> Self {
        Self { timeout: TimeDelta::seconds(timeout_secs) }
    }

    pub fn timeout_secs(&self) -> i64 {
        self.timeout.num_seconds()
    }

    pub fn assess(&self, last_activity: Option<&str>, now: DateTime<Utc>) -> Activity {
        let Some(raw) = last_activity else {
            return Activity::First;
        };
        let Some(last) = parse_stamp(raw) else {
            debug!("Ignoring unreadable last_activity value {:?}", raw);
            return Activity::Corrupt;
        };

        let elapsed = now - last;
        if elapsed > self.timeout {
            Activity::Expired { elapsed }
        } else {
            Activity::Active { last }
        }
    }

    /// Runs the ACTIVE/EXPIRED transition for `user`. Expiry writes exactly
    /// one `auto_logout` event; the caller applies the verdict to the session.
    pub fn enforce(
        &self,
        last_activity: Option<&str>,
        now: DateTime<Utc>,
        logger: &ActivityLogger,
        ctx: &AuditContext,
        user: &Actor,
    ) -> Verdict {
        match self.assess(last_activity, now).refreshed_stamp(now) {
            Some(refresh) => Verdict::Active { refresh },
            None => {
                logger.log_auto_logout(ctx, user);
                Verdict::Expired
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::audit::testing::memory_logger;

    #[derive(Default)]
    struct FakeSession {
        user: RefCell<Option<i32>>,
        stamp: RefCell<Option<String>>,
    }

    impl SessionStore for FakeSession {
        fn user_id(&self) -> Option<i32> {
            *self.user.borrow()
        }
        fn last_activity(&self) -> Option<String> {
            self.stamp.borrow().clone()
        }
        fn begin(&self, user_id: i32, now: DateTime<Utc>) {
            *self.user.borrow_mut() = Some(user_id);
            self.touch(now);
        }
        fn touch(&self, stamp: DateTime<Utc>) {
            *self.stamp.borrow_mut() = Some(format_stamp(stamp));
        }
        fn destroy(&self) {
            *self.user.borrow_mut() = None;
            *self.stamp.borrow_mut() = None;
        }
    }

    fn alice() -> (Actor, AuditContext) {
        let actor = Actor { id: 42, username: "alice".into() };
        (actor.clone(), AuditContext::default().with_actor(actor))
    }

    fn session_idle_for(seconds: i64, now: DateTime<Utc>) -> FakeSession {
        let session = FakeSession::default();
        session.begin(42, now - TimeDelta::seconds(seconds));
        session
    }

    fn run(session: &FakeSession, now: DateTime<Utc>) -> (Verdict, Vec<crate::models::NewAuditEvent>) {
        let (logger, sink) = memory_logger();
        let (actor, ctx) = alice();
        let policy = InactivityPolicy::new(1800);
        let verdict = policy.enforce(session.last_activity().as_deref(), now, &logger, &ctx, &actor);
        verdict.apply(session);
        let events = sink.events.lock().unwrap().clone();
        (verdict, events)
    }

    #[test]
    fn expires_after_timeout_with_one_event() {
        let now = Utc::now();
        let session = session_idle_for(1801, now);

        let (verdict, events) = run(&session, now);

        assert_eq!(verdict, Verdict::Expired);
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.action, "auto_logout");
        assert_eq!(event.user_id, Some(42));
        assert_eq!(event.target_entity.as_deref(), Some("auth_user"));
        assert_eq!(event.target_id, Some(42));
        assert_eq!(session.user_id(), None);
        assert_eq!(session.last_activity(), None);
    }

    #[test]
    fn stays_active_within_timeout_and_refreshes() {
        let now = Utc::now();
        let session = session_idle_for(1799, now);

        let (verdict, events) = run(&session, now);

        assert_eq!(verdict, Verdict::Active { refresh: now });
        assert!(events.is_empty());
        assert_eq!(session.user_id(), Some(42));
        assert_eq!(session.last_activity(), Some(format_stamp(now)));
    }

    #[test]
    fn exact_timeout_is_still_active() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let policy = InactivityPolicy::new(1800);
        let stamp = format_stamp(now - TimeDelta::seconds(1800));
        assert!(matches!(policy.assess(Some(&stamp), now), Activity::Active { .. }));
    }

    #[test]
    fn corrupt_stamp_is_reset_without_error() {
        let now = Utc::now();
        let session = FakeSession::default();
        *session.user.borrow_mut() = Some(42);
        *session.stamp.borrow_mut() = Some("not-a-date".into());

        let (verdict, events) = run(&session, now);

        assert_eq!(verdict, Verdict::Active { refresh: now });
        assert!(events.is_empty());
        assert_eq!(session.last_activity(), Some(format_stamp(now)));
    }

    #[test]
    fn missing_stamp_counts_as_first_activity() {
        let now = Utc::now();
        let policy = InactivityPolicy::new(1800);
        assert_eq!(policy.assess(None, now), Activity::First);
        assert_eq!(Activity::First.refreshed_stamp(now), Some(now));
    }

    #[test]
    fn future_stamp_is_not_moved_backwards() {
        let now = Utc::now();
        // Stamps are stored at microsecond precision.
        let later = parse_stamp(&format_stamp(now + TimeDelta::seconds(30))).unwrap();
        let policy = InactivityPolicy::new(1800);
        let activity = policy.assess(Some(&format_stamp(later)), now);
        assert_eq!(activity.refreshed_stamp(now), Some(later));
    }

    #[test]
    fn naive_iso_stamps_are_accepted() {
        let parsed = parse_stamp("2024-05-01T08:30:00.123456").unwrap();
        assert_eq!(format_stamp(parsed), "2024-05-01T08:30:00.123456Z");
        assert!(parse_stamp("2024-05-01 08:30").is_none());
    }
}
