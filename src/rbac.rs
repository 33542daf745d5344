//! Role hierarchy and the guard chain evaluated before every protected handler.
//!
//! Roles form a total order of privilege. A [`Gate`] names the least
//! privileged role admitted to an operation; the superuser flag bypasses the
//! role check but never the authentication check.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Staff role, declared from least to most privileged so `Ord` follows privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Receptionist,
    Assistant,
    Veterinarian,
    Admin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Veterinarian, Role::Assistant, Role::Receptionist];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Veterinarian => "veterinarian",
            Role::Assistant => "assistant",
            Role::Receptionist => "receptionist",
        }
    }

    /// Human-readable name shown in tables and exports.
    pub fn label(self) -> &'static str {
        match self {
            Role::Admin => "Administrator",
            Role::Veterinarian => "Veterinarian",
            Role::Assistant => "Assistant",
            Role::Receptionist => "Receptionist",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown value '{}'", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "veterinarian" => Ok(Role::Veterinarian),
            "assistant" => Ok(Role::Assistant),
            "receptionist" => Ok(Role::Receptionist),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// UI theme stored on the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub const ALL: [Theme; 2] = [Theme::Dark, Theme::Light];

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Theme::Dark => "Dark",
            Theme::Light => "Light",
        }
    }
}

impl FromStr for Theme {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Minimum privilege required by an operation. Each gate admits a superset
/// of the roles admitted by the gate before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gate {
    AdminOnly,
    VeterinarianOrAbove,
    AssistantOrAbove,
    ReceptionistOrAbove,
}

impl Gate {
    pub const ALL: [Gate; 4] = [
        Gate::AdminOnly,
        Gate::VeterinarianOrAbove,
        Gate::AssistantOrAbove,
        Gate::ReceptionistOrAbove,
    ];

    pub fn minimum(self) -> Role {
        match self {
            Gate::AdminOnly => Role::Admin,
            Gate::VeterinarianOrAbove => Role::Veterinarian,
            Gate::AssistantOrAbove => Role::Assistant,
            Gate::ReceptionistOrAbove => Role::Receptionist,
        }
    }

    pub fn admits(self, role: Role) -> bool {
        role >= self.minimum()
    }

    pub fn allowed_roles(self) -> Vec<Role> {
        Role::ALL.into_iter().filter(|r| self.admits(*r)).collect()
    }
}

/// What the role check needs to know about an authenticated identity.
pub trait Privileged {
    /// `None` when the identity has no profile yet.
    fn role(&self) -> Option<Role>;
    fn is_superuser(&self) -> bool;
}

/// `allow` iff the identity is authenticated and either holds an admitted
/// role or is a superuser.
pub fn allows<P: Privileged>(identity: Option<&P>, gate: Gate) -> bool {
    match identity {
        Some(p) => p.is_superuser() || p.role().is_some_and(|r| gate.admits(r)),
        None => false,
    }
}

/// Session standing after the inactivity check has run.
#[derive(Debug)]
pub enum Standing<'a, P> {
    Anonymous,
    Expired,
    Active(&'a P),
}

impl<P> Clone for Standing<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for Standing<'_, P> {}

/// Why a request was turned away. All three are recoverable and end in a redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Expired,
    Unauthenticated,
    Forbidden(Gate),
}

impl Denial {
    pub fn redirect_to(self) -> &'static str {
        match self {
            Denial::Expired | Denial::Unauthenticated => "/login",
            Denial::Forbidden(_) => "/dashboard",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Denial::Expired => "You have been automatically logged out due to inactivity.",
            Denial::Unauthenticated => "Please log in to continue.",
            Denial::Forbidden(_) => "You don't have permission to access this page.",
        }
    }
}

/// One predicate in the guard chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardStep {
    AutoLogout,
    Authenticated,
    Role(Gate),
}

impl GuardStep {
    pub fn check<P: Privileged>(self, standing: Standing<'_, P>) -> Result<(), Denial> {
        match (self, standing) {
            (GuardStep::AutoLogout, Standing::Expired) => Err(Denial::Expired),
            (GuardStep::AutoLogout, _) => Ok(()),
            (GuardStep::Authenticated, Standing::Active(_)) => Ok(()),
            (GuardStep::Authenticated, _) => Err(Denial::Unauthenticated),
            (GuardStep::Role(gate), Standing::Active(p)) if allows(Some(p), gate) => Ok(()),
            (GuardStep::Role(gate), _) => Err(Denial::Forbidden(gate)),
        }
    }
}

/// Ordered chain for a gated operation: inactivity first, then login, then role.
pub fn chain(gate: Gate) -> [GuardStep; 3] {
    [GuardStep::AutoLogout, GuardStep::Authenticated, GuardStep::Role(gate)]
}

/// Runs every step in order and stops at the first denial.
pub fn evaluate<P: Privileged>(steps: &[GuardStep], standing: Standing<'_, P>) -> Result<(), Denial> {
    steps.iter().try_for_each(|step| step.check(standing))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Staff {
        role: Option<Role>,
        superuser: bool,
    }

    impl Privileged for Staff {
        fn role(&self) -> Option<Role> {
            self.role
        }
        fn is_superuser(&self) -> bool {
            self.superuser
        }
    }

    fn staff(role: Role) -> Staff {
        Staff { role: Some(role), superuser: false }
    }

    #[test]
    fn role_gate_matrix() {
        let expected = [
            // role,             admin, vet,  asst, recep
            (Role::Admin,        [true, true, true, true]),
            (Role::Veterinarian, [false, true, true, true]),
            (Role::Assistant,    [false, false, true, true]),
            (Role::Receptionist, [false, false, false, true]),
        ];
        for (role, row) in expected {
            for (gate, want) in Gate::ALL.into_iter().zip(row) {
                assert_eq!(
                    allows(Some(&staff(role)), gate),
                    want,
                    "{role} against {gate:?}"
                );
            }
        }
    }

    #[test]
    fn superuser_passes_every_gate() {
        let root = Staff { role: Some(Role::Receptionist), superuser: true };
        let no_profile = Staff { role: None, superuser: true };
        for gate in Gate::ALL {
            assert!(allows(Some(&root), gate));
            assert!(allows(Some(&no_profile), gate));
        }
    }

    #[test]
    fn anonymous_and_profileless_identities_are_denied() {
        let missing = Staff { role: None, superuser: false };
        for gate in Gate::ALL {
            assert!(!allows::<Staff>(None, gate));
            assert!(!allows(Some(&missing), gate));
        }
    }

    #[test]
    fn gates_are_nested() {
        assert_eq!(Gate::AdminOnly.allowed_roles(), vec![Role::Admin]);
        assert_eq!(Gate::ReceptionistOrAbove.allowed_roles(), Role::ALL.to_vec());
        for pair in Gate::ALL.windows(2) {
            let narrow = pair[0].allowed_roles();
            let wide = pair[1].allowed_roles();
            assert!(narrow.iter().all(|r| wide.contains(r)));
            assert!(wide.len() > narrow.len());
        }
    }

    #[test]
    fn chain_reports_first_failing_step() {
        let steps = chain(Gate::AdminOnly);
        let vet = staff(Role::Veterinarian);
        let admin = staff(Role::Admin);

        assert_eq!(evaluate::<Staff>(&steps, Standing::Expired), Err(Denial::Expired));
        assert_eq!(evaluate::<Staff>(&steps, Standing::Anonymous), Err(Denial::Unauthenticated));
        assert_eq!(
            evaluate(&steps, Standing::Active(&vet)),
            Err(Denial::Forbidden(Gate::AdminOnly))
        );
        assert_eq!(evaluate(&steps, Standing::Active(&admin)), Ok(()));
    }

    #[test]
    fn denials_redirect_to_login_or_dashboard() {
        assert_eq!(Denial::Expired.redirect_to(), "/login");
        assert_eq!(Denial::Unauthenticated.redirect_to(), "/login");
        assert_eq!(Denial::Forbidden(Gate::AdminOnly).redirect_to(), "/dashboard");
    }

    #[test]
    fn role_round_trips_through_text() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert!("owner".parse::<Role>().is_err());
        assert_eq!(Role::default(), Role::Receptionist);
    }
}
