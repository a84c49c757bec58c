use std::collections::BTreeSet;
use std::fmt;

use crate::model::{Role, User};
use crate::observability::AUTH_FAILURES_TOTAL;

use super::AuthError;

/// The authenticated principal, passed explicitly into every decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// The caller's phone number.
    pub identity: String,
    pub roles: BTreeSet<Role>,
}

impl Caller {
    pub fn new(identity: impl Into<String>, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            identity: identity.into(),
            roles: roles.into_iter().collect(),
        }
    }

    pub fn from_user(user: &User) -> Self {
        Self::new(user.phone_number.clone(), user.roles.iter().copied())
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }
}

/// What a caller is attempting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action<'a> {
    /// `find`, `findAll` and `findByCourt`.
    ReadBookings,
    /// Listing the bookings of the holder of this phone.
    ListBookingsOf(&'a str),
    /// Booking a court in the name of this phone.
    CreateBookingFor(&'a str),
    /// Update or delete of any booking.
    ModifyBookings,
    /// Court and user removal (cascading).
    ManageCatalog,
}

impl fmt::Display for Action<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::ReadBookings => f.write_str("read bookings"),
            Action::ListBookingsOf(phone) => write!(f, "list bookings of {phone}"),
            Action::CreateBookingFor(phone) => write!(f, "create a booking for {phone}"),
            Action::ModifyBookings => f.write_str("modify bookings"),
            Action::ManageCatalog => f.write_str("manage courts and users"),
        }
    }
}

/// Roles that grant an action, plus the identity that must match when the
/// action targets someone's own data. ADMIN satisfies every requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement<'a> {
    pub any_role: &'static [Role],
    pub owner: Option<&'a str>,
}

impl<'a> Action<'a> {
    pub fn requirement(&self) -> Requirement<'a> {
        match *self {
            Action::ReadBookings => Requirement {
                any_role: &[Role::User],
                owner: None,
            },
            Action::ListBookingsOf(phone) | Action::CreateBookingFor(phone) => Requirement {
                any_role: &[Role::User],
                owner: Some(phone),
            },
            Action::ModifyBookings | Action::ManageCatalog => Requirement {
                any_role: &[],
                owner: None,
            },
        }
    }
}

pub fn satisfies(caller: &Caller, requirement: &Requirement<'_>) -> bool {
    if caller.is_admin() {
        return true;
    }
    let has_role = requirement.any_role.iter().any(|r| caller.has_role(*r));
    let owns = requirement.owner.is_none_or(|owner| owner == caller.identity);
    has_role && owns
}

pub fn allowed(caller: &Caller, action: &Action<'_>) -> bool {
    satisfies(caller, &action.requirement())
}

/// `allowed`, as an outcome distinct from authentication failure.
pub fn authorize(caller: &Caller, action: &Action<'_>) -> Result<(), AuthError> {
    if allowed(caller, action) {
        return Ok(());
    }
    metrics::counter!(AUTH_FAILURES_TOTAL, "reason" => "forbidden").increment(1);
    tracing::debug!(caller = %caller.identity, %action, "access denied");
    Err(AuthError::Forbidden(format!("not allowed to {action}")))
}
