use std::collections::BTreeSet;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Unix milliseconds. Every timestamp in the crate uses it.
pub type Ms = i64;

/// Storage-assigned identity.
pub type Id = u64;

/// Identity of a record that has not been persisted yet.
pub const UNSET_ID: Id = 0;

pub const MINUTE_MS: Ms = 60_000;

/// Half-open interval `[start, end)`.
///
/// Zero-length spans are legal (a booking may start and end on the same
/// instant); reversed spans are rejected before a `Span` is ever built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start <= end, "Span start must not be after end");
        Self { start, end }
    }

    /// Saturates at `Ms::MAX` instead of wrapping for extreme endpoints.
    pub fn duration_ms(&self) -> Ms {
        self.end.saturating_sub(self.start)
    }

    /// Whole minutes covered, rounded down.
    pub fn whole_minutes(&self) -> i64 {
        self.duration_ms().max(0) / MINUTE_MS
    }

    /// Touching spans (one ends exactly when the other starts) do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("USER"),
            Role::Admin => f.write_str("ADMIN"),
        }
    }
}

/// Soft-delete predicate shared by every entity kind. Every listing and
/// lookup-by-id path filters on `is_active`.
pub trait SoftDelete {
    fn deleted_at(&self) -> Option<Ms>;

    fn is_active(&self) -> bool {
        self.deleted_at().is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceType {
    pub id: Id,
    pub name: String,
    pub cost_per_minute: Decimal,
    pub created_at: Ms,
    pub deleted_at: Option<Ms>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Court {
    pub id: Id,
    pub description: Option<String>,
    pub surface_id: Id,
    pub created_at: Ms,
    pub deleted_at: Option<Ms>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    /// Unique among active users; doubles as the session subject.
    pub phone_number: String,
    pub name: String,
    /// Opaque to this crate; only a `CredentialVerifier` interprets it.
    pub password_hash: String,
    pub roles: BTreeSet<Role>,
    pub created_at: Ms,
    pub deleted_at: Option<Ms>,
}

impl User {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Id,
    pub starts_at: Ms,
    pub ends_at: Ms,
    pub doubles: bool,
    /// Two fractional digits, never negative.
    pub cost: Decimal,
    pub court_id: Id,
    pub user_id: Id,
    pub created_at: Ms,
    pub deleted_at: Option<Ms>,
}

impl Booking {
    pub fn span(&self) -> Span {
        Span::new(self.starts_at, self.ends_at)
    }
}

macro_rules! impl_soft_delete {
    ($($ty:ty),*) => {
        $(impl SoftDelete for $ty {
            fn deleted_at(&self) -> Option<Ms> {
                self.deleted_at
            }
        })*
    };
}

impl_soft_delete!(SurfaceType, Court, User, Booking);

/// Caller-supplied booking request. `id` must be `UNSET_ID`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingDraft {
    pub id: Id,
    pub starts_at: Ms,
    pub ends_at: Ms,
    pub doubles: bool,
}

impl BookingDraft {
    pub fn new(starts_at: Ms, ends_at: Ms, doubles: bool) -> Self {
        Self {
            id: UNSET_ID,
            starts_at,
            ends_at,
            doubles,
        }
    }
}

/// Partial update of a booking; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingPatch {
    pub starts_at: Option<Ms>,
    pub ends_at: Option<Ms>,
    pub doubles: Option<bool>,
    /// Explicit cost; wins over the recomputed price.
    pub cost: Option<Decimal>,
}

impl BookingPatch {
    pub fn is_empty(&self) -> bool {
        self.starts_at.is_none()
            && self.ends_at.is_none()
            && self.doubles.is_none()
            && self.cost.is_none()
    }
}

/// A court together with every booking it has ever owned, active or not.
#[derive(Debug, Clone)]
pub struct CourtState {
    pub court: Court,
    /// Sorted by `(created_at, id)`, i.e. creation order.
    pub bookings: Vec<Booking>,
}

impl CourtState {
    pub fn new(court: Court) -> Self {
        Self {
            court,
            bookings: Vec::new(),
        }
    }

    /// Insert booking maintaining creation order.
    pub fn insert_booking(&mut self, booking: Booking) {
        let key = (booking.created_at, booking.id);
        let pos = self
            .bookings
            .binary_search_by_key(&key, |b| (b.created_at, b.id))
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    /// Replace a stored booking in place. Returns false if the id is unknown.
    pub fn replace_booking(&mut self, booking: Booking) -> bool {
        match self.bookings.iter_mut().find(|b| b.id == booking.id) {
            Some(slot) => {
                *slot = booking;
                true
            }
            None => false,
        }
    }

    pub fn active_booking(&self, id: Id) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id && b.is_active())
    }

    pub fn active_bookings(&self) -> impl Iterator<Item = &Booking> {
        self.bookings.iter().filter(|b| b.is_active())
    }

    /// Stamp `deleted_at` on a booking that is still active. Already deleted
    /// bookings keep their original timestamp.
    pub fn mark_booking_deleted(&mut self, id: Id, at: Ms) {
        if let Some(b) = self
            .bookings
            .iter_mut()
            .find(|b| b.id == id && b.deleted_at.is_none())
        {
            b.deleted_at = Some(at);
        }
    }
}

/// WAL record format. Flat, no nesting.
/// Each event is one atomic unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    SurfaceCreated(SurfaceType),
    CourtCreated(Court),
    UserCreated(User),
    BookingCreated(Booking),
    BookingUpdated {
        booking: Booking,
        /// An explicit cost replaced a different recomputed price.
        cost_overridden: bool,
    },
    BookingDeleted {
        id: Id,
        court_id: Id,
        at: Ms,
    },
    CourtDeleted {
        id: Id,
        at: Ms,
        /// Active bookings soft-deleted together with the court.
        bookings: Vec<Id>,
    },
    UserDeleted {
        id: Id,
        at: Ms,
        /// `(court_id, booking_id)` of every active booking the user owned.
        bookings: Vec<(Id, Id)>,
    },
}
