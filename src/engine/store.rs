use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::model::*;

use super::SharedCourtState;

/// Monotonic id source. Replay pushes it past every id it has seen.
#[derive(Debug, Default)]
pub struct Sequence(AtomicU64);

impl Sequence {
    pub fn next(&self) -> Id {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn observe(&self, id: Id) {
        self.0.fetch_max(id, Ordering::SeqCst);
    }
}

/// Storage backing the booking core. Bookings live inside their court's
/// state so the court lock serializes every write touching that court.
#[derive(Default)]
pub struct InMemoryStore {
    courts: DashMap<Id, SharedCourtState>,
    surfaces: DashMap<Id, SurfaceType>,
    users: DashMap<Id, User>,
    /// Active users only.
    phone_to_user: DashMap<String, Id>,
    /// Reverse lookup: booking id → court id
    booking_to_court: DashMap<Id, Id>,
    /// Owner → bookings index for user cascades and phone listings.
    user_bookings: DashMap<Id, Vec<Id>>,
    pub(super) booking_seq: Sequence,
    pub(super) court_seq: Sequence,
    pub(super) surface_seq: Sequence,
    pub(super) user_seq: Sequence,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Courts ───────────────────────────────────────────────

    pub fn court(&self, id: Id) -> Option<SharedCourtState> {
        self.courts.get(&id).map(|e| e.value().clone())
    }

    pub fn court_ids(&self) -> Vec<Id> {
        let mut ids: Vec<Id> = self.courts.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn insert_court(&self, court: Court) {
        self.court_seq.observe(court.id);
        self.courts
            .insert(court.id, Arc::new(RwLock::new(CourtState::new(court))));
    }

    // ── Surfaces ─────────────────────────────────────────────

    pub fn surface(&self, id: Id) -> Option<SurfaceType> {
        self.surfaces.get(&id).map(|e| e.value().clone())
    }

    pub fn surfaces(&self) -> Vec<SurfaceType> {
        let mut all: Vec<SurfaceType> = self.surfaces.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|s| s.id);
        all
    }

    pub fn insert_surface(&self, surface: SurfaceType) {
        self.surface_seq.observe(surface.id);
        self.surfaces.insert(surface.id, surface);
    }

    pub fn active_surface_named(&self, name: &str) -> bool {
        self.surfaces
            .iter()
            .any(|e| e.value().is_active() && e.value().name == name)
    }

    // ── Users ────────────────────────────────────────────────

    pub fn user(&self, id: Id) -> Option<User> {
        self.users.get(&id).map(|e| e.value().clone())
    }

    pub fn users(&self) -> Vec<User> {
        let mut all: Vec<User> = self.users.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|u| u.id);
        all
    }

    pub fn user_id_by_phone(&self, phone: &str) -> Option<Id> {
        self.phone_to_user.get(phone).map(|e| *e.value())
    }

    pub fn insert_user(&self, user: User) {
        self.user_seq.observe(user.id);
        if user.is_active() {
            self.phone_to_user.insert(user.phone_number.clone(), user.id);
        }
        self.users.insert(user.id, user);
    }

    pub fn mark_user_deleted(&self, id: Id, at: Ms) {
        if let Some(mut user) = self.users.get_mut(&id)
            && user.deleted_at.is_none()
        {
            user.deleted_at = Some(at);
            self.phone_to_user
                .remove_if(&user.phone_number, |_, owner| *owner == id);
        }
    }

    // ── Booking index ────────────────────────────────────────

    pub fn court_for_booking(&self, booking_id: Id) -> Option<Id> {
        self.booking_to_court.get(&booking_id).map(|e| *e.value())
    }

    pub fn bookings_of_user(&self, user_id: Id) -> Vec<Id> {
        self.user_bookings
            .get(&user_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    pub fn index_booking(&self, booking: &Booking) {
        self.booking_seq.observe(booking.id);
        self.booking_to_court.insert(booking.id, booking.court_id);
        let mut owned = self.user_bookings.entry(booking.user_id).or_default();
        if !owned.contains(&booking.id) {
            owned.push(booking.id);
        }
    }
}
