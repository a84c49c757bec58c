use serde::Serialize;

use crate::model::*;

use super::conflict::{find_conflict, now_ms, validate_order};
use super::{Engine, EngineError};

/// Row counts reported by the maintenance binary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub courts: usize,
    pub active_courts: usize,
    pub bookings: usize,
    pub active_bookings: usize,
    pub users: usize,
    pub surfaces: usize,
}

fn sort_by_creation(bookings: &mut [Booking]) {
    bookings.sort_by_key(|b| (b.created_at, b.id));
}

impl Engine {
    /// Does `[start, end)` overlap any active booking on the court other than
    /// `exclude`? Pass `UNSET_ID` when no booking exists yet.
    pub async fn conflicts(
        &self,
        start: Ms,
        end: Ms,
        court_id: Id,
        exclude: Id,
    ) -> Result<bool, EngineError> {
        let candidate = validate_order(start, end)?;
        let Some(shared) = self.store.court(court_id) else {
            return Ok(false);
        };
        let guard = shared.read().await;
        Ok(find_conflict(&guard, &candidate, exclude).is_some())
    }

    pub async fn find_booking(&self, id: Id) -> Result<Booking, EngineError> {
        let court_id = self
            .store
            .court_for_booking(id)
            .ok_or_else(|| EngineError::not_found("booking", id))?;
        let shared = self.shared_court(court_id)?;
        let guard = shared.read().await;
        guard
            .active_booking(id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("booking", id))
    }

    /// Every active booking, oldest first.
    pub async fn list_bookings(&self) -> Vec<Booking> {
        let mut all = Vec::new();
        for court_id in self.store.court_ids() {
            if let Some(shared) = self.store.court(court_id) {
                let guard = shared.read().await;
                all.extend(guard.active_bookings().cloned());
            }
        }
        sort_by_creation(&mut all);
        all
    }

    /// Active bookings of one court, oldest first. Unknown courts have none.
    pub async fn bookings_by_court(&self, court_id: Id) -> Vec<Booking> {
        let Some(shared) = self.store.court(court_id) else {
            return Vec::new();
        };
        let guard = shared.read().await;
        guard.active_bookings().cloned().collect()
    }

    /// Active bookings rented by the holder of `phone`, oldest first. With
    /// `future_only`, only bookings starting after the current instant.
    pub async fn bookings_by_phone(&self, phone: &str, future_only: bool) -> Vec<Booking> {
        let Some(user_id) = self.store.user_id_by_phone(phone) else {
            return Vec::new();
        };
        let now = now_ms();

        let mut found = Vec::new();
        for booking_id in self.store.bookings_of_user(user_id) {
            let Some(shared) = self
                .store
                .court_for_booking(booking_id)
                .and_then(|court_id| self.store.court(court_id))
            else {
                continue;
            };
            let guard = shared.read().await;
            if let Some(b) = guard.active_booking(booking_id)
                && (!future_only || b.starts_at > now)
            {
                found.push(b.clone());
            }
        }
        sort_by_creation(&mut found);
        found
    }

    // ── Reference-data lookups ───────────────────────────────

    pub async fn find_court(&self, id: Id) -> Result<Court, EngineError> {
        let shared = self.shared_court(id)?;
        let court = shared.read().await.court.clone();
        if !court.is_active() {
            return Err(EngineError::not_found("court", id));
        }
        Ok(court)
    }

    pub async fn list_courts(&self) -> Vec<Court> {
        let mut courts = Vec::new();
        for court_id in self.store.court_ids() {
            if let Some(shared) = self.store.court(court_id) {
                let guard = shared.read().await;
                if guard.court.is_active() {
                    courts.push(guard.court.clone());
                }
            }
        }
        courts
    }

    pub fn find_surface(&self, id: Id) -> Result<SurfaceType, EngineError> {
        self.store
            .surface(id)
            .filter(|s| s.is_active())
            .ok_or_else(|| EngineError::not_found("surface", id))
    }

    pub fn find_user(&self, id: Id) -> Result<User, EngineError> {
        self.store
            .user(id)
            .filter(|u| u.is_active())
            .ok_or_else(|| EngineError::not_found("user", id))
    }

    pub fn find_user_by_phone(&self, phone: &str) -> Result<User, EngineError> {
        self.store
            .user_id_by_phone(phone)
            .and_then(|id| self.store.user(id))
            .filter(|u| u.is_active())
            .ok_or_else(|| EngineError::not_found("user with phone", phone))
    }

    pub async fn stats(&self) -> EngineStats {
        let mut stats = EngineStats {
            users: self.store.users().iter().filter(|u| u.is_active()).count(),
            surfaces: self.store.surfaces().len(),
            ..Default::default()
        };
        for court_id in self.store.court_ids() {
            if let Some(shared) = self.store.court(court_id) {
                let guard = shared.read().await;
                stats.courts += 1;
                stats.active_courts += usize::from(guard.court.is_active());
                stats.bookings += guard.bookings.len();
                stats.active_bookings += guard.active_bookings().count();
            }
        }
        stats
    }
}
