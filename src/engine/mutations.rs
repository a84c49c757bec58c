use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tokio::sync::oneshot;
use tracing::info;

use crate::limits::MAX_COST_PER_MINUTE;
use crate::model::*;
use crate::observability::*;
use crate::pricing::{price, to_money};

use super::conflict::{check_no_conflict, now_ms, validate_order};
use super::{apply_to_catalog, apply_to_court, Engine, EngineError, WalCommand};

fn cost_out_of_range() -> EngineError {
    EngineError::invalid("booking cost is out of range")
}

impl Engine {
    // ── Reference data ───────────────────────────────────────

    pub async fn create_surface(&self, surface: SurfaceType) -> Result<SurfaceType, EngineError> {
        if surface.id != UNSET_ID {
            return Err(EngineError::invalid("trying to create a surface with a preset id"));
        }
        if surface.cost_per_minute <= Decimal::ZERO {
            return Err(EngineError::invalid("surface cost per minute must be positive"));
        }
        if surface.cost_per_minute > MAX_COST_PER_MINUTE {
            return Err(EngineError::invalid("surface cost per minute is too large"));
        }
        let _catalog = self.catalog_lock.lock().await;
        if self.store.active_surface_named(&surface.name) {
            return Err(EngineError::invalid(format!(
                "surface named {:?} already exists",
                surface.name
            )));
        }

        let surface = SurfaceType {
            id: self.store.surface_seq.next(),
            created_at: now_ms(),
            deleted_at: None,
            ..surface
        };
        self.persist_catalog(&Event::SurfaceCreated(surface.clone())).await?;
        info!(surface_id = surface.id, name = %surface.name, "surface created");
        Ok(surface)
    }

    pub async fn create_court(&self, court: Court) -> Result<Court, EngineError> {
        if court.id != UNSET_ID {
            return Err(EngineError::invalid("trying to create a court with a preset id"));
        }
        let _catalog = self.catalog_lock.lock().await;
        self.find_surface(court.surface_id)?;

        let court = Court {
            id: self.store.court_seq.next(),
            created_at: now_ms(),
            deleted_at: None,
            ..court
        };
        self.persist_catalog(&Event::CourtCreated(court.clone())).await?;
        info!(court_id = court.id, surface_id = court.surface_id, "court created");
        Ok(court)
    }

    pub async fn create_user(&self, user: User) -> Result<User, EngineError> {
        if user.id != UNSET_ID {
            return Err(EngineError::invalid("trying to create a user with a preset id"));
        }
        if user.phone_number.trim().is_empty() {
            return Err(EngineError::invalid("phone number is required"));
        }
        let _catalog = self.catalog_lock.lock().await;
        if self.store.user_id_by_phone(&user.phone_number).is_some() {
            return Err(EngineError::invalid("a user with this phone number already exists"));
        }

        let user = User {
            id: self.store.user_seq.next(),
            created_at: now_ms(),
            deleted_at: None,
            ..user
        };
        self.persist_catalog(&Event::UserCreated(user.clone())).await?;
        info!(user_id = user.id, "user created");
        Ok(user)
    }

    // ── Booking lifecycle ────────────────────────────────────

    /// Create a booking and return its realized cost.
    pub async fn create_booking(
        &self,
        draft: BookingDraft,
        court_id: Id,
        phone: &str,
    ) -> Result<Decimal, EngineError> {
        if draft.id != UNSET_ID {
            return Err(EngineError::invalid("trying to create a booking with a preset id"));
        }
        validate_order(draft.starts_at, draft.ends_at)?;

        let _owners = self.owner_gate.read().await;
        let user = self.find_user_by_phone(phone)?;
        if !user.has_role(Role::User) {
            return Err(EngineError::invalid("this user cannot reserve courts"));
        }

        let shared = self.shared_court(court_id)?;
        let mut guard = shared.write().await;
        if !guard.court.is_active() {
            return Err(EngineError::not_found("court", court_id));
        }
        check_no_conflict(&guard, draft.starts_at, draft.ends_at, UNSET_ID)?;

        let surface = self.store.surface(guard.court.surface_id);
        let cost = price(
            Some(draft.starts_at),
            Some(draft.ends_at),
            draft.doubles,
            surface.as_ref(),
        )
        .ok_or_else(cost_out_of_range)?;
        let booking = Booking {
            id: self.store.booking_seq.next(),
            starts_at: draft.starts_at,
            ends_at: draft.ends_at,
            doubles: draft.doubles,
            cost,
            court_id,
            user_id: user.id,
            created_at: now_ms(),
            deleted_at: None,
        };

        let event = Event::BookingCreated(booking.clone());
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(BOOKINGS_CREATED_TOTAL).increment(1);
        info!(booking_id = booking.id, court_id, user_id = user.id, %cost, "booking created");
        Ok(cost)
    }

    /// Apply a partial update. The price is recomputed after interval and
    /// mode changes; an explicit cost in the patch replaces it.
    pub async fn update_booking(&self, id: Id, patch: BookingPatch) -> Result<Booking, EngineError> {
        if patch.is_empty() {
            return Err(EngineError::invalid("at least one field must be supplied"));
        }
        if patch.cost.is_some_and(|c| c < Decimal::ZERO) {
            return Err(EngineError::invalid("booking cost cannot be negative"));
        }

        let mut guard = self.resolve_booking_write(id).await?;
        let mut booking = guard
            .active_booking(id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("booking", id))?;

        if let Some(start) = patch.starts_at {
            booking.starts_at = start;
        }
        if let Some(end) = patch.ends_at {
            booking.ends_at = end;
        }
        check_no_conflict(&guard, booking.starts_at, booking.ends_at, id)?;
        if let Some(doubles) = patch.doubles {
            booking.doubles = doubles;
        }

        let surface = self.store.surface(guard.court.surface_id);
        let recomputed = price(
            Some(booking.starts_at),
            Some(booking.ends_at),
            booking.doubles,
            surface.as_ref(),
        )
        .ok_or_else(cost_out_of_range)?;
        booking.cost = patch.cost.map(to_money).unwrap_or(recomputed);
        let cost_overridden = booking.cost != recomputed;
        if cost_overridden {
            metrics::counter!(COST_OVERRIDES_TOTAL).increment(1);
            info!(
                booking_id = id,
                computed = %recomputed,
                applied = %booking.cost,
                "booking cost overridden"
            );
        }

        let event = Event::BookingUpdated {
            booking: booking.clone(),
            cost_overridden,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(BOOKINGS_UPDATED_TOTAL).increment(1);
        info!(booking_id = id, cost = %booking.cost, "booking updated");
        Ok(booking)
    }

    pub async fn delete_booking(&self, id: Id) -> Result<Booking, EngineError> {
        let mut guard = self.resolve_booking_write(id).await?;
        let mut booking = guard
            .active_booking(id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("booking", id))?;

        let at = now_ms();
        let event = Event::BookingDeleted {
            id,
            court_id: booking.court_id,
            at,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        booking.deleted_at = Some(at);
        metrics::counter!(BOOKINGS_DELETED_TOTAL).increment(1);
        info!(booking_id = id, "booking deleted");
        Ok(booking)
    }

    // ── Cascading soft deletes ───────────────────────────────

    /// Soft-delete a court and, in the same WAL record, every active booking on it.
    pub async fn delete_court(&self, id: Id) -> Result<Court, EngineError> {
        let shared = self.shared_court(id)?;
        let mut guard = shared.write().await;
        if !guard.court.is_active() {
            return Err(EngineError::not_found("court", id));
        }

        let bookings: Vec<Id> = guard.active_bookings().map(|b| b.id).collect();
        let cascaded = bookings.len();
        let event = Event::CourtDeleted {
            id,
            at: now_ms(),
            bookings,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(CASCADE_DELETED_BOOKINGS_TOTAL).increment(cascaded as u64);
        info!(court_id = id, cascaded, "court deleted");
        Ok(guard.court.clone())
    }

    /// Soft-delete a user and, in the same WAL record, every active booking
    /// they own across all courts.
    pub async fn delete_user(&self, id: Id) -> Result<User, EngineError> {
        let _owners = self.owner_gate.write().await;
        let _catalog = self.catalog_lock.lock().await;
        let mut user = self
            .store
            .user(id)
            .filter(|u| u.is_active())
            .ok_or_else(|| EngineError::not_found("user", id))?;

        // Acquire court write locks in ascending order to prevent deadlocks.
        let mut by_court: BTreeMap<Id, Vec<Id>> = BTreeMap::new();
        for booking_id in self.store.bookings_of_user(id) {
            if let Some(court_id) = self.store.court_for_booking(booking_id) {
                by_court.entry(court_id).or_default().push(booking_id);
            }
        }
        let mut guards = Vec::with_capacity(by_court.len());
        for court_id in by_court.keys() {
            guards.push(self.shared_court(*court_id)?.write_owned().await);
        }

        let mut bookings = Vec::new();
        for guard in &guards {
            let court_id = guard.court.id;
            for booking_id in &by_court[&court_id] {
                if guard.active_booking(*booking_id).is_some() {
                    bookings.push((court_id, *booking_id));
                }
            }
        }

        let at = now_ms();
        let cascaded = bookings.len();
        let event = Event::UserDeleted { id, at, bookings };
        self.wal_append(&event).await?;
        apply_to_catalog(&self.store, &event);
        for guard in guards.iter_mut() {
            apply_to_court(guard, &event, &self.store);
        }

        user.deleted_at = Some(at);
        metrics::counter!(CASCADE_DELETED_BOOKINGS_TOTAL).increment(cascaded as u64);
        info!(user_id = id, cascaded, "user deleted");
        Ok(user)
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Compact the WAL by rewriting it with only the events needed to recreate
    /// the current state, soft-deleted rows included.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _owners = self.owner_gate.write().await;
        let _catalog = self.catalog_lock.lock().await;

        let mut events: Vec<Event> = Vec::new();
        events.extend(self.store.surfaces().into_iter().map(Event::SurfaceCreated));
        events.extend(self.store.users().into_iter().map(Event::UserCreated));

        // Court read locks stay held until the compacted file replaces the
        // log, so no write can land between the snapshot and the swap.
        let mut guards = Vec::new();
        let mut bookings = Vec::new();
        for court_id in self.store.court_ids() {
            let guard = self.shared_court(court_id)?.read_owned().await;
            events.push(Event::CourtCreated(guard.court.clone()));
            bookings.extend(guard.bookings.iter().cloned());
            guards.push(guard);
        }
        bookings.sort_by_key(|b| (b.created_at, b.id));
        events.extend(bookings.into_iter().map(Event::BookingCreated));

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        drop(guards);
        info!(events = count, "WAL compacted");
        Ok(())
    }

    /// Compact once the log holds more than `threshold` records. Returns
    /// whether a compaction ran.
    pub async fn compact_if_needed(&self, threshold: u64) -> Result<bool, EngineError> {
        let records = self.wal_records();
        if records <= threshold {
            return Ok(false);
        }
        self.compact_wal().await?;
        info!(before = records, after = self.wal_records(), threshold, "WAL compacted past threshold");
        Ok(true)
    }
}
