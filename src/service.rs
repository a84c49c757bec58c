use std::sync::Arc;

use rust_decimal::Decimal;

use crate::auth::policy::authorize;
use crate::auth::{Action, Caller, SessionManager, TokenPair};
use crate::engine::Engine;
use crate::error::ServiceError;
use crate::model::*;

/// Request boundary: every call authenticates the `Authorization` header,
/// runs the access decision, then hands over to the engine.
pub struct BookingService {
    engine: Arc<Engine>,
    sessions: SessionManager,
}

impl BookingService {
    pub fn new(engine: Arc<Engine>, sessions: SessionManager) -> Self {
        Self { engine, sessions }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    fn admit(&self, auth: Option<&str>, action: Action<'_>) -> Result<Caller, ServiceError> {
        let caller = self.sessions.authenticate(auth)?;
        authorize(&caller, &action)?;
        Ok(caller)
    }

    // ── Sessions ─────────────────────────────────────────────

    pub async fn login(&self, phone: &str, password: &str) -> Result<TokenPair, ServiceError> {
        Ok(self.sessions.login(phone, password).await?)
    }

    pub fn refresh(&self, refresh_token: &str) -> Result<String, ServiceError> {
        Ok(self.sessions.refresh(refresh_token)?)
    }

    // ── Reads ────────────────────────────────────────────────

    pub async fn find_booking(&self, auth: Option<&str>, id: Id) -> Result<Booking, ServiceError> {
        self.admit(auth, Action::ReadBookings)?;
        Ok(self.engine.find_booking(id).await?)
    }

    pub async fn list_bookings(&self, auth: Option<&str>) -> Result<Vec<Booking>, ServiceError> {
        self.admit(auth, Action::ReadBookings)?;
        Ok(self.engine.list_bookings().await)
    }

    pub async fn bookings_by_court(
        &self,
        auth: Option<&str>,
        court_id: Id,
    ) -> Result<Vec<Booking>, ServiceError> {
        self.admit(auth, Action::ReadBookings)?;
        Ok(self.engine.bookings_by_court(court_id).await)
    }

    pub async fn bookings_by_phone(
        &self,
        auth: Option<&str>,
        phone: &str,
        future_only: bool,
    ) -> Result<Vec<Booking>, ServiceError> {
        self.admit(auth, Action::ListBookingsOf(phone))?;
        Ok(self.engine.bookings_by_phone(phone, future_only).await)
    }

    // ── Writes ───────────────────────────────────────────────

    /// Book `court_id` for the holder of `phone`; returns the realized cost.
    pub async fn create_booking(
        &self,
        auth: Option<&str>,
        draft: BookingDraft,
        court_id: Id,
        phone: &str,
    ) -> Result<Decimal, ServiceError> {
        self.admit(auth, Action::CreateBookingFor(phone))?;
        Ok(self.engine.create_booking(draft, court_id, phone).await?)
    }

    pub async fn update_booking(
        &self,
        auth: Option<&str>,
        id: Id,
        patch: BookingPatch,
    ) -> Result<Booking, ServiceError> {
        let caller = self.admit(auth, Action::ModifyBookings)?;
        let updated = self.engine.update_booking(id, patch).await?;
        tracing::info!(booking_id = id, by = %caller.identity, "booking changed by administrator");
        Ok(updated)
    }

    pub async fn delete_booking(&self, auth: Option<&str>, id: Id) -> Result<Booking, ServiceError> {
        self.admit(auth, Action::ModifyBookings)?;
        Ok(self.engine.delete_booking(id).await?)
    }

    pub async fn delete_court(&self, auth: Option<&str>, id: Id) -> Result<Court, ServiceError> {
        self.admit(auth, Action::ManageCatalog)?;
        Ok(self.engine.delete_court(id).await?)
    }

    pub async fn delete_user(&self, auth: Option<&str>, id: Id) -> Result<User, ServiceError> {
        self.admit(auth, Action::ManageCatalog)?;
        Ok(self.engine.delete_user(id).await?)
    }
}
