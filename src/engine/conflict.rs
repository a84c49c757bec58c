use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// Reject a reversed interval or one outside the bookable range.
/// `start == end` is allowed.
pub(crate) fn validate_order(start: Ms, end: Ms) -> Result<Span, EngineError> {
    if end < start {
        return Err(EngineError::invalid(
            "booking start must be before its end",
        ));
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::invalid("booking time is out of range"));
    }
    let span = Span::new(start, end);
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::invalid("booking is longer than 31 days"));
    }
    Ok(span)
}

/// First active booking on the court overlapping `candidate`, ignoring
/// `exclude` (the booking being updated, or `UNSET_ID` on create).
pub(crate) fn find_conflict<'a>(
    cs: &'a CourtState,
    candidate: &Span,
    exclude: Id,
) -> Option<&'a Booking> {
    cs.active_bookings()
        .filter(|b| b.id != exclude)
        .find(|b| b.span().overlaps(candidate))
}

pub(crate) fn check_no_conflict(
    cs: &CourtState,
    start: Ms,
    end: Ms,
    exclude: Id,
) -> Result<Span, EngineError> {
    let candidate = validate_order(start, end)?;
    if let Some(existing) = find_conflict(cs, &candidate, exclude) {
        metrics::counter!(crate::observability::CONFLICTS_REJECTED_TOTAL).increment(1);
        tracing::debug!(
            court_id = cs.court.id,
            conflicting_booking = existing.id,
            "rejected overlapping booking"
        );
        return Err(EngineError::invalid(
            "there already exists a booking for this court overlapping with this one",
        ));
    }
    Ok(candidate)
}
