use rust_decimal::Decimal;

use crate::model::Ms;

/// 1970-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;
/// One booking holds a court for 31 days at most.
pub const MAX_SPAN_DURATION_MS: Ms = 31 * 24 * 3_600_000;

/// Upper bound for a surface rate, 1 000 000 per minute.
pub const MAX_COST_PER_MINUTE: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);
