//! Brute-force lockout state machine over `failure_count` / `frozen_until`.
//!
//! Every sixth consecutive failure freezes the account for another 15-minute
//! block: `15 min × floor(failures / 6)`. The freeze gate always runs before
//! the password comparison, and a frozen account never accrues further
//! failures.

use chrono::{DateTime, Duration, Utc};

use super::{error::AuthError, store::UserRecord};

/// Failures needed before the first freeze.
pub const FREEZE_THRESHOLD: i32 = 6;
/// Length of one freeze block.
pub const FREEZE_BLOCK_MINUTES: i64 = 15;

/// Account status ordinals. Anything at or above `INACTIVATED` cannot
/// authenticate; `DELETED` is a stronger form of the same.
pub const STATUS_ACTIVE: i16 = 0;
pub const STATUS_INACTIVATED: i16 = 90;
pub const STATUS_DELETED: i16 = 99;

/// Freeze duration after the given consecutive-failure count, if any.
#[must_use]
pub fn freeze_after(failure_count: i32) -> Option<Duration> {
    if failure_count < FREEZE_THRESHOLD {
        return None;
    }
    let blocks = i64::from(failure_count / FREEZE_THRESHOLD);
    Some(Duration::minutes(FREEZE_BLOCK_MINUTES * blocks))
}

/// Whether the status ordinal blocks authentication.
#[must_use]
pub const fn disabled(status: i16) -> bool {
    status >= STATUS_INACTIVATED
}

/// Record one more consecutive failure for the user, computing the freeze
/// expiry the new count produces. Returns the new counter value.
///
/// # Errors
/// Propagates store failures.
pub async fn register_failure<U: super::store::UserStore + ?Sized>(
    users: &U,
    user: &UserRecord,
    now: DateTime<Utc>,
) -> anyhow::Result<i32> {
    let failure_count = user.failure_count + 1;
    let frozen_until = freeze_after(failure_count).map(|penalty| now + penalty);
    users
        .record_failure(&user.id, failure_count, frozen_until)
        .await?;
    Ok(failure_count)
}

/// Freeze and status gate, in that order, before any password comparison.
///
/// # Errors
/// `UserFrozen` (carrying `frozen_until`) while `now <= frozen_until`,
/// `AccountDisabled` when the status ordinal blocks authentication.
pub fn check_gate(user: &UserRecord, now: DateTime<Utc>) -> Result<(), AuthError> {
    if let Some(frozen_until) = user.frozen_until {
        if now <= frozen_until {
            return Err(AuthError::UserFrozen { frozen_until });
        }
    }

    if disabled(user.status) {
        return Err(AuthError::AccountDisabled);
    }

    Ok(())
}
