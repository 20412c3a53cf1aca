use serde::{Deserialize, Serialize};

/// Referral edges are written once at registration and never change.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, sqlx::FromRow)]
pub struct Referral {
    pub id: String,
    pub referrer_id: String,
    pub referred_id: String,
    pub created_at: chrono::NaiveDateTime,
}

/// Points granted to the referrer for each successful referral.
pub const REFERRAL_BONUS: i64 = 5;

/// Number of referrals per level step.
pub const LEVEL_STEP: i64 = 10;

/// Level for a referrer with `referral_count` referrals. Below one full step
/// the current level is kept.
pub fn level_for(referral_count: i64, current_level: i32) -> i32 {
    if referral_count >= LEVEL_STEP {
        (referral_count / LEVEL_STEP + 1) as i32
    } else {
        current_level
    }
}
