use serde::{Deserialize, Serialize};

/// Currency units paid out per point.
pub const CONVERSION_RATE: i64 = 1000;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Processed,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, sqlx::FromRow)]
pub struct WithdrawalRequest {
    pub id: String,
    pub account_id: String,
    pub points: i64,
    pub money_amount: i64,
    pub is_processed: bool,
    pub created_at: chrono::NaiveDateTime,
    pub processed_at: Option<chrono::NaiveDateTime>,
}

impl WithdrawalRequest {
    pub fn status(&self) -> WithdrawalStatus {
        if self.is_processed {
            WithdrawalStatus::Processed
        } else {
            WithdrawalStatus::Pending
        }
    }
}

/// A withdrawal about to be inserted. `money_amount` is fixed here and never
/// recomputed afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct NewWithdrawal {
    pub id: String,
    pub account_id: String,
    pub points: i64,
    pub money_amount: i64,
}

impl NewWithdrawal {
    pub fn new(account_id: &str, points: i64) -> Self {
        NewWithdrawal {
            id: uuid::Uuid::new_v4().hyphenated().to_string(),
            account_id: account_id.to_string(),
            points,
            money_amount: points * CONVERSION_RATE,
        }
    }
}

#[derive(Deserialize, Serialize)]
pub struct WithdrawalAmount {
    pub points: i64,
}

#[derive(Deserialize, Serialize)]
pub struct WithdrawalBatch {
    pub ids: Vec<String>,
}

/// Result of one entry in a batch processing run.
#[derive(Clone, Debug, Serialize)]
pub struct ProcessOutcome {
    pub withdrawal_id: String,
    pub withdrawal: Option<WithdrawalRequest>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct LedgerSummary {
    pub account_id: String,
    pub points: i64,
    pub remaining_points: i64,
    pub remaining_balance: i64,
    pub withdrawals: Vec<WithdrawalRequest>,
}

/// Points still claimable: the balance minus what pending requests have
/// reserved. Processed requests are already deducted from `points`.
pub fn remaining_points(points: i64, withdrawals: &[WithdrawalRequest]) -> i64 {
    let reserved: i64 = withdrawals
        .iter()
        .filter(|w| !w.is_processed)
        .map(|w| w.points)
        .sum();

    points - reserved
}
