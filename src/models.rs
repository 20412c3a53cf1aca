pub mod accounts;
pub mod claims;
pub mod referrals;
pub mod withdrawals;
