use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::referrals::Referral;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, sqlx::FromRow)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub email: String,
    pub phone_number: String,
    pub referral_code: String,
    pub points: i64,
    pub level: i32,
    pub is_superuser: bool,
    pub can_create_post: bool,
    pub can_create_product: bool,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

impl Account {
    pub fn has_permission(&self, permission: Permission) -> bool {
        match permission {
            Permission::Post => self.can_create_post,
            Permission::Product => self.can_create_product,
        }
    }

    pub fn toggle_permission(&mut self, permission: Permission) {
        match permission {
            Permission::Post => self.can_create_post = !self.can_create_post,
            Permission::Product => self.can_create_product = !self.can_create_product,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Registration {
    pub account: Account,
    pub referral: Option<Referral>,
}

/// Registration payload. `referrer_code` is the code of the account that
/// referred this one; `referral_code` is the new account's own code.
#[derive(Clone, Debug, Deserialize)]
pub struct RegisterAccount {
    pub username: String,
    pub email: String,
    pub phone_number: String,
    #[serde(default)]
    pub referral_code: Option<String>,
    #[serde(default)]
    pub referrer_code: Option<String>,
}

/// A validated account ready to be inserted.
#[derive(Clone, Debug, PartialEq)]
pub struct NewAccount {
    pub id: String,
    pub username: String,
    pub email: String,
    pub phone_number: String,
    pub referral_code: String,
    pub is_superuser: bool,
}

impl NewAccount {
    /// Trims the input and falls back to the phone number when no own
    /// referral code was given.
    pub fn from_registration(registration: &RegisterAccount) -> Result<Self, String> {
        let username = registration.username.trim();
        let phone_number = registration.phone_number.trim();

        if username.is_empty() {
            return Err("username must not be empty".to_string());
        }
        if phone_number.is_empty() {
            return Err("phone number must not be empty".to_string());
        }
        if phone_number.chars().count() > 15 {
            return Err("phone number must be at most 15 characters".to_string());
        }

        let referral_code = match registration.referral_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => code.to_string(),
            _ => phone_number.to_string(),
        };

        Ok(NewAccount {
            id: uuid::Uuid::new_v4().hyphenated().to_string(),
            username: username.to_string(),
            email: registration.email.trim().to_string(),
            phone_number: phone_number.to_string(),
            referral_code,
            is_superuser: false,
        })
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Post,
    Product,
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "post" => Ok(Permission::Post),
            "product" => Ok(Permission::Product),
            other => Err(format!("unknown permission: {}", other)),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::Post => write!(f, "post"),
            Permission::Product => write!(f, "product"),
        }
    }
}
