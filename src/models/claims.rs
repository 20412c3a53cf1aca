use serde::Serialize;

use super::accounts::Account;

/// What the identity provider asserts about the caller.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Claims {
    pub account_id: Option<String>,
    pub is_superuser: bool,
    pub can_create_post: bool,
    pub can_create_product: bool,
}

impl Claims {
    pub fn anonymous() -> Self {
        Claims::default()
    }

    pub fn for_account(account: &Account) -> Self {
        Claims {
            account_id: Some(account.id.clone()),
            is_superuser: account.is_superuser,
            can_create_post: account.can_create_post,
            can_create_product: account.can_create_product,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.account_id.is_some()
    }

    pub fn is_account(&self, account_id: &str) -> bool {
        self.account_id.as_deref() == Some(account_id)
    }
}
