//! Role checks for privileged ledger mutations. Every predicate is pure and
//! only looks at the caller's [`Claims`].

use crate::models::claims::Claims;

pub fn can_toggle_permissions(actor: &Claims) -> bool {
    actor.is_superuser
}

pub fn can_process_withdrawal(actor: &Claims) -> bool {
    actor.is_superuser
}

pub fn can_create_post(actor: &Claims) -> bool {
    actor.is_authenticated() && actor.can_create_post
}

pub fn can_create_product(actor: &Claims) -> bool {
    actor.is_authenticated() && actor.can_create_product
}

/// Owners see their own referrals and ledger; superusers see everyone's.
pub fn can_view_account(actor: &Claims, account_id: &str) -> bool {
    actor.is_account(account_id) || actor.is_superuser
}

pub fn can_request_withdrawal(actor: &Claims, account_id: &str) -> bool {
    actor.is_account(account_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str) -> Claims {
        Claims {
            account_id: Some(id.to_string()),
            ..Claims::default()
        }
    }

    fn admin() -> Claims {
        Claims {
            account_id: Some("admin".to_string()),
            is_superuser: true,
            ..Claims::default()
        }
    }

    #[test]
    fn only_superusers_hold_admin_rights() {
        assert!(can_toggle_permissions(&admin()));
        assert!(can_process_withdrawal(&admin()));
        assert!(!can_toggle_permissions(&member("a")));
        assert!(!can_process_withdrawal(&member("a")));
        assert!(!can_process_withdrawal(&Claims::anonymous()));
    }

    #[test]
    fn creation_flags_require_authentication() {
        let anonymous_with_flags = Claims {
            can_create_post: true,
            can_create_product: true,
            ..Claims::default()
        };
        assert!(!can_create_post(&anonymous_with_flags));
        assert!(!can_create_product(&anonymous_with_flags));

        let writer = Claims {
            can_create_post: true,
            ..member("a")
        };
        assert!(can_create_post(&writer));
        assert!(!can_create_product(&writer));
    }

    #[test]
    fn superuser_flag_does_not_imply_creation_flags() {
        assert!(!can_create_post(&admin()));
        assert!(!can_create_product(&admin()));
    }

    #[test]
    fn account_views_are_owner_or_admin() {
        assert!(can_view_account(&member("a"), "a"));
        assert!(!can_view_account(&member("a"), "b"));
        assert!(can_view_account(&admin(), "b"));
        assert!(!can_view_account(&Claims::anonymous(), "a"));
    }

    #[test]
    fn withdrawals_are_requested_by_the_holder() {
        assert!(can_request_withdrawal(&member("a"), "a"));
        assert!(!can_request_withdrawal(&member("a"), "b"));
        assert!(!can_request_withdrawal(&admin(), "b"));
    }
}
