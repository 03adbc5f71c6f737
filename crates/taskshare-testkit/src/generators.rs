//! Proptest generators for property-based testing.

use proptest::prelude::*;

use taskshare_core::{CategoryId, Permission, TaskId, UserId};

/// Generate a permission.
pub fn permission() -> impl Strategy<Value = Permission> {
    prop_oneof![Just(Permission::View), Just(Permission::Edit)]
}

/// Generate user input naming a valid permission, in any case and with
/// stray whitespace.
pub fn permission_input() -> impl Strategy<Value = String> {
    (permission(), any::<bool>(), any::<bool>()).prop_map(|(p, upper, padded)| {
        let text = if upper {
            p.as_str().to_uppercase()
        } else {
            p.as_str().to_string()
        };
        if padded {
            format!(" {} ", text)
        } else {
            text
        }
    })
}

/// Generate a syntactically valid, already-normalized email.
pub fn email() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9._]{0,10}@[a-z][a-z0-9]{0,8}\\.(com|org|net|io)"
}

/// Re-case an email the way a user might type it.
pub fn recased(email: String) -> impl Strategy<Value = String> {
    prop::collection::vec(any::<bool>(), email.len()).prop_map(move |flips| {
        email
            .chars()
            .zip(flips)
            .map(|(c, flip)| if flip { c.to_ascii_uppercase() } else { c })
            .collect()
    })
}

/// Generate a string that is not a valid email.
pub fn invalid_email() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        "[a-z]{1,10}",
        "@[a-z]{1,8}\\.com",
        "[a-z]{1,8}@[a-z]{1,8}",
        "[a-z]{1,8} [a-z]{1,8}@example\\.com",
        "[a-z]{1,8}@@example\\.com",
        "[a-z]{1,8}@example\\.",
    ]
}

/// Generate a user id outside the range the fixtures seed.
pub fn extra_user_id() -> impl Strategy<Value = UserId> {
    (1_000i64..1_000_000).prop_map(UserId)
}

/// Generate a category id the fixtures never seed.
pub fn category_id() -> impl Strategy<Value = CategoryId> {
    (1_000i64..1_000_000).prop_map(CategoryId)
}

/// Generate a task id the fixtures never seed.
pub fn task_id() -> impl Strategy<Value = TaskId> {
    (1_000i64..1_000_000).prop_map(TaskId)
}
