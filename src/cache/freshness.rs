//! Per-request decision on whether to bypass the cache.
//!
//! Precedence: explicit boolean, then explicit key list, then the request's
//! `fresh` query parameter. The request path is role-gated so anonymous
//! callers cannot force expensive recomputation; a denied request is treated
//! as "not forced" without any error.

use crate::domain::users::Role;

/// Caller-supplied override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForceFresh {
    Always(bool),
    /// Comma-separated allow-list of keys.
    Keys(String),
}

impl From<bool> for ForceFresh {
    fn from(value: bool) -> Self {
        ForceFresh::Always(value)
    }
}

/// What the policy needs to know about the incoming request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreshnessContext {
    pub role: Role,
    /// Raw `fresh` query parameter; `Some("")` when present without a value.
    pub fresh: Option<String>,
}

impl FreshnessContext {
    pub fn new(role: Role, fresh: Option<String>) -> Self {
        Self { role, fresh }
    }
}

pub fn should_force_fresh(
    force_fresh: Option<&ForceFresh>,
    context: Option<&FreshnessContext>,
    key: &str,
) -> bool {
    match force_fresh {
        Some(ForceFresh::Always(flag)) => return *flag,
        Some(ForceFresh::Keys(list)) => return list_contains(list, key),
        None => {}
    }

    let Some(context) = context else {
        return false;
    };
    let Some(fresh) = context.fresh.as_deref() else {
        return false;
    };
    if !context.role.is_admin() {
        return false;
    }
    if fresh.is_empty() {
        return true;
    }
    list_contains(fresh, key)
}

fn list_contains(list: &str, key: &str) -> bool {
    list.split(',').any(|candidate| candidate == key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "content:data:projects";

    fn request(role: Role, fresh: Option<&str>) -> FreshnessContext {
        FreshnessContext::new(role, fresh.map(str::to_string))
    }

    #[test]
    fn explicit_boolean_wins_over_request() {
        let admin = request(Role::Admin, Some(""));
        assert!(!should_force_fresh(
            Some(&ForceFresh::Always(false)),
            Some(&admin),
            KEY
        ));
        assert!(should_force_fresh(
            Some(&ForceFresh::Always(true)),
            None,
            KEY
        ));
    }

    #[test]
    fn explicit_list_matches_whole_keys() {
        let list = ForceFresh::Keys(format!("content:talks,{KEY}"));
        assert!(should_force_fresh(Some(&list), None, KEY));

        let partial = ForceFresh::Keys("content:data".to_string());
        assert!(!should_force_fresh(Some(&partial), None, KEY));
    }

    #[test]
    fn explicit_list_ignores_request_context() {
        let admin = request(Role::Admin, Some(""));
        let list = ForceFresh::Keys("other".to_string());
        assert!(!should_force_fresh(Some(&list), Some(&admin), KEY));
    }

    #[test]
    fn no_context_or_parameter_never_forces() {
        assert!(!should_force_fresh(None, None, KEY));
        assert!(!should_force_fresh(None, Some(&request(Role::Admin, None)), KEY));
    }

    #[test]
    fn anonymous_fresh_parameter_is_silently_ignored() {
        assert!(!should_force_fresh(
            None,
            Some(&request(Role::Anonymous, Some(""))),
            KEY
        ));
        assert!(!should_force_fresh(
            None,
            Some(&request(Role::Anonymous, Some(KEY))),
            KEY
        ));
    }

    #[test]
    fn admin_empty_parameter_forces_every_key() {
        let admin = request(Role::Admin, Some(""));
        assert!(should_force_fresh(None, Some(&admin), KEY));
        assert!(should_force_fresh(None, Some(&admin), "anything"));
    }

    #[test]
    fn admin_parameter_list_is_an_allow_list() {
        let admin = request(Role::Admin, Some("content:talks,content:data:projects"));
        assert!(should_force_fresh(None, Some(&admin), KEY));
        assert!(!should_force_fresh(None, Some(&admin), "user:1"));
    }
}
