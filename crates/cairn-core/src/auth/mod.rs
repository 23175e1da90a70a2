//! Auth policy: pure permission/scope calculation plus a sliding-window
//! rate limiter (spec.md §4.8). No network code or token issuance lives
//! here — the daemon binary extracts `Claims` from the transport and calls
//! into this module.

mod rate_limiter;

pub use rate_limiter::{AuthRateLimiter, RateLimitStatus};

use crate::config::{AuthMode, RateLimitsConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Operator,
    Agent,
    Readonly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    Remember,
    Recall,
    Modify,
    Forget,
    Recover,
    Admin,
    Documents,
    Connectors,
    Diagnostics,
}

/// Claims presented by an authenticated caller. `scope` dimensions left as
/// `None` are unconstrained for that dimension.
#[derive(Debug, Clone, Default)]
pub struct Claims {
    pub role: Option<Role>,
    pub project: Option<String>,
    pub agent: Option<String>,
    pub user: Option<String>,
}

/// The dimensions of an operation's target, checked against a caller's
/// scoped claims.
#[derive(Debug, Clone, Default)]
pub struct ScopeTarget {
    pub project: Option<String>,
    pub agent: Option<String>,
    pub user: Option<String>,
}

fn permissions_for_role(role: Role) -> &'static [Permission] {
    use Permission::*;
    match role {
        Role::Admin => &[Remember, Recall, Modify, Forget, Recover, Admin, Documents, Connectors, Diagnostics],
        Role::Operator => &[Remember, Recall, Modify, Forget, Recover, Documents, Connectors, Diagnostics],
        Role::Agent => &[Remember, Recall, Modify, Forget, Recover, Documents],
        Role::Readonly => &[Recall],
    }
}

/// `local`/`local-notoken` modes trust the caller unconditionally; `hybrid`
/// and `team` require claims and consult the role's permission set.
pub fn check_permission(claims: Option<&Claims>, perm: Permission, mode: AuthMode) -> bool {
    match mode {
        AuthMode::Local | AuthMode::LocalNoToken => true,
        AuthMode::Hybrid | AuthMode::Team => match claims.and_then(|c| c.role) {
            Some(role) => permissions_for_role(role).contains(&perm),
            None => false,
        },
    }
}

/// `local` allows everything; otherwise admin bypasses, an empty claim
/// scope means full access, and each set claim dimension must equal the
/// corresponding target dimension when that dimension is also set on the
/// target.
pub fn check_scope(claims: Option<&Claims>, target: &ScopeTarget, mode: AuthMode) -> bool {
    if mode == AuthMode::Local {
        return true;
    }
    let Some(claims) = claims else { return false };
    if claims.role == Some(Role::Admin) {
        return true;
    }
    if claims.project.is_none() && claims.agent.is_none() && claims.user.is_none() {
        return true;
    }
    dimension_matches(&claims.project, &target.project)
        && dimension_matches(&claims.agent, &target.agent)
        && dimension_matches(&claims.user, &target.user)
}

fn dimension_matches(claim_dim: &Option<String>, target_dim: &Option<String>) -> bool {
    match (claim_dim, target_dim) {
        (Some(claim), Some(target)) => claim == target,
        (Some(_), None) => true,
        (None, _) => true,
    }
}

/// Which quota in `RateLimitsConfig` an operation draws against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitedOp {
    Forget,
    Modify,
    BatchForget,
    ForceDelete,
    Admin,
}

/// Bundles the mode the daemon was started in with one rate limiter per
/// mutating operation kind, so callers only need one field on the `Daemon`
/// aggregate. Each operation gets its own key space (a caller exhausting
/// their `forget` quota can still `modify`).
pub struct AuthPolicy {
    pub mode: AuthMode,
    forget: AuthRateLimiter,
    modify: AuthRateLimiter,
    batch_forget: AuthRateLimiter,
    force_delete: AuthRateLimiter,
    admin: AuthRateLimiter,
}

impl AuthPolicy {
    pub fn new(mode: AuthMode, rate_limits: &RateLimitsConfig) -> Self {
        Self {
            mode,
            forget: AuthRateLimiter::new(rate_limits.forget.window, rate_limits.forget.max),
            modify: AuthRateLimiter::new(rate_limits.modify.window, rate_limits.modify.max),
            batch_forget: AuthRateLimiter::new(rate_limits.batch_forget.window, rate_limits.batch_forget.max),
            force_delete: AuthRateLimiter::new(rate_limits.force_delete.window, rate_limits.force_delete.max),
            admin: AuthRateLimiter::new(rate_limits.admin.window, rate_limits.admin.max),
        }
    }

    pub fn check_permission(&self, claims: Option<&Claims>, perm: Permission) -> bool {
        check_permission(claims, perm, self.mode)
    }

    pub fn check_scope(&self, claims: Option<&Claims>, target: &ScopeTarget) -> bool {
        check_scope(claims, target, self.mode)
    }

    fn limiter_for(&self, op: RateLimitedOp) -> &AuthRateLimiter {
        match op {
            RateLimitedOp::Forget => &self.forget,
            RateLimitedOp::Modify => &self.modify,
            RateLimitedOp::BatchForget => &self.batch_forget,
            RateLimitedOp::ForceDelete => &self.force_delete,
            RateLimitedOp::Admin => &self.admin,
        }
    }

    pub fn check_rate_limit(&self, op: RateLimitedOp, key: &str) -> RateLimitStatus {
        self.limiter_for(op).check(key)
    }

    pub fn record_rate_limit(&self, op: RateLimitedOp, key: &str) {
        self.limiter_for(op).record(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_mode_allows_without_claims() {
        assert!(check_permission(None, Permission::Admin, AuthMode::Local));
        assert!(check_scope(None, &ScopeTarget::default(), AuthMode::Local));
    }

    #[test]
    fn hybrid_mode_denies_without_claims() {
        assert!(!check_permission(None, Permission::Recall, AuthMode::Hybrid));
    }

    #[test]
    fn readonly_role_only_has_recall() {
        let claims = Claims { role: Some(Role::Readonly), ..Default::default() };
        assert!(check_permission(Some(&claims), Permission::Recall, AuthMode::Team));
        assert!(!check_permission(Some(&claims), Permission::Remember, AuthMode::Team));
    }

    #[test]
    fn operator_has_all_but_admin() {
        let claims = Claims { role: Some(Role::Operator), ..Default::default() };
        assert!(check_permission(Some(&claims), Permission::Diagnostics, AuthMode::Team));
        assert!(!check_permission(Some(&claims), Permission::Admin, AuthMode::Team));
    }

    #[test]
    fn scope_with_project_claim_rejects_mismatched_target() {
        let claims = Claims { role: Some(Role::Agent), project: Some("repo-a".into()), ..Default::default() };
        let matching = ScopeTarget { project: Some("repo-a".into()), ..Default::default() };
        let mismatched = ScopeTarget { project: Some("repo-b".into()), ..Default::default() };
        assert!(check_scope(Some(&claims), &matching, AuthMode::Team));
        assert!(!check_scope(Some(&claims), &mismatched, AuthMode::Team));
    }

    #[test]
    fn admin_bypasses_scope_check() {
        let claims = Claims { role: Some(Role::Admin), project: Some("repo-a".into()), ..Default::default() };
        let target = ScopeTarget { project: Some("repo-b".into()), ..Default::default() };
        assert!(check_scope(Some(&claims), &target, AuthMode::Team));
    }

    #[test]
    fn empty_claim_scope_grants_full_access() {
        let claims = Claims { role: Some(Role::Agent), ..Default::default() };
        let target = ScopeTarget { project: Some("anything".into()), ..Default::default() };
        assert!(check_scope(Some(&claims), &target, AuthMode::Team));
    }

    #[test]
    fn policy_rate_limits_are_independent_per_operation() {
        let mut rate_limits = RateLimitsConfig::default();
        rate_limits.forget.max = 1;
        let policy = AuthPolicy::new(AuthMode::Local, &rate_limits);
        policy.record_rate_limit(RateLimitedOp::Forget, "agent-1");
        assert!(!policy.check_rate_limit(RateLimitedOp::Forget, "agent-1").allowed);
        assert!(policy.check_rate_limit(RateLimitedOp::Modify, "agent-1").allowed);
    }
}
