use crate::cache::{CacheKey, DecisionCache, NoCache};
use crate::path::HierarchyPath;
use crate::permission::{Permission, Scope, grant_authorizes, grant_matches_query, resource_for};
use crate::snapshot::{ActorSnapshot, Entity};
use tracing::trace;

/// Authorization decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Permission is granted.
    Allow,
    /// Permission is denied.
    Deny,
}

/// Outcome of one permission check.
///
/// The matched permission and scope are recorded for audit and debugging in
/// the consuming UI; they carry no further authorization meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub decision: Decision,
    pub matched_permission: Option<Permission>,
    pub matched_scope: Option<Scope>,
}

impl Verdict {
    pub(crate) fn allow(permission: Permission, scope: Option<Scope>) -> Self {
        Self {
            decision: Decision::Allow,
            matched_permission: Some(permission),
            matched_scope: scope,
        }
    }

    pub(crate) fn allow_bypass(permission: Option<Permission>) -> Self {
        Self {
            decision: Decision::Allow,
            matched_permission: permission,
            matched_scope: None,
        }
    }

    /// A denial with nothing matched.
    pub fn deny() -> Self {
        Self {
            decision: Decision::Deny,
            matched_permission: None,
            matched_scope: None,
        }
    }

    /// Returns whether the check resolved to allow.
    pub fn is_allowed(&self) -> bool {
        self.decision == Decision::Allow
    }
}

/// Canonical action set the UI gates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityAction {
    View,
    Edit,
    Delete,
    Manage,
    Create,
}

impl EntityAction {
    /// Actions evaluated against an existing entity; `Create` is evaluated
    /// against the entity's parent path instead.
    pub const ON_ENTITY: [EntityAction; 4] = [
        EntityAction::View,
        EntityAction::Edit,
        EntityAction::Delete,
        EntityAction::Manage,
    ];

    /// Permission action name this UI action maps to.
    pub fn permission_action(&self) -> &'static str {
        match self {
            EntityAction::View => "view",
            EntityAction::Edit => "update",
            EntityAction::Delete => "delete",
            EntityAction::Manage => "manage",
            EntityAction::Create => "create",
        }
    }
}

/// Target of a permission check.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// An existing entity.
    Entity(&'a Entity),
    /// Creation checks anchor on the destination parent path.
    Path(&'a HierarchyPath),
    /// No anchor; only location-independent scopes can grant.
    Unanchored,
}

impl Target<'_> {
    fn entity(&self) -> Option<&Entity> {
        match self {
            Target::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    fn path(&self) -> Option<&HierarchyPath> {
        match self {
            Target::Entity(entity) => Some(&entity.hierarchy_path),
            Target::Path(path) => Some(path),
            Target::Unanchored => None,
        }
    }

    fn level(&self) -> Option<u32> {
        self.entity().and_then(|entity| entity.hierarchy_level)
    }
}

/// The decision engine.
///
/// Stateless apart from the verdict cache; every query takes the actor
/// snapshot explicitly, so decisions can never read ambient state.
#[derive(Debug)]
pub struct Resolver<C = NoCache> {
    cache: C,
}

impl Resolver<NoCache> {
    /// Creates a resolver without memoization.
    pub fn new() -> Self {
        Self { cache: NoCache }
    }
}

impl Default for Resolver<NoCache> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Resolver<C>
where
    C: DecisionCache,
{
    /// Creates a resolver backed by the given verdict cache.
    pub fn with_cache(cache: C) -> Self {
        Self { cache }
    }

    /// Returns the verdict cache.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Decides whether `actor` may perform `action` (a raw permission action
    /// name such as `update`) on a target of the given entity kind.
    ///
    /// Algorithm, short-circuiting on first resolution:
    /// 1. superuser bypass (no scope evaluation, no level gate);
    /// 2. any matching unscoped grant allows, regardless of target location;
    /// 3. the first matching scoped grant whose scope resolves true wins,
    ///    then must pass the managed-levels gate; gate failure denies;
    /// 4. otherwise deny.
    pub fn check(
        &self,
        actor: &ActorSnapshot,
        entity_kind: &str,
        action: &str,
        target: Target<'_>,
    ) -> Verdict {
        let key = target.entity().map(|entity| CacheKey {
            epoch: actor.epoch,
            actor: actor.id.clone(),
            action: action.to_string(),
            entity: entity.id.clone(),
            entity_kind: entity_kind.to_string(),
        });
        if let Some(key) = &key
            && let Some(verdict) = self.cache.get(key)
        {
            return verdict;
        }

        let verdict = resolve(actor, entity_kind, action, target);
        if let Some(key) = key {
            self.cache.insert(key, verdict.clone());
        }
        verdict
    }

    /// Decides a canonical UI action against a target.
    pub fn can_perform(
        &self,
        actor: &ActorSnapshot,
        entity_kind: &str,
        action: EntityAction,
        target: Target<'_>,
    ) -> Verdict {
        self.check(actor, entity_kind, action.permission_action(), target)
    }

    /// Decides a creation check against an optional destination parent path.
    pub fn can_create(
        &self,
        actor: &ActorSnapshot,
        entity_kind: &str,
        parent: Option<&HierarchyPath>,
    ) -> Verdict {
        let target = match parent {
            Some(path) => Target::Path(path),
            None => Target::Unanchored,
        };
        self.check(actor, entity_kind, "create", target)
    }

    /// Enumerates the canonical actions the actor may perform on an entity.
    ///
    /// `View`/`Edit`/`Delete`/`Manage` are evaluated against the entity and
    /// `Create` against its parent path. Pure over its inputs; calling it
    /// twice yields the same set.
    pub fn allowed_actions(
        &self,
        actor: &ActorSnapshot,
        entity: &Entity,
        entity_kind: &str,
    ) -> Vec<EntityAction> {
        let mut actions = Vec::new();
        for action in EntityAction::ON_ENTITY {
            if self
                .can_perform(actor, entity_kind, action, Target::Entity(entity))
                .is_allowed()
            {
                actions.push(action);
            }
        }
        let parent = entity.hierarchy_path.parent();
        if self
            .can_create(actor, entity_kind, parent.as_ref())
            .is_allowed()
        {
            actions.push(EntityAction::Create);
        }
        actions
    }

    /// String-level grant check with no entity or hierarchy reasoning.
    ///
    /// True when the actor holds the exact permission, a resource wildcard
    /// covering it, or any scoped variant of it. Used for coarse gating
    /// where no target exists yet. Malformed queries are false.
    pub fn has_permission(&self, actor: &ActorSnapshot, raw: &str) -> bool {
        if actor.is_superuser() {
            return true;
        }
        let Ok(query) = Permission::new(raw) else {
            return false;
        };
        actor
            .permissions
            .iter()
            .any(|granted| grant_matches_query(granted, &query))
    }
}

fn resolve(actor: &ActorSnapshot, entity_kind: &str, action: &str, target: Target<'_>) -> Verdict {
    if actor.is_superuser() {
        let wildcard = actor
            .permissions
            .iter()
            .find(|permission| permission.is_superuser_wildcard())
            .cloned();
        return Verdict::allow_bypass(wildcard);
    }

    let resource = resource_for(entity_kind);

    for granted in &actor.permissions {
        if !granted.is_scoped() && grant_authorizes(granted, &resource, action) {
            return Verdict::allow(granted.clone(), None);
        }
    }

    for granted in &actor.permissions {
        if !granted.is_scoped() || !grant_authorizes(granted, &resource, action) {
            continue;
        }
        // Unrecognized scope tokens are present but can never resolve.
        let Some(scope) = granted.scope() else {
            continue;
        };
        if !scope_resolves(actor, scope, target) {
            continue;
        }
        if !actor.manages_level(target.level()) {
            trace!(
                actor = %actor.id,
                permission = %granted,
                "scope matched but target level is outside managed levels"
            );
            return Verdict::deny();
        }
        return Verdict::allow(granted.clone(), Some(scope));
    }

    Verdict::deny()
}

fn scope_resolves(actor: &ActorSnapshot, scope: Scope, target: Target<'_>) -> bool {
    match scope {
        Scope::All | Scope::Public => true,
        Scope::SelfOnly => target
            .entity()
            .is_some_and(|entity| entity.id.as_str() == actor.id.as_str()),
        Scope::Own => target
            .path()
            .is_some_and(|path| path == &actor.hierarchy_path),
        Scope::Subordinate => target
            .path()
            .is_some_and(|path| path.is_in_subtree(&actor.hierarchy_path)),
        Scope::AcsTeam => target.path().is_some_and(|path| {
            actor
                .team_assignments
                .iter()
                .any(|assignment| path.is_in_subtree(&assignment.hierarchy_path))
        }),
        Scope::Acs => !actor.team_assignments.is_empty(),
        Scope::Assigned => target.entity().is_some_and(|entity| {
            actor
                .organizations
                .iter()
                .any(|assignment| assignment.organization.as_str() == entity.id.as_str())
        }),
    }
}
