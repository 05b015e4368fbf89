use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::cache::{DecisionCache, NoCache};
use crate::error::{Error, Result};
use crate::loader::{LoadContext, SnapshotLoader};
use crate::path::HierarchyPath;
use crate::resolver::{EntityAction, Resolver, Target};
use crate::snapshot::{ActorSnapshot, Entity, SnapshotPayload};
use crate::types::{OrganizationId, TeamId};

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No credential, or the last authentication attempt failed.
    Unauthenticated,
    /// A snapshot load is in flight.
    Loading,
    /// A snapshot is installed and checks are live.
    Ready,
}

/// Handle for one in-flight load.
///
/// Tickets are ordered; only the latest issued ticket can install its
/// result, so a slow stale load can never overwrite a newer snapshot.
#[derive(Debug)]
pub struct LoadTicket {
    seq: u64,
    context: LoadContext,
}

/// Everything derived from one installed snapshot. Replaced wholesale on
/// every context change, dropped in one move on logout.
#[derive(Debug)]
struct ActiveContext {
    snapshot: Arc<ActorSnapshot>,
    context: LoadContext,
}

/// Session/context holder: loads the actor snapshot, exposes the resolver's
/// decision functions over it, and manages invalidation on context switches.
#[derive(Debug)]
pub struct Session<L, C = NoCache> {
    loader: L,
    resolver: Resolver<C>,
    state: SessionState,
    active: Option<ActiveContext>,
    epoch: u64,
    latest_seq: u64,
}

impl<L> Session<L, NoCache> {
    /// Creates an unauthenticated session without verdict memoization.
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            resolver: Resolver::new(),
            state: SessionState::Unauthenticated,
            active: None,
            epoch: 0,
            latest_seq: 0,
        }
    }
}

impl<L, C> Session<L, C>
where
    L: SnapshotLoader,
    C: DecisionCache,
{
    /// Creates an unauthenticated session backed by a verdict cache.
    pub fn with_cache(loader: L, cache: C) -> Self {
        Self {
            loader,
            resolver: Resolver::with_cache(cache),
            state: SessionState::Unauthenticated,
            active: None,
            epoch: 0,
            latest_seq: 0,
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the installed snapshot, if any.
    pub fn snapshot(&self) -> Option<&Arc<ActorSnapshot>> {
        self.active.as_ref().map(|active| &active.snapshot)
    }

    /// Returns the organization the session is pointed at.
    pub fn current_organization(&self) -> Option<&OrganizationId> {
        self.active
            .as_ref()
            .and_then(|active| active.context.organization.as_ref())
    }

    /// Returns the team the session is pointed at.
    pub fn current_team(&self) -> Option<&TeamId> {
        self.active
            .as_ref()
            .and_then(|active| active.context.team.as_ref())
    }

    /// Issues a ticket for a new load and moves to `Loading`.
    ///
    /// Part of the two-phase load surface; the async conveniences
    /// ([`Session::authenticate`], [`Session::reload`], the switches) wrap
    /// it. Exposed so an embedding event loop can drive overlapping loads
    /// directly.
    pub fn begin_load(&mut self, context: LoadContext) -> LoadTicket {
        self.latest_seq += 1;
        self.state = SessionState::Loading;
        LoadTicket {
            seq: self.latest_seq,
            context,
        }
    }

    /// Installs a loaded payload if the ticket is still the latest.
    ///
    /// Returns whether the payload was applied. A superseded ticket is
    /// discarded with a warning and the session state is left to the load
    /// that superseded it.
    pub fn install(&mut self, ticket: LoadTicket, payload: SnapshotPayload) -> bool {
        if ticket.seq != self.latest_seq {
            warn!(
                seq = ticket.seq,
                latest = self.latest_seq,
                "discarding superseded snapshot load"
            );
            return false;
        }
        self.epoch += 1;
        let snapshot = ActorSnapshot::from_payload(payload, self.epoch, Utc::now());
        self.active = Some(ActiveContext {
            snapshot: Arc::new(snapshot),
            context: ticket.context,
        });
        self.state = SessionState::Ready;
        true
    }

    /// Records a failed load, restoring the pre-load state.
    ///
    /// The previous snapshot, if any, stays installed untouched.
    pub fn fail_load(&mut self, ticket: LoadTicket) {
        if ticket.seq != self.latest_seq {
            return;
        }
        self.state = if self.active.is_some() {
            SessionState::Ready
        } else {
            SessionState::Unauthenticated
        };
    }

    /// Performs the initial snapshot load.
    ///
    /// On failure the session stays `Unauthenticated` with no partial state.
    pub async fn authenticate(&mut self) -> Result<()> {
        self.load(LoadContext::initial()).await
    }

    /// Refetches the snapshot in the current context.
    ///
    /// On failure the session returns to its previous `Ready` state with the
    /// last-known-good snapshot.
    pub async fn reload(&mut self) -> Result<()> {
        let context = self.active_context()?.clone();
        self.load(context).await
    }

    /// Points the session at another organization and rebuilds the snapshot.
    ///
    /// The destination must be an organization the actor holds an assignment
    /// for, with a node path inside the actor's subtree; otherwise the switch
    /// is a no-op returning `Ok(false)`, with a warning logged.
    pub async fn switch_organization(&mut self, organization: &OrganizationId) -> Result<bool> {
        let snapshot = self.active_snapshot()?;
        let Some(assignment) = snapshot.organization_assignment(organization) else {
            warn!(%organization, "rejecting switch to unassigned organization");
            return Ok(false);
        };
        if !assignment
            .hierarchy_path
            .is_in_subtree(&snapshot.hierarchy_path)
        {
            warn!(
                %organization,
                path = %assignment.hierarchy_path,
                "rejecting organization switch outside the actor's subtree"
            );
            return Ok(false);
        }
        let context = self
            .active_context()?
            .clone()
            .with_organization(organization.clone());
        self.load(context).await?;
        Ok(true)
    }

    /// Points the session at another team and rebuilds the snapshot.
    ///
    /// The destination must be a team the actor is assigned to, with a team
    /// path inside the actor's subtree; otherwise the switch is a no-op
    /// returning `Ok(false)`, with a warning logged.
    pub async fn switch_team(&mut self, team: &TeamId) -> Result<bool> {
        let snapshot = self.active_snapshot()?;
        let Some(assignment) = snapshot.team_assignment(team) else {
            warn!(%team, "rejecting switch to unassigned team");
            return Ok(false);
        };
        if !assignment
            .hierarchy_path
            .is_in_subtree(&snapshot.hierarchy_path)
        {
            warn!(
                %team,
                path = %assignment.hierarchy_path,
                "rejecting team switch outside the actor's subtree"
            );
            return Ok(false);
        }
        let context = self.active_context()?.clone().with_team(team.clone());
        self.load(context).await?;
        Ok(true)
    }

    /// Drops the whole session context and returns to `Unauthenticated`.
    ///
    /// The active context is replaced in a single move, so no reader can
    /// observe a permissions-cleared-but-user-stale half state. In-flight
    /// loads are invalidated and the verdict cache is emptied.
    pub fn logout(&mut self) {
        self.active = None;
        self.state = SessionState::Unauthenticated;
        self.latest_seq += 1;
        self.resolver.cache().clear();
    }

    /// Entry point for a cross-tab/cross-window logout broadcast.
    ///
    /// The embedder wires its storage/broadcast listener to this; the effect
    /// is identical to a local [`Session::logout`].
    pub fn handle_logout_signal(&mut self) {
        self.logout();
    }

    /// String-level grant check; see [`Resolver::has_permission`].
    ///
    /// False whenever the session is not `Ready`.
    pub fn has_permission(&self, raw: &str) -> bool {
        self.ready_snapshot()
            .is_some_and(|snapshot| self.resolver.has_permission(snapshot, raw))
    }

    /// Returns whether the actor may view an entity.
    pub fn can_view_entity(&self, entity: &Entity, entity_kind: &str) -> bool {
        self.can(EntityAction::View, entity, entity_kind)
    }

    /// Returns whether the actor may edit an entity.
    pub fn can_edit_entity(&self, entity: &Entity, entity_kind: &str) -> bool {
        self.can(EntityAction::Edit, entity, entity_kind)
    }

    /// Returns whether the actor may delete an entity.
    pub fn can_delete_entity(&self, entity: &Entity, entity_kind: &str) -> bool {
        self.can(EntityAction::Delete, entity, entity_kind)
    }

    /// Returns whether the actor may manage an entity.
    pub fn can_manage_entity(&self, entity: &Entity, entity_kind: &str) -> bool {
        self.can(EntityAction::Manage, entity, entity_kind)
    }

    /// Returns whether the actor may create an entity of a kind under a
    /// destination parent path.
    pub fn can_create_entity(&self, entity_kind: &str, parent: Option<&HierarchyPath>) -> bool {
        self.ready_snapshot().is_some_and(|snapshot| {
            self.resolver
                .can_create(snapshot, entity_kind, parent)
                .is_allowed()
        })
    }

    /// Enumerates the canonical actions the actor may perform on an entity.
    ///
    /// Empty whenever the session is not `Ready`.
    pub fn allowed_actions(&self, entity: &Entity, entity_kind: &str) -> Vec<EntityAction> {
        self.ready_snapshot()
            .map(|snapshot| self.resolver.allowed_actions(snapshot, entity, entity_kind))
            .unwrap_or_default()
    }

    fn can(&self, action: EntityAction, entity: &Entity, entity_kind: &str) -> bool {
        self.ready_snapshot().is_some_and(|snapshot| {
            self.resolver
                .can_perform(snapshot, entity_kind, action, Target::Entity(entity))
                .is_allowed()
        })
    }

    fn ready_snapshot(&self) -> Option<&ActorSnapshot> {
        if self.state != SessionState::Ready {
            return None;
        }
        self.active.as_ref().map(|active| active.snapshot.as_ref())
    }

    fn active_snapshot(&self) -> Result<&ActorSnapshot> {
        self.active
            .as_ref()
            .map(|active| active.snapshot.as_ref())
            .ok_or(Error::NotAuthenticated)
    }

    fn active_context(&self) -> Result<&LoadContext> {
        self.active
            .as_ref()
            .map(|active| &active.context)
            .ok_or(Error::NotAuthenticated)
    }

    async fn load(&mut self, context: LoadContext) -> Result<()> {
        let ticket = self.begin_load(context);
        match self.loader.load_snapshot(&ticket.context).await {
            Ok(payload) => {
                self.install(ticket, payload);
                Ok(())
            }
            Err(error) => {
                self.fail_load(ticket);
                Err(Error::Load(error))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_loader::MemoryLoader;
    use futures::executor::block_on;

    fn payload(json: serde_json::Value) -> SnapshotPayload {
        serde_json::from_value(json).expect("payload")
    }

    fn director_payload() -> SnapshotPayload {
        payload(serde_json::json!({
            "user": {
                "id": "user_1",
                "hierarchyLevel": 1,
                "hierarchyPath": "union1/conf1",
                "managedLevels": [1, 2],
                "organizations": [
                    {"organization": "conf1", "role": "director", "hierarchyPath": "union1/conf1"},
                    {"organization": "union2", "role": "guest", "hierarchyPath": "union2"}
                ],
                "teamAssignments": [
                    {"team": "team_1", "role": "leader", "hierarchyPath": "union1/conf1/team_1"}
                ]
            },
            "permissions": ["churches.update:subordinate"]
        }))
    }

    fn ready_session() -> Session<MemoryLoader> {
        let loader = MemoryLoader::new();
        loader.set_payload(LoadContext::initial(), director_payload());
        let mut session = Session::new(loader);
        block_on(session.authenticate()).expect("authenticate");
        session
    }

    #[test]
    fn authenticate_moves_to_ready() {
        let session = ready_session();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.snapshot().unwrap().id.as_str(), "user_1");
    }

    #[test]
    fn failed_initial_load_stays_unauthenticated() {
        let loader = MemoryLoader::new();
        loader.set_failing(true);
        let mut session = Session::new(loader);

        let result = block_on(session.authenticate());

        assert!(matches!(result, Err(Error::Load(_))));
        assert_eq!(session.state(), SessionState::Unauthenticated);
        assert!(session.snapshot().is_none());
    }

    #[test]
    fn failed_reload_keeps_last_known_good_snapshot() {
        let loader = MemoryLoader::new();
        loader.set_payload(LoadContext::initial(), director_payload());
        let mut session = Session::new(loader.clone());
        block_on(session.authenticate()).unwrap();

        loader.set_failing(true);
        let result = block_on(session.reload());

        assert!(matches!(result, Err(Error::Load(_))));
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.snapshot().unwrap().id.as_str(), "user_1");
    }

    #[test]
    fn superseded_load_cannot_overwrite_newer_snapshot() {
        let mut session = ready_session();

        let stale = session.begin_load(LoadContext::initial());
        assert_eq!(session.state(), SessionState::Loading);
        let fresh = session.begin_load(LoadContext::initial());

        assert!(session.install(
            fresh,
            payload(serde_json::json!({
                "user": {"id": "user_new", "hierarchyLevel": 1, "hierarchyPath": "union1/conf1"},
                "permissions": []
            }))
        ));
        assert!(!session.install(
            stale,
            payload(serde_json::json!({
                "user": {"id": "user_old", "hierarchyLevel": 1, "hierarchyPath": "union1/conf1"},
                "permissions": []
            }))
        ));

        assert_eq!(session.snapshot().unwrap().id.as_str(), "user_new");
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn each_install_advances_the_epoch() {
        let mut session = ready_session();
        let first_epoch = session.snapshot().unwrap().epoch;

        block_on(session.reload()).unwrap();

        assert!(session.snapshot().unwrap().epoch > first_epoch);
    }

    #[test]
    fn switch_to_out_of_subtree_organization_is_a_no_op() {
        let mut session = ready_session();

        // union2 is assigned but outside the actor's union1/conf1 subtree.
        let committed =
            block_on(session.switch_organization(&"union2".try_into().unwrap())).unwrap();

        assert!(!committed);
        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.current_organization().is_none());
    }

    #[test]
    fn switch_to_unassigned_organization_is_a_no_op() {
        let mut session = ready_session();

        let committed =
            block_on(session.switch_organization(&"conf9".try_into().unwrap())).unwrap();

        assert!(!committed);
        assert!(session.current_organization().is_none());
    }

    #[test]
    fn switch_organization_commits_inside_the_subtree() {
        let loader = MemoryLoader::new();
        loader.set_payload(LoadContext::initial(), director_payload());
        let conf1: OrganizationId = "conf1".try_into().unwrap();
        loader.set_payload(
            LoadContext::initial().with_organization(conf1.clone()),
            director_payload(),
        );
        let mut session = Session::new(loader);
        block_on(session.authenticate()).unwrap();

        let committed = block_on(session.switch_organization(&conf1)).unwrap();

        assert!(committed);
        assert_eq!(session.current_organization(), Some(&conf1));
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn switch_team_validates_against_team_path() {
        let loader = MemoryLoader::new();
        loader.set_payload(LoadContext::initial(), director_payload());
        let team: TeamId = "team_1".try_into().unwrap();
        loader.set_payload(
            LoadContext::initial().with_team(team.clone()),
            director_payload(),
        );
        let mut session = Session::new(loader);
        block_on(session.authenticate()).unwrap();

        let committed = block_on(session.switch_team(&team)).unwrap();

        assert!(committed);
        assert_eq!(session.current_team(), Some(&team));
    }

    #[test]
    fn logout_clears_everything_atomically() {
        let mut session = ready_session();
        assert!(session.has_permission("churches.update"));

        session.logout();

        assert_eq!(session.state(), SessionState::Unauthenticated);
        assert!(session.snapshot().is_none());
        assert!(session.current_organization().is_none());
        assert!(!session.has_permission("churches.update"));
    }

    #[test]
    fn logout_signal_invalidates_in_flight_loads() {
        let mut session = ready_session();

        let ticket = session.begin_load(LoadContext::initial());
        session.handle_logout_signal();

        assert!(!session.install(ticket, director_payload()));
        assert_eq!(session.state(), SessionState::Unauthenticated);
    }

    #[test]
    fn queries_deny_while_not_ready() {
        let loader = MemoryLoader::new();
        let session = Session::new(loader);

        let entity: Entity = serde_json::from_value(serde_json::json!({
            "_id": "church_a", "hierarchyPath": "union1/conf1/church_a", "hierarchyLevel": 2
        }))
        .unwrap();

        assert!(!session.has_permission("churches.update"));
        assert!(!session.can_edit_entity(&entity, "church"));
        assert!(session.allowed_actions(&entity, "church").is_empty());
        assert!(!session.can_create_entity("church", None));
    }

    #[test]
    fn gating_surface_delegates_to_the_resolver() {
        let session = ready_session();
        let inside: Entity = serde_json::from_value(serde_json::json!({
            "_id": "church_a", "hierarchyPath": "union1/conf1/church_a", "hierarchyLevel": 2
        }))
        .unwrap();
        let outside: Entity = serde_json::from_value(serde_json::json!({
            "_id": "church_b", "hierarchyPath": "union1/conf2/church_b", "hierarchyLevel": 2
        }))
        .unwrap();

        assert!(session.can_edit_entity(&inside, "church"));
        assert!(!session.can_edit_entity(&outside, "church"));
        assert!(!session.can_delete_entity(&inside, "church"));
        assert!(session.has_permission("churches.update"));
        assert!(!session.has_permission("churches.delete"));
        assert_eq!(
            session.allowed_actions(&inside, "church"),
            vec![EntityAction::Edit]
        );
    }
}
