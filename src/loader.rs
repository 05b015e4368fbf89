use crate::error::LoadError;
use crate::snapshot::SnapshotPayload;
use crate::types::{OrganizationId, TeamId};
use async_trait::async_trait;

/// Context for one snapshot fetch: which organization/team the session is
/// pointed at. The initial load carries neither.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct LoadContext {
    pub organization: Option<OrganizationId>,
    pub team: Option<TeamId>,
}

impl LoadContext {
    /// Context of the initial load after authentication.
    pub fn initial() -> Self {
        Self::default()
    }

    /// Returns this context pointed at an organization.
    pub fn with_organization(mut self, organization: OrganizationId) -> Self {
        self.organization = Some(organization);
        self
    }

    /// Returns this context pointed at a team.
    pub fn with_team(mut self, team: TeamId) -> Self {
        self.team = Some(team);
        self
    }
}

/// Interface to the authentication collaborator that produces the
/// `{ user, permissions }` payload.
///
/// Implementations perform the actual fetch; the session never does I/O
/// itself and never partially applies a failed load.
#[async_trait]
pub trait SnapshotLoader: Send + Sync {
    /// Fetches the snapshot payload for a context.
    async fn load_snapshot(
        &self,
        context: &LoadContext,
    ) -> std::result::Result<SnapshotPayload, LoadError>;
}
