use crate::path::HierarchyPath;
use crate::permission::Permission;
use crate::types::{ActorId, EntityId, OrganizationId, TeamId};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::debug;

/// Role held within a team, the cross-cutting authorization axis.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
    Leader,
    Member,
    Communications,
}

/// Organization-assignment record carried by the actor snapshot.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationAssignment {
    /// The organization node this assignment refers to.
    pub organization: OrganizationId,
    /// Role name granted at that node.
    pub role: String,
    /// Path of the organization node itself.
    pub hierarchy_path: HierarchyPath,
    #[serde(default)]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Team-assignment record carried by the actor snapshot.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamAssignment {
    pub team: TeamId,
    pub role: TeamRole,
    /// Path of the team's own node; drives `acs_team` scope checks.
    pub hierarchy_path: HierarchyPath,
    #[serde(default)]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Target of a permission check.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    #[serde(rename = "_id")]
    pub id: EntityId,
    pub hierarchy_path: HierarchyPath,
    #[serde(default)]
    pub hierarchy_level: Option<u32>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// Wire shape of the authenticated user inside [`SnapshotPayload`].
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    pub id: ActorId,
    pub hierarchy_level: u32,
    pub hierarchy_path: HierarchyPath,
    #[serde(default)]
    pub managed_levels: Vec<u32>,
    #[serde(default)]
    pub organizations: Vec<OrganizationAssignment>,
    #[serde(default)]
    pub team_assignments: Vec<TeamAssignment>,
}

/// Payload fetched from the authentication collaborator.
///
/// `permissions` is the flattened list from all role assignments; it is
/// normalized (malformed strings dropped) when building an
/// [`ActorSnapshot`].
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPayload {
    pub user: UserPayload,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Immutable bundle of identity, hierarchy position, and flattened
/// permissions used for one batch of authorization decisions.
///
/// Snapshots are never mutated in place; every context change installs a
/// fresh snapshot under a new `epoch`, which is what keys the decision cache.
#[derive(Clone, Debug)]
pub struct ActorSnapshot {
    pub id: ActorId,
    /// Version stamp assigned at install time.
    pub epoch: u64,
    /// 0 = system-wide root; increasing = deeper in the tree.
    pub hierarchy_level: u32,
    pub hierarchy_path: HierarchyPath,
    /// Hierarchy levels the actor is authority-eligible to act on.
    pub managed_levels: BTreeSet<u32>,
    /// Validated grants; malformed wire strings never make it here.
    pub permissions: Vec<Permission>,
    pub organizations: Vec<OrganizationAssignment>,
    pub team_assignments: Vec<TeamAssignment>,
    superuser: bool,
}

impl ActorSnapshot {
    /// Normalizes a wire payload into a snapshot.
    ///
    /// Malformed permission strings are dropped (they can never match, same
    /// as not existing). Assignments already expired at `now` are filtered
    /// out. The superuser flag is derived from `hierarchyLevel == 0` or a
    /// raw `*` / legacy `all` marker in the permission list.
    pub fn from_payload(payload: SnapshotPayload, epoch: u64, now: DateTime<Utc>) -> Self {
        let user = payload.user;
        let mut superuser = user.hierarchy_level == 0;

        let mut permissions = Vec::with_capacity(payload.permissions.len());
        for raw in payload.permissions {
            if raw.trim() == "all" {
                superuser = true;
                continue;
            }
            match Permission::new(&raw) {
                Ok(permission) => {
                    if permission.is_superuser_wildcard() {
                        superuser = true;
                    }
                    permissions.push(permission);
                }
                Err(err) => {
                    debug!(permission = %raw, %err, "dropping malformed permission string");
                }
            }
        }

        let organizations = user
            .organizations
            .into_iter()
            .filter(|assignment| {
                let live = assignment.expires_at.is_none_or(|at| at > now);
                if !live {
                    debug!(organization = %assignment.organization, "dropping expired organization assignment");
                }
                live
            })
            .collect();
        let team_assignments = user
            .team_assignments
            .into_iter()
            .filter(|assignment| {
                let live = assignment.expires_at.is_none_or(|at| at > now);
                if !live {
                    debug!(team = %assignment.team, "dropping expired team assignment");
                }
                live
            })
            .collect();

        Self {
            id: user.id,
            epoch,
            hierarchy_level: user.hierarchy_level,
            hierarchy_path: user.hierarchy_path,
            managed_levels: user.managed_levels.into_iter().collect(),
            permissions,
            organizations,
            team_assignments,
            superuser,
        }
    }

    /// Returns a copy of this snapshot carrying a different grant list.
    ///
    /// Snapshots are immutable values; this derives a fresh one rather than
    /// mutating in place. The superuser flag is recomputed from the new
    /// grants and the hierarchy level.
    pub fn with_permissions(mut self, permissions: Vec<Permission>) -> Self {
        self.superuser = self.hierarchy_level == 0
            || permissions
                .iter()
                .any(|permission| permission.is_superuser_wildcard());
        self.permissions = permissions;
        self
    }

    /// Returns whether every check short-circuits to allow for this actor.
    pub fn is_superuser(&self) -> bool {
        self.superuser
    }

    /// Returns whether the actor may act on a target at `level`.
    ///
    /// Targets with no level pass; the gate only restricts known levels.
    pub fn manages_level(&self, level: Option<u32>) -> bool {
        level.is_none_or(|level| self.managed_levels.contains(&level))
    }

    /// Finds the organization assignment for a node, if any.
    pub fn organization_assignment(
        &self,
        organization: &OrganizationId,
    ) -> Option<&OrganizationAssignment> {
        self.organizations
            .iter()
            .find(|assignment| &assignment.organization == organization)
    }

    /// Finds the team assignment for a team, if any.
    pub fn team_assignment(&self, team: &TeamId) -> Option<&TeamAssignment> {
        self.team_assignments
            .iter()
            .find(|assignment| &assignment.team == team)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn payload(json: serde_json::Value) -> SnapshotPayload {
        serde_json::from_value(json).expect("payload")
    }

    #[test]
    fn payload_deserializes_wire_shape() {
        let payload = payload(serde_json::json!({
            "user": {
                "id": "user_1",
                "hierarchyLevel": 1,
                "hierarchyPath": "union1/conf1",
                "managedLevels": [1, 2],
                "teamAssignments": [
                    {"team": "team_1", "role": "leader", "hierarchyPath": "union1/conf1/church1/team_1"}
                ]
            },
            "permissions": ["churches.update:subordinate"]
        }));

        let snapshot = ActorSnapshot::from_payload(payload, 1, now());
        assert_eq!(snapshot.id.as_str(), "user_1");
        assert_eq!(snapshot.hierarchy_level, 1);
        assert_eq!(snapshot.permissions.len(), 1);
        assert_eq!(snapshot.team_assignments[0].role, TeamRole::Leader);
    }

    #[test]
    fn malformed_permissions_are_dropped_not_fatal() {
        let payload = payload(serde_json::json!({
            "user": {"id": "user_1", "hierarchyLevel": 2, "hierarchyPath": "union1/conf1/church1"},
            "permissions": ["churches.update", "not a permission", "teams..view", ""]
        }));

        let snapshot = ActorSnapshot::from_payload(payload, 1, now());
        assert_eq!(snapshot.permissions.len(), 1);
        assert_eq!(snapshot.permissions[0].as_str(), "churches.update");
    }

    #[test]
    fn superuser_flag_from_level_wildcard_or_legacy_marker() {
        let by_level = payload(serde_json::json!({
            "user": {"id": "root", "hierarchyLevel": 0, "hierarchyPath": ""},
            "permissions": []
        }));
        assert!(ActorSnapshot::from_payload(by_level, 1, now()).is_superuser());

        let by_wildcard = payload(serde_json::json!({
            "user": {"id": "user_1", "hierarchyLevel": 2, "hierarchyPath": "union1/conf1/church1"},
            "permissions": ["*"]
        }));
        assert!(ActorSnapshot::from_payload(by_wildcard, 1, now()).is_superuser());

        let by_marker = payload(serde_json::json!({
            "user": {"id": "user_1", "hierarchyLevel": 2, "hierarchyPath": "union1/conf1/church1"},
            "permissions": ["all"]
        }));
        let snapshot = ActorSnapshot::from_payload(by_marker, 1, now());
        assert!(snapshot.is_superuser());
        assert!(snapshot.permissions.is_empty());
    }

    #[test]
    fn expired_assignments_are_filtered() {
        let payload = payload(serde_json::json!({
            "user": {
                "id": "user_1",
                "hierarchyLevel": 1,
                "hierarchyPath": "union1/conf1",
                "organizations": [
                    {"organization": "conf1", "role": "director", "hierarchyPath": "union1/conf1",
                     "expiresAt": "2023-01-01T00:00:00Z"},
                    {"organization": "conf2", "role": "director", "hierarchyPath": "union1/conf2"}
                ],
                "teamAssignments": [
                    {"team": "team_1", "role": "member", "hierarchyPath": "union1/conf1/team_1",
                     "expiresAt": "2023-01-01T00:00:00Z"}
                ]
            },
            "permissions": []
        }));

        let snapshot = ActorSnapshot::from_payload(payload, 1, now());
        assert_eq!(snapshot.organizations.len(), 1);
        assert_eq!(snapshot.organizations[0].organization.as_str(), "conf2");
        assert!(snapshot.team_assignments.is_empty());
    }

    #[test]
    fn entity_deserializes_underscore_id_and_type() {
        let entity: Entity = serde_json::from_value(serde_json::json!({
            "_id": "church_a",
            "hierarchyPath": "union1/conf1/church_a",
            "hierarchyLevel": 2,
            "type": "church"
        }))
        .unwrap();

        assert_eq!(entity.id.as_str(), "church_a");
        assert_eq!(entity.hierarchy_level, Some(2));
        assert_eq!(entity.kind.as_deref(), Some("church"));
    }
}
