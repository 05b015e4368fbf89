use crate::error::{Error, Result};
use std::borrow::Borrow;
use std::fmt;

/// Scope modifier narrowing where an action grant applies.
///
/// The token set is closed. Tokens outside it parse to no scope at all and
/// can never resolve against an entity, which keeps data-format drift from
/// silently widening a grant.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Target entity is the actor itself.
    #[serde(rename = "self")]
    SelfOnly,
    /// Target node is the actor's home node.
    Own,
    /// Target lies in the actor's organizational subtree.
    Subordinate,
    /// Grants regardless of hierarchy containment.
    All,
    /// Target is an organization the actor holds an assignment for.
    Assigned,
    /// Target lies in the subtree of one of the actor's teams.
    AcsTeam,
    /// Actor holds at least one team assignment.
    Acs,
    /// Published content; grants for any target.
    Public,
}

impl Scope {
    /// Parses a scope token, returning `None` for unrecognized tokens.
    pub fn parse(token: &str) -> Option<Scope> {
        match token {
            "self" => Some(Scope::SelfOnly),
            "own" => Some(Scope::Own),
            "subordinate" => Some(Scope::Subordinate),
            "all" => Some(Scope::All),
            "assigned" => Some(Scope::Assigned),
            "acs_team" => Some(Scope::AcsTeam),
            "acs" => Some(Scope::Acs),
            "public" => Some(Scope::Public),
            _ => None,
        }
    }

    /// Returns the wire token for this scope.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::SelfOnly => "self",
            Scope::Own => "own",
            Scope::Subordinate => "subordinate",
            Scope::All => "all",
            Scope::Assigned => "assigned",
            Scope::AcsTeam => "acs_team",
            Scope::Acs => "acs",
            Scope::Public => "public",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permission string wrapper (`resource.action`, `resource.action:scope`,
/// `resource.*`, or the superuser `*`).
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Permission(String);

impl Permission {
    /// Parses and validates a permission string.
    ///
    /// This trims whitespace and normalizes to lowercase before validating
    /// against the canonical grammar
    /// `^(\*|[a-z_]+\.(\*|[a-z_]+)(:[a-z_]+)?)$`.
    pub fn new(value: impl AsRef<str>) -> Result<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidPermission(
                "permission must not be empty".to_string(),
            ));
        }
        let normalized = trimmed.to_ascii_lowercase();
        validate_grammar(&normalized)?;
        Ok(Self(normalized))
    }

    /// Creates a permission from a trusted string without validation.
    pub fn from_string(value: String) -> Self {
        Self(value)
    }

    /// Returns the underlying string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns whether this is the bare superuser wildcard `*`.
    pub fn is_superuser_wildcard(&self) -> bool {
        self.0 == "*"
    }

    /// Returns the resource segment (`*` for the superuser wildcard).
    pub fn resource(&self) -> &str {
        let (base, _) = split_scope(&self.0);
        base.split_once('.').map_or(base, |(resource, _)| resource)
    }

    /// Returns the action segment (`*` for the superuser wildcard or a
    /// resource wildcard grant).
    pub fn action(&self) -> &str {
        let (base, _) = split_scope(&self.0);
        base.split_once('.').map_or(base, |(_, action)| action)
    }

    /// Returns the raw scope token, if present.
    pub fn scope_token(&self) -> Option<&str> {
        split_scope(&self.0).1
    }

    /// Returns the parsed scope.
    ///
    /// `None` both for unscoped grants and for unrecognized tokens; use
    /// [`Permission::is_scoped`] to tell them apart.
    pub fn scope(&self) -> Option<Scope> {
        self.scope_token().and_then(Scope::parse)
    }

    /// Returns whether a scope suffix is present, recognized or not.
    pub fn is_scoped(&self) -> bool {
        self.scope_token().is_some()
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Permission {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Permission {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Permission {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

fn split_scope(value: &str) -> (&str, Option<&str>) {
    match value.split_once(':') {
        Some((base, scope)) => (base, Some(scope)),
        None => (value, None),
    }
}

fn is_name_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|ch| matches!(ch, 'a'..='z' | '_'))
}

fn validate_grammar(value: &str) -> Result<()> {
    if value == "*" {
        return Ok(());
    }
    let (base, scope) = split_scope(value);
    if let Some(scope) = scope
        && !is_name_segment(scope)
    {
        return Err(Error::InvalidPermission(
            "scope token contains invalid characters".to_string(),
        ));
    }
    let Some((resource, action)) = base.split_once('.') else {
        return Err(Error::InvalidPermission(
            "permission must be in resource.action format".to_string(),
        ));
    };
    if !is_name_segment(resource) {
        return Err(Error::InvalidPermission(
            "resource segment contains invalid characters".to_string(),
        ));
    }
    if action != "*" && !is_name_segment(action) {
        return Err(Error::InvalidPermission(
            "action segment contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

/// String-level grant test: does `granted` authorize `action` on `resource`,
/// ignoring any scope suffix?
pub(crate) fn grant_authorizes(granted: &Permission, resource: &str, action: &str) -> bool {
    if granted.is_superuser_wildcard() {
        return true;
    }
    granted.resource() == resource && (granted.action() == "*" || granted.action() == action)
}

/// String-level presence test for a query permission: exact match, resource
/// wildcard, or scoped-variant presence all count.
pub(crate) fn grant_matches_query(granted: &Permission, query: &Permission) -> bool {
    if query.is_superuser_wildcard() {
        return granted.is_superuser_wildcard();
    }
    grant_authorizes(granted, query.resource(), query.action())
}

/// Derives the permission resource name from a UI entity kind
/// (`church` → `churches`, `story` → `stories`, `team` → `teams`).
pub fn resource_for(entity_kind: &str) -> String {
    let kind = entity_kind.trim().to_ascii_lowercase();
    if let Some(stem) = kind.strip_suffix('y') {
        return format!("{stem}ies");
    }
    if kind.ends_with('s')
        || kind.ends_with('x')
        || kind.ends_with('z')
        || kind.ends_with("ch")
        || kind.ends_with("sh")
    {
        return format!("{kind}es");
    }
    format!("{kind}s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_from_should_trim_and_lowercase() {
        let permission = Permission::try_from(" Churches.Update:Subordinate ").unwrap();
        assert_eq!(permission.as_str(), "churches.update:subordinate");
        assert_eq!(permission.scope(), Some(Scope::Subordinate));
    }

    #[test]
    fn try_from_should_reject_missing_action() {
        assert!(matches!(
            Permission::try_from("churches"),
            Err(Error::InvalidPermission(_))
        ));
        assert!(matches!(
            Permission::try_from("churches."),
            Err(Error::InvalidPermission(_))
        ));
    }

    #[test]
    fn try_from_should_reject_digits_and_separator_misuse() {
        assert!(Permission::try_from("churches.update2").is_err());
        assert!(Permission::try_from(".update").is_err());
        assert!(Permission::try_from("churches.update:").is_err());
        assert!(Permission::try_from("*.update").is_err());
    }

    #[test]
    fn bare_wildcard_is_valid_and_superuser() {
        let permission = Permission::try_from("*").unwrap();
        assert!(permission.is_superuser_wildcard());
        assert!(!permission.is_scoped());
    }

    #[test]
    fn unknown_scope_token_is_scoped_but_unresolvable() {
        let permission = Permission::try_from("churches.update:region").unwrap();
        assert!(permission.is_scoped());
        assert_eq!(permission.scope_token(), Some("region"));
        assert_eq!(permission.scope(), None);
    }

    #[test]
    fn grant_authorizes_handles_wildcards() {
        let exact = Permission::try_from("churches.update").unwrap();
        let resource_wide = Permission::try_from("churches.*").unwrap();
        let superuser = Permission::try_from("*").unwrap();

        assert!(grant_authorizes(&exact, "churches", "update"));
        assert!(!grant_authorizes(&exact, "churches", "delete"));
        assert!(grant_authorizes(&resource_wide, "churches", "delete"));
        assert!(!grant_authorizes(&resource_wide, "teams", "delete"));
        assert!(grant_authorizes(&superuser, "anything", "at_all"));
    }

    #[test]
    fn scoped_variant_counts_as_presence() {
        let granted = Permission::try_from("churches.update:subordinate").unwrap();
        let query = Permission::try_from("churches.update").unwrap();

        assert!(grant_matches_query(&granted, &query));
    }

    #[test]
    fn resource_for_pluralizes_entity_kinds() {
        assert_eq!(resource_for("church"), "churches");
        assert_eq!(resource_for("conference"), "conferences");
        assert_eq!(resource_for("story"), "stories");
        assert_eq!(resource_for("team"), "teams");
        assert_eq!(resource_for("Union"), "unions");
    }
}
