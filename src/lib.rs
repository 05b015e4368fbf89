//! Hierarchy-scoped permission gating for organizational trees.
//!
//! This crate decides whether an authenticated actor may perform an action on
//! an entity located in a multi-level organizational tree, given permission
//! strings of the form `resource.action:scope`, the actor's position in the
//! tree, and an independent team-membership axis. The default behavior is
//! deny-by-default: missing data, malformed strings, and unknown scope tokens
//! all resolve to deny.
//!
//! Decisions gate UI affordances only; the remote API is expected to enforce
//! the same rules independently. Use [`Session`] to hold the loaded actor
//! context and [`Resolver`] for standalone checks over an [`ActorSnapshot`].
//!
//! # Examples
//!
//! Resolving a check against a loaded snapshot:
//! ```no_run
//! use org_gate::{ActorSnapshot, EntityAction, Resolver, SnapshotPayload, Target};
//!
//! # fn payload() -> SnapshotPayload { unimplemented!() }
//! let snapshot = ActorSnapshot::from_payload(payload(), 1, chrono::Utc::now());
//! let resolver = Resolver::new();
//! let verdict = resolver.can_perform(&snapshot, "church", EntityAction::Edit, Target::Unanchored);
//! let _ = verdict.is_allowed();
//! ```
//!
//! Driving a session end to end:
//! ```no_run
//! use org_gate::{LoadContext, MemoryCache, MemoryLoader, Session};
//!
//! # async fn demo(payload: org_gate::SnapshotPayload) -> org_gate::Result<()> {
//! let loader = MemoryLoader::new();
//! loader.set_payload(LoadContext::initial(), payload);
//! let mut session = Session::with_cache(loader, MemoryCache::new(1024));
//! session.authenticate().await?;
//! let _ = session.has_permission("churches.create");
//! # Ok(())
//! # }
//! ```
#![forbid(unsafe_code)]

mod cache;
mod error;
mod loader;
mod memory_cache;
mod memory_loader;
mod path;
mod permission;
mod resolver;
mod session;
mod snapshot;
mod types;

pub use crate::cache::{CacheKey, DecisionCache, NoCache};
pub use crate::error::{Error, LoadError, Result};
pub use crate::loader::{LoadContext, SnapshotLoader};
pub use crate::memory_cache::MemoryCache;
pub use crate::memory_loader::MemoryLoader;
pub use crate::path::HierarchyPath;
pub use crate::permission::{Permission, Scope, resource_for};
pub use crate::resolver::{Decision, EntityAction, Resolver, Target, Verdict};
pub use crate::session::{LoadTicket, Session, SessionState};
pub use crate::snapshot::{
    ActorSnapshot, Entity, OrganizationAssignment, SnapshotPayload, TeamAssignment, TeamRole,
    UserPayload,
};
pub use crate::types::{ActorId, EntityId, OrganizationId, TeamId};
