use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backchannel::types::{ContainerRef, UserId};

/// Role of a user within a container. A DM's creator is its only owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Owner,
    Member,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Owner => write!(f, "owner"),
            Role::Member => write!(f, "member"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "owner" => Ok(Role::Owner),
            "member" => Ok(Role::Member),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Membership and role oracle, owned by the external membership collaborator.
///
/// The engine never caches anything it can ask the directory for: names,
/// roles and member sets are always looked up live, so membership changes
/// take effect on the very next operation.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Whether the container currently exists.
    async fn container_exists(&self, container: ContainerRef) -> bool;

    /// Display name of the container, if it exists.
    async fn name_of(&self, container: ContainerRef) -> Option<String>;

    /// Whether `user` is currently a member of `container`.
    async fn is_member(&self, container: ContainerRef, user: UserId) -> bool;

    /// Role of `user` within `container`, `None` when not a member.
    async fn role_of(&self, container: ContainerRef, user: UserId) -> Option<Role>;

    /// Whether `user` is a workspace-wide owner.
    async fn is_global_owner(&self, user: UserId) -> bool;

    /// The user's unique @-mentionable handle.
    async fn handle_of(&self, user: UserId) -> Option<String>;

    /// Resolves `handle` against the live member set of `container`.
    async fn resolve_handle(&self, container: ContainerRef, handle: &str) -> Option<UserId>;

    /// Channel ids the user belongs to, in join order.
    async fn channels_of(&self, user: UserId) -> Vec<u64>;

    /// DM ids the user belongs to, in creation order.
    async fn dms_of(&self, user: UserId) -> Vec<u64>;

    /// Every registered user id.
    async fn registered_users(&self) -> Vec<UserId>;
}

/// Whether `user` may moderate `container` (edit/remove others' messages,
/// pin/unpin). Channels extend moderation to global owners; DMs deliberately
/// do not — only the DM creator (its sole owner) qualifies.
pub(crate) async fn can_moderate(
    directory: &dyn Directory,
    container: ContainerRef,
    user: UserId,
) -> bool {
    if directory.role_of(container, user).await == Some(Role::Owner) {
        return true;
    }
    container.is_channel() && directory.is_global_owner(user).await
}

/// Container name for notification text, falling back to the reference
/// itself if the directory no longer knows the container.
pub(crate) async fn display_name(directory: &dyn Directory, container: ContainerRef) -> String {
    match directory.name_of(container).await {
        Some(name) => name,
        None => container.to_string(),
    }
}
