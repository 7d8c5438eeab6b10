//! Permission resolution
//!
//! Roles and permissions are derived from membership state on every read;
//! nothing here is stored. Client-side caches of the result are
//! disposable projections, never authoritative.

use serde::Serialize;

use crate::models::{Participant, Permissions, Role};

/// Role plus derived capability set for a (meeting, user) pair
#[derive(Debug, Clone, Serialize)]
pub struct RoleGrant {
    pub role: Role,
    pub permissions: Permissions,
    pub is_host: bool,
    pub is_creator: bool,
}

/// Derive the role and permissions for a participant.
///
/// The creator is the host; any other participant with the host flag is a
/// cohost. Only the creator may modify host status of other participants.
pub fn resolve(creator_id: &str, participant: &Participant) -> RoleGrant {
    let role = if participant.user_id == creator_id {
        Role::Host
    } else if participant.is_host {
        Role::Cohost
    } else {
        Role::Participant
    };

    let elevated = role != Role::Participant;
    let permissions = Permissions {
        can_manage_participants: elevated,
        can_end_call: elevated,
        can_view_stats: elevated,
        can_modify_hosts: role == Role::Host,
    };

    RoleGrant {
        role,
        permissions,
        is_host: participant.is_host,
        is_creator: role == Role::Host,
    }
}
