//! Host-role delegation protocol
//!
//! A host proposes the host role to a participant; the target observes
//! the pending request by polling and answers exactly once. Accepting
//! flips the participant's host flag in the same storage transaction as
//! the request resolution.

use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{RequestKind, RoleRequest};
use crate::store::Store;

/// Outcome of responding to a host-role proposal
#[derive(Debug, Clone)]
pub struct DelegationOutcome {
    pub request: RoleRequest,
    pub is_host: bool,
}

/// Coordinates host-role transfer requests against the store
#[derive(Clone)]
pub struct RoleDelegationProtocol {
    store: Store,
}

impl RoleDelegationProtocol {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Propose the host role to a participant.
    ///
    /// Only the creator or a current host may propose. At most one
    /// pending host request per (call, target) exists at a time; a
    /// repeated proposal coalesces to the existing pending request.
    pub async fn propose_host(
        &self,
        call_id: &str,
        requester_id: &str,
        target_user_id: &str,
    ) -> Result<RoleRequest> {
        let meeting = self.store.get_meeting(call_id).await?;

        let requester = self
            .store
            .participant_by_user(call_id, requester_id)
            .await?;
        let authorized = requester
            .map(|p| p.is_host || p.user_id == meeting.creator_id)
            .unwrap_or(false);
        if !authorized {
            return Err(AppError::Forbidden(
                "only hosts can send host requests".to_string(),
            ));
        }

        let target = self
            .store
            .participant_by_user(call_id, target_user_id)
            .await?
            .ok_or_else(|| AppError::ParticipantNotFound(target_user_id.to_string()))?;
        if target.is_host {
            return Err(AppError::AlreadyHost(target_user_id.to_string()));
        }

        if let Some(existing) = self
            .store
            .pending_request_for(RequestKind::HostRequest, call_id, target_user_id)
            .await?
        {
            tracing::debug!(
                call_id,
                target_user_id,
                request_id = %existing.id,
                "coalescing duplicate host request"
            );
            return Ok(existing);
        }

        let request = self
            .store
            .insert_role_request(RequestKind::HostRequest, call_id, requester_id, target_user_id)
            .await?;

        tracing::info!(
            call_id,
            requester_id,
            target_user_id,
            request_id = %request.id,
            "host request sent"
        );

        Ok(request)
    }

    /// Answer a host-role proposal. Only the addressed receiver may
    /// respond, and only while the request is still pending; the loser of
    /// a concurrent double-response observes `AlreadyResponded`.
    pub async fn respond(
        &self,
        request_id: Uuid,
        responder_id: &str,
        accept: bool,
    ) -> Result<DelegationOutcome> {
        let request = self
            .store
            .role_request(request_id)
            .await?
            .ok_or(AppError::RequestNotFound(request_id))?;

        if request.kind != RequestKind::HostRequest {
            return Err(AppError::BadRequest(
                "not a host request".to_string(),
            ));
        }
        if request.receiver_id != responder_id {
            return Err(AppError::Forbidden(
                "only the addressed participant can respond".to_string(),
            ));
        }
        if request.status.is_terminal() {
            return Err(AppError::AlreadyResponded);
        }

        let applied = self.store.respond_host_request(&request, accept).await?;
        if !applied {
            return Err(AppError::AlreadyResponded);
        }

        tracing::info!(
            call_id = %request.call_id,
            responder_id,
            accept,
            request_id = %request_id,
            "host request resolved"
        );

        let request = self
            .store
            .role_request(request_id)
            .await?
            .ok_or(AppError::RequestNotFound(request_id))?;

        Ok(DelegationOutcome {
            is_host: accept,
            request,
        })
    }

    /// Latest pending host request addressed to a user, for polling.
    pub async fn pending_host_request(
        &self,
        call_id: &str,
        user_id: &str,
    ) -> Result<Option<RoleRequest>> {
        self.store
            .pending_request_for(RequestKind::HostRequest, call_id, user_id)
            .await
    }
}
