//! Admission state machine for join requests
//!
//! Participants move `pending -> approved` or `pending -> rejected`
//! exactly once, via an explicit host action. Transitions are conditioned
//! on the stored status at mutation time, so concurrent hosts acting on
//! the same request produce one winner; the loser observes `NotPending`.

use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{AdmissionAction, Participant, ParticipantStatus, RoleRequest};
use crate::store::Store;

/// Outcome of a join-request submission
#[derive(Debug, Clone)]
pub struct AdmissionTicket {
    pub participant: Participant,
    pub request: RoleRequest,
}

/// Poll-friendly status report for a joining client
#[derive(Debug, Clone, serde::Serialize)]
pub struct StatusReport {
    pub status: ParticipantStatus,
    pub message: &'static str,
}

/// Coordinates participant admission against the store
#[derive(Clone)]
pub struct AdmissionStateMachine {
    store: Store,
}

impl AdmissionStateMachine {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Submit a join request: appends a pending participant and notifies
    /// the meeting creator, both in one transaction. Fails with
    /// `AlreadyRequested` if the user already has a record of any status,
    /// including `rejected`.
    pub async fn request_admission(
        &self,
        call_id: &str,
        user_id: &str,
        name: &str,
        email: &str,
    ) -> Result<AdmissionTicket> {
        let meeting = self.store.get_meeting(call_id).await?;

        let (participant, request) = self
            .store
            .insert_participant_with_request(
                call_id,
                user_id,
                name,
                Some(email),
                &meeting.creator_id,
            )
            .await?;

        tracing::info!(call_id, user_id, "join request submitted");

        Ok(AdmissionTicket {
            participant,
            request,
        })
    }

    /// Apply a host decision to a pending participant.
    ///
    /// Of two concurrent decisions, one wins the compare-and-swap; the
    /// other re-reads the stored status and either returns it unchanged
    /// (idempotent retry of the same action) or fails with `NotPending`.
    pub async fn decide(
        &self,
        call_id: &str,
        participant_id: Uuid,
        action: AdmissionAction,
    ) -> Result<Participant> {
        self.store.get_meeting(call_id).await?;

        let target = action.target();
        let applied = self
            .store
            .transition_participant(call_id, participant_id, target)
            .await?;

        let stored = self
            .store
            .participant_by_id(call_id, participant_id)
            .await?
            .ok_or_else(|| AppError::ParticipantNotFound(participant_id.to_string()))?;

        if applied {
            tracing::info!(
                call_id,
                participant_id = %participant_id,
                action = action.as_str(),
                "participant request decided"
            );
            return Ok(stored);
        }

        if stored.status == target {
            // Retry of an already-applied decision.
            return Ok(stored);
        }

        Err(AppError::NotPending)
    }

    /// Poll read for a joining client.
    pub async fn check_status(&self, call_id: &str, user_id: &str) -> Result<StatusReport> {
        self.store.get_meeting(call_id).await?;

        let participant = self
            .store
            .participant_by_user(call_id, user_id)
            .await?
            .ok_or_else(|| AppError::ParticipantNotFound(user_id.to_string()))?;

        Ok(StatusReport {
            status: participant.status,
            message: status_message(participant.status),
        })
    }

    /// Soft existence probe by email, used before submitting a join
    /// request. Returns None rather than an error when no record exists.
    pub async fn check_by_email(&self, call_id: &str, email: &str) -> Result<Option<Participant>> {
        self.store.get_meeting(call_id).await?;
        self.store.participant_by_email(call_id, email).await
    }

    /// Pending participants awaiting a decision, for host polling.
    pub async fn pending_participants(&self, call_id: &str) -> Result<Vec<Participant>> {
        self.store.get_meeting(call_id).await?;
        self.store
            .participants_with_status(call_id, ParticipantStatus::Pending)
            .await
    }
}

fn status_message(status: ParticipantStatus) -> &'static str {
    match status {
        ParticipantStatus::Approved => "You have been approved to join the meeting",
        ParticipantStatus::Rejected => "Your request has been rejected",
        ParticipantStatus::Pending => "Your request is still pending",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ParticipantKind, RequestKind};
    use crate::store::test_support::{meeting_request, setup_test_db};

    async fn setup() -> (AdmissionStateMachine, Store) {
        let store = setup_test_db().await;
        store
            .create_meeting(&meeting_request("abc", "creator-1"))
            .await
            .unwrap();
        (AdmissionStateMachine::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_request_admission_creates_pending_participant() {
        let (admission, _) = setup().await;

        let ticket = admission
            .request_admission("abc", "guest-1", "Ann", "a@x.com")
            .await
            .unwrap();

        assert_eq!(ticket.participant.status, ParticipantStatus::Pending);
        assert_eq!(ticket.participant.kind, ParticipantKind::User);
        assert!(!ticket.participant.is_host);
        // Notification goes to the meeting creator.
        assert_eq!(ticket.request.kind, RequestKind::JoinRequest);
        assert_eq!(ticket.request.sender_id, "guest-1");
        assert_eq!(ticket.request.receiver_id, "creator-1");
    }

    #[tokio::test]
    async fn test_request_admission_duplicate_rejected() {
        let (admission, _) = setup().await;

        admission
            .request_admission("abc", "guest-1", "Ann", "a@x.com")
            .await
            .unwrap();

        let result = admission
            .request_admission("abc", "guest-1", "Ann", "a@x.com")
            .await;
        assert!(matches!(result.unwrap_err(), AppError::AlreadyRequested(_)));

        let pending = admission.pending_participants("abc").await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_request_admission_after_rejection_still_conflicts() {
        let (admission, _) = setup().await;

        let ticket = admission
            .request_admission("abc", "guest-1", "Ann", "a@x.com")
            .await
            .unwrap();
        admission
            .decide("abc", ticket.participant.id, AdmissionAction::Reject)
            .await
            .unwrap();

        let result = admission
            .request_admission("abc", "guest-1", "Ann", "a@x.com")
            .await;
        assert!(matches!(result.unwrap_err(), AppError::AlreadyRequested(_)));

        // The terminal status stays visible to the polling client.
        let report = admission.check_status("abc", "guest-1").await.unwrap();
        assert_eq!(report.status, ParticipantStatus::Rejected);
    }

    #[tokio::test]
    async fn test_request_admission_unknown_meeting() {
        let (admission, _) = setup().await;
        let result = admission
            .request_admission("missing", "guest-1", "Ann", "a@x.com")
            .await;
        assert!(matches!(result.unwrap_err(), AppError::MeetingNotFound(_)));
    }

    #[tokio::test]
    async fn test_decide_approve() {
        let (admission, _) = setup().await;
        let ticket = admission
            .request_admission("abc", "guest-1", "Ann", "a@x.com")
            .await
            .unwrap();

        let decided = admission
            .decide("abc", ticket.participant.id, AdmissionAction::Approve)
            .await
            .unwrap();
        assert_eq!(decided.status, ParticipantStatus::Approved);
        assert!(!decided.is_host);

        let report = admission.check_status("abc", "guest-1").await.unwrap();
        assert_eq!(report.status, ParticipantStatus::Approved);
    }

    #[tokio::test]
    async fn test_decide_conflicting_actions_one_winner() {
        let (admission, _) = setup().await;
        let ticket = admission
            .request_admission("abc", "guest-1", "Ann", "a@x.com")
            .await
            .unwrap();

        admission
            .decide("abc", ticket.participant.id, AdmissionAction::Approve)
            .await
            .unwrap();

        // The opposite decision arrives late and must not re-apply.
        let result = admission
            .decide("abc", ticket.participant.id, AdmissionAction::Reject)
            .await;
        assert!(matches!(result.unwrap_err(), AppError::NotPending));

        let report = admission.check_status("abc", "guest-1").await.unwrap();
        assert_eq!(report.status, ParticipantStatus::Approved);
    }

    #[tokio::test]
    async fn test_decide_retry_is_idempotent() {
        let (admission, _) = setup().await;
        let ticket = admission
            .request_admission("abc", "guest-1", "Ann", "a@x.com")
            .await
            .unwrap();

        admission
            .decide("abc", ticket.participant.id, AdmissionAction::Approve)
            .await
            .unwrap();

        // A client that timed out and retries gets the terminal state back.
        let retried = admission
            .decide("abc", ticket.participant.id, AdmissionAction::Approve)
            .await
            .unwrap();
        assert_eq!(retried.status, ParticipantStatus::Approved);
    }

    #[tokio::test]
    async fn test_decide_unknown_participant() {
        let (admission, _) = setup().await;
        let result = admission
            .decide("abc", Uuid::new_v4(), AdmissionAction::Approve)
            .await;
        assert!(matches!(
            result.unwrap_err(),
            AppError::ParticipantNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_check_status_not_yet_admitted() {
        let (admission, _) = setup().await;
        let result = admission.check_status("abc", "stranger").await;
        assert!(matches!(
            result.unwrap_err(),
            AppError::ParticipantNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_check_status_messages() {
        let (admission, _) = setup().await;
        let ticket = admission
            .request_admission("abc", "guest-1", "Ann", "a@x.com")
            .await
            .unwrap();

        let report = admission.check_status("abc", "guest-1").await.unwrap();
        assert_eq!(report.message, "Your request is still pending");

        admission
            .decide("abc", ticket.participant.id, AdmissionAction::Approve)
            .await
            .unwrap();
        let report = admission.check_status("abc", "guest-1").await.unwrap();
        assert_eq!(report.message, "You have been approved to join the meeting");
    }

    #[tokio::test]
    async fn test_check_by_email() {
        let (admission, _) = setup().await;
        admission
            .request_admission("abc", "guest-1", "Ann", "Ann@Example.com")
            .await
            .unwrap();

        let found = admission
            .check_by_email("abc", "ann@example.com")
            .await
            .unwrap();
        assert!(found.is_some());

        let missing = admission.check_by_email("abc", "no@x.com").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_decide_never_mutates_host_flag() {
        let (admission, store) = setup().await;
        let ticket = admission
            .request_admission("abc", "guest-1", "Ann", "a@x.com")
            .await
            .unwrap();

        admission
            .decide("abc", ticket.participant.id, AdmissionAction::Approve)
            .await
            .unwrap();

        let stored = store
            .participant_by_user("abc", "guest-1")
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.is_host);
        assert!(!stored.is_creator);
    }
}
