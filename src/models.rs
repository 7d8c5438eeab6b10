//! Data models for meetings, participants, and role requests

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A meeting aggregate, keyed by its globally unique call id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    pub call_id: String,
    pub title: String,
    pub creator_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A participant record owned by a meeting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Row identifier; doubles as the request id hosts act on
    pub id: Uuid,
    pub call_id: String,
    pub user_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub status: ParticipantStatus,
    pub is_host: bool,
    pub is_creator: bool,
    pub kind: ParticipantKind,
    pub joined_at: DateTime<Utc>,
}

/// Admission status of a participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Pending,
    Approved,
    Rejected,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Pending => "pending",
            ParticipantStatus::Approved => "approved",
            ParticipantStatus::Rejected => "rejected",
        }
    }

    /// Terminal statuses admit no further transition
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ParticipantStatus::Approved | ParticipantStatus::Rejected
        )
    }
}

impl std::str::FromStr for ParticipantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ParticipantStatus::Pending),
            "approved" => Ok(ParticipantStatus::Approved),
            "rejected" => Ok(ParticipantStatus::Rejected),
            _ => Err(format!("Invalid participant status: {}", s)),
        }
    }
}

/// How a participant entered the meeting (registered user or email invite)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantKind {
    User,
    Invite,
}

impl ParticipantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantKind::User => "user",
            ParticipantKind::Invite => "invite",
        }
    }
}

impl std::str::FromStr for ParticipantKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ParticipantKind::User),
            "invite" => Ok(ParticipantKind::Invite),
            _ => Err(format!("Invalid participant kind: {}", s)),
        }
    }
}

/// Host decision on a pending participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionAction {
    Approve,
    Reject,
}

impl AdmissionAction {
    /// The terminal status this action drives the participant to
    pub fn target(&self) -> ParticipantStatus {
        match self {
            AdmissionAction::Approve => ParticipantStatus::Approved,
            AdmissionAction::Reject => ParticipantStatus::Rejected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionAction::Approve => "approve",
            AdmissionAction::Reject => "reject",
        }
    }
}

/// An asynchronous proposal/response record observed by polling clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRequest {
    pub id: Uuid,
    pub kind: RequestKind,
    pub call_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
}

/// Kind of role request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    JoinRequest,
    HostRequest,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::JoinRequest => "join_request",
            RequestKind::HostRequest => "host_request",
        }
    }
}

impl std::str::FromStr for RequestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "join_request" => Ok(RequestKind::JoinRequest),
            "host_request" => Ok(RequestKind::HostRequest),
            _ => Err(format!("Invalid request kind: {}", s)),
        }
    }
}

/// Lifecycle status of a role request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Accepted | RequestStatus::Rejected)
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "accepted" => Ok(RequestStatus::Accepted),
            "rejected" => Ok(RequestStatus::Rejected),
            _ => Err(format!("Invalid request status: {}", s)),
        }
    }
}

/// Role derived from membership state, never stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Host,
    Cohost,
    Participant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Host => "host",
            Role::Cohost => "cohost",
            Role::Participant => "participant",
        }
    }
}

/// Capability set derived from a role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub can_manage_participants: bool,
    pub can_end_call: bool,
    pub can_view_stats: bool,
    pub can_modify_hosts: bool,
}

/// Request to create a new meeting
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMeetingRequest {
    pub call_id: String,
    pub title: String,
    pub creator_id: String,
    pub creator_name: String,
    pub creator_email: Option<String>,
    /// Registered users invited up front (admitted as pending)
    #[serde(default)]
    pub participants: Vec<InvitedUser>,
    /// External email invitees (admitted as pending, kind invite)
    #[serde(default)]
    pub invite_emails: Vec<String>,
}

/// A registered user selected at meeting-creation time
#[derive(Debug, Clone, Deserialize)]
pub struct InvitedUser {
    pub user_id: String,
    pub name: String,
    pub email: Option<String>,
}

/// Request to join a meeting
#[derive(Debug, Deserialize)]
pub struct JoinRequestBody {
    pub call_id: String,
    pub user_id: String,
    pub name: String,
    pub email: String,
}

/// Host decision on a pending join request
#[derive(Debug, Deserialize)]
pub struct DecideRequestBody {
    pub call_id: String,
    pub request_id: Uuid,
    pub action: AdmissionAction,
}

/// Host-role proposal
#[derive(Debug, Deserialize)]
pub struct ProposeHostBody {
    pub call_id: String,
    pub requester_id: String,
    pub target_user_id: String,
}

/// Target user's answer to a host-role proposal
#[derive(Debug, Deserialize)]
pub struct RespondHostBody {
    pub request_id: Uuid,
    pub user_id: String,
    pub accept: bool,
}

/// Pre-join probe by email
#[derive(Debug, Deserialize)]
pub struct CheckParticipantBody {
    pub call_id: String,
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_status_round_trip() {
        for s in ["pending", "approved", "rejected"] {
            let status: ParticipantStatus = s.parse().unwrap();
            assert_eq!(status.as_str(), s);
        }
        assert!("cancelled".parse::<ParticipantStatus>().is_err());
    }

    #[test]
    fn test_participant_status_is_terminal() {
        assert!(!ParticipantStatus::Pending.is_terminal());
        assert!(ParticipantStatus::Approved.is_terminal());
        assert!(ParticipantStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_admission_action_target() {
        assert_eq!(AdmissionAction::Approve.target(), ParticipantStatus::Approved);
        assert_eq!(AdmissionAction::Reject.target(), ParticipantStatus::Rejected);
    }

    #[test]
    fn test_request_kind_round_trip() {
        assert_eq!(
            "join_request".parse::<RequestKind>().unwrap(),
            RequestKind::JoinRequest
        );
        assert_eq!(
            "host_request".parse::<RequestKind>().unwrap(),
            RequestKind::HostRequest
        );
        assert!("ping".parse::<RequestKind>().is_err());
    }

    #[test]
    fn test_request_status_is_terminal() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(RequestStatus::Accepted.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_role_as_str() {
        assert_eq!(Role::Host.as_str(), "host");
        assert_eq!(Role::Cohost.as_str(), "cohost");
        assert_eq!(Role::Participant.as_str(), "participant");
    }

    #[test]
    fn test_admission_action_deserializes_snake_case() {
        let action: AdmissionAction = serde_json::from_str("\"approve\"").unwrap();
        assert_eq!(action, AdmissionAction::Approve);
        let action: AdmissionAction = serde_json::from_str("\"reject\"").unwrap();
        assert_eq!(action, AdmissionAction::Reject);
        assert!(serde_json::from_str::<AdmissionAction>("\"accept\"").is_err());
    }

    #[test]
    fn test_create_meeting_request_defaults() {
        let body: CreateMeetingRequest = serde_json::from_str(
            r#"{"call_id":"abc","title":"Standup","creator_id":"u1","creator_name":"Ann","creator_email":null}"#,
        )
        .unwrap();
        assert!(body.participants.is_empty());
        assert!(body.invite_emails.is_empty());
    }

    #[test]
    fn test_role_request_serialization_skips_empty_responded_at() {
        let req = RoleRequest {
            id: Uuid::new_v4(),
            kind: RequestKind::HostRequest,
            call_id: "abc".into(),
            sender_id: "u1".into(),
            receiver_id: "u2".into(),
            status: RequestStatus::Pending,
            created_at: Utc::now(),
            responded_at: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("host_request"));
        assert!(!json.contains("responded_at"));
    }
}
