//! Database store for meetings, participants, and role requests
//!
//! The store is the single authority for membership state. Status
//! transitions go through conditional updates on the current stored
//! status, so two concurrent callers produce exactly one transition.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    CreateMeetingRequest, Meeting, Participant, ParticipantKind, ParticipantStatus, RequestKind,
    RequestStatus, RoleRequest,
};

/// Database store
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // Meeting operations

    /// Create a meeting and seed its participant list: the creator
    /// (approved host), pre-invited registered users (pending), and
    /// external email invitees (pending, kind invite).
    pub async fn create_meeting(
        &self,
        req: &CreateMeetingRequest,
    ) -> Result<(Meeting, Vec<Participant>)> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO meetings (call_id, title, creator_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&req.call_id)
        .bind(&req.title)
        .bind(&req.creator_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(AppError::BadRequest(format!(
                "Meeting {} already exists",
                req.call_id
            )));
        }

        let mut participants = Vec::new();

        let creator = insert_participant_tx(
            &mut tx,
            &req.call_id,
            &req.creator_id,
            &req.creator_name,
            req.creator_email.as_deref(),
            ParticipantStatus::Approved,
            ParticipantKind::User,
            true,
            true,
        )
        .await?;
        participants.push(creator);

        for invited in &req.participants {
            if invited.user_id == req.creator_id {
                continue;
            }
            let p = insert_participant_tx(
                &mut tx,
                &req.call_id,
                &invited.user_id,
                &invited.name,
                invited.email.as_deref(),
                ParticipantStatus::Pending,
                ParticipantKind::User,
                false,
                false,
            )
            .await?;
            participants.push(p);
        }

        for email in &req.invite_emails {
            // Invitees have no account yet; give them a synthetic user id
            // and a name derived from the email local part.
            let user_id = Uuid::new_v4().to_string();
            let name = email.split('@').next().unwrap_or(email.as_str());
            let p = insert_participant_tx(
                &mut tx,
                &req.call_id,
                &user_id,
                name,
                Some(email),
                ParticipantStatus::Pending,
                ParticipantKind::Invite,
                false,
                false,
            )
            .await?;
            participants.push(p);
        }

        tx.commit().await?;

        let meeting = Meeting {
            call_id: req.call_id.clone(),
            title: req.title.clone(),
            creator_id: req.creator_id.clone(),
            created_at: now,
            updated_at: now,
        };

        Ok((meeting, participants))
    }

    pub async fn get_meeting(&self, call_id: &str) -> Result<Meeting> {
        let row = sqlx::query_as::<_, MeetingRow>(
            r#"
            SELECT call_id, title, creator_id, created_at, updated_at
            FROM meetings
            WHERE call_id = ?
            "#,
        )
        .bind(call_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::MeetingNotFound(call_id.to_string()))?;

        Ok(row.into())
    }

    // Participant operations

    /// Append a participant record. The unique constraint on
    /// (call_id, user_id) makes the existence check atomic: of two
    /// concurrent inserts for one user, exactly one succeeds.
    pub async fn insert_participant(
        &self,
        call_id: &str,
        user_id: &str,
        name: &str,
        email: Option<&str>,
        status: ParticipantStatus,
        kind: ParticipantKind,
    ) -> Result<Participant> {
        let mut tx = self.pool.begin().await?;
        let participant = insert_participant_tx(
            &mut tx, call_id, user_id, name, email, status, kind, false, false,
        )
        .await?;
        touch_meeting_tx(&mut tx, call_id).await?;
        tx.commit().await?;
        Ok(participant)
    }

    pub async fn participant_by_id(&self, call_id: &str, id: Uuid) -> Result<Option<Participant>> {
        let row = sqlx::query_as::<_, ParticipantRow>(
            r#"
            SELECT id, call_id, user_id, name, email, status, is_host, is_creator, kind, joined_at
            FROM participants
            WHERE call_id = ? AND id = ?
            "#,
        )
        .bind(call_id)
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    pub async fn participant_by_user(
        &self,
        call_id: &str,
        user_id: &str,
    ) -> Result<Option<Participant>> {
        let row = sqlx::query_as::<_, ParticipantRow>(
            r#"
            SELECT id, call_id, user_id, name, email, status, is_host, is_creator, kind, joined_at
            FROM participants
            WHERE call_id = ? AND user_id = ?
            "#,
        )
        .bind(call_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    pub async fn participant_by_email(
        &self,
        call_id: &str,
        email: &str,
    ) -> Result<Option<Participant>> {
        let row = sqlx::query_as::<_, ParticipantRow>(
            r#"
            SELECT id, call_id, user_id, name, email, status, is_host, is_creator, kind, joined_at
            FROM participants
            WHERE call_id = ? AND lower(email) = lower(?)
            "#,
        )
        .bind(call_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    pub async fn participants_with_status(
        &self,
        call_id: &str,
        status: ParticipantStatus,
    ) -> Result<Vec<Participant>> {
        let rows = sqlx::query_as::<_, ParticipantRow>(
            r#"
            SELECT id, call_id, user_id, name, email, status, is_host, is_creator, kind, joined_at
            FROM participants
            WHERE call_id = ? AND status = ?
            ORDER BY joined_at ASC
            "#,
        )
        .bind(call_id)
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Compare-and-swap a participant from `pending` to a terminal status.
    /// Returns false when the stored status was no longer `pending`; the
    /// caller decides whether that is an idempotent retry or a conflict.
    pub async fn transition_participant(
        &self,
        call_id: &str,
        id: Uuid,
        to: ParticipantStatus,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE participants SET status = ?
            WHERE call_id = ? AND id = ? AND status = 'pending'
            "#,
        )
        .bind(to.as_str())
        .bind(call_id)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

        let applied = result.rows_affected() == 1;
        if applied {
            touch_meeting_tx(&mut tx, call_id).await?;
        }
        tx.commit().await?;

        Ok(applied)
    }

    /// Admit a new pending participant and record the join notification
    /// addressed to `receiver_id` in one transaction, so a participant
    /// without its notification row is never persisted.
    pub async fn insert_participant_with_request(
        &self,
        call_id: &str,
        user_id: &str,
        name: &str,
        email: Option<&str>,
        receiver_id: &str,
    ) -> Result<(Participant, RoleRequest)> {
        let mut tx = self.pool.begin().await?;
        let participant = insert_participant_tx(
            &mut tx,
            call_id,
            user_id,
            name,
            email,
            ParticipantStatus::Pending,
            ParticipantKind::User,
            false,
            false,
        )
        .await?;
        let request = insert_role_request_tx(
            &mut tx,
            RequestKind::JoinRequest,
            call_id,
            user_id,
            receiver_id,
        )
        .await?;
        touch_meeting_tx(&mut tx, call_id).await?;
        tx.commit().await?;
        Ok((participant, request))
    }

    // Role request operations

    /// Record a pending role request. The partial unique index on pending
    /// host requests makes concurrent duplicate proposals collide at the
    /// database; the loser returns the row that won instead of stacking a
    /// second pending.
    pub async fn insert_role_request(
        &self,
        kind: RequestKind,
        call_id: &str,
        sender_id: &str,
        receiver_id: &str,
    ) -> Result<RoleRequest> {
        loop {
            let mut tx = self.pool.begin().await?;
            let attempt =
                insert_role_request_tx(&mut tx, kind, call_id, sender_id, receiver_id).await;
            match attempt {
                Ok(request) => {
                    tx.commit().await?;
                    return Ok(request);
                }
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    // Release the connection before re-reading.
                    tx.rollback().await?;
                    if let Some(existing) =
                        self.pending_request_for(kind, call_id, receiver_id).await?
                    {
                        return Ok(existing);
                    }
                    // The conflicting pending was resolved in between;
                    // insert again.
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub async fn role_request(&self, id: Uuid) -> Result<Option<RoleRequest>> {
        let row = sqlx::query_as::<_, RoleRequestRow>(
            r#"
            SELECT id, kind, call_id, sender_id, receiver_id, status, created_at, responded_at
            FROM role_requests
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Latest pending request of the given kind addressed to a receiver.
    pub async fn pending_request_for(
        &self,
        kind: RequestKind,
        call_id: &str,
        receiver_id: &str,
    ) -> Result<Option<RoleRequest>> {
        let row = sqlx::query_as::<_, RoleRequestRow>(
            r#"
            SELECT id, kind, call_id, sender_id, receiver_id, status, created_at, responded_at
            FROM role_requests
            WHERE call_id = ? AND receiver_id = ? AND kind = ? AND status = 'pending'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(call_id)
        .bind(receiver_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Resolve a host request and, on acceptance, flip the receiver's host
    /// flag in the same transaction. An accepted request with no host flag
    /// set must never be observable. Returns false when the request was
    /// already terminal (the compare-and-swap lost).
    pub async fn respond_host_request(&self, request: &RoleRequest, accept: bool) -> Result<bool> {
        let now = Utc::now();
        let status = if accept {
            RequestStatus::Accepted
        } else {
            RequestStatus::Rejected
        };

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE role_requests SET status = ?, responded_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(status.as_str())
        .bind(now)
        .bind(request.id.to_string())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        if accept {
            let updated = sqlx::query(
                r#"
                UPDATE participants SET is_host = 1
                WHERE call_id = ? AND user_id = ?
                "#,
            )
            .bind(&request.call_id)
            .bind(&request.receiver_id)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                // Dropping the transaction rolls the response back too.
                return Err(AppError::ParticipantNotFound(request.receiver_id.clone()));
            }
        }

        touch_meeting_tx(&mut tx, &request.call_id).await?;
        tx.commit().await?;

        Ok(true)
    }
}

#[allow(clippy::too_many_arguments)]
async fn insert_participant_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    call_id: &str,
    user_id: &str,
    name: &str,
    email: Option<&str>,
    status: ParticipantStatus,
    kind: ParticipantKind,
    is_host: bool,
    is_creator: bool,
) -> Result<Participant> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO participants (id, call_id, user_id, name, email, status, is_host, is_creator, kind, joined_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(call_id)
    .bind(user_id)
    .bind(name)
    .bind(email)
    .bind(status.as_str())
    .bind(is_host)
    .bind(is_creator)
    .bind(kind.as_str())
    .bind(now)
    .execute(&mut **tx)
    .await;

    match result {
        Ok(_) => Ok(Participant {
            id,
            call_id: call_id.to_string(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            email: email.map(String::from),
            status,
            is_host,
            is_creator,
            kind,
            joined_at: now,
        }),
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            Err(AppError::AlreadyRequested(user_id.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Returns the raw sqlx error so callers can recognize a unique-index
/// collision on pending host requests.
async fn insert_role_request_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    kind: RequestKind,
    call_id: &str,
    sender_id: &str,
    receiver_id: &str,
) -> sqlx::Result<RoleRequest> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO role_requests (id, kind, call_id, sender_id, receiver_id, status, created_at)
        VALUES (?, ?, ?, ?, ?, 'pending', ?)
        "#,
    )
    .bind(id.to_string())
    .bind(kind.as_str())
    .bind(call_id)
    .bind(sender_id)
    .bind(receiver_id)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    Ok(RoleRequest {
        id,
        kind,
        call_id: call_id.to_string(),
        sender_id: sender_id.to_string(),
        receiver_id: receiver_id.to_string(),
        status: RequestStatus::Pending,
        created_at: now,
        responded_at: None,
    })
}

/// Move the aggregate's updated_at so pollers can diff cheaply.
async fn touch_meeting_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    call_id: &str,
) -> Result<()> {
    sqlx::query("UPDATE meetings SET updated_at = ? WHERE call_id = ?")
        .bind(Utc::now())
        .bind(call_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

// Internal row types for sqlx

#[derive(sqlx::FromRow)]
struct MeetingRow {
    call_id: String,
    title: String,
    creator_id: String,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

impl From<MeetingRow> for Meeting {
    fn from(row: MeetingRow) -> Self {
        Meeting {
            call_id: row.call_id,
            title: row.title,
            creator_id: row.creator_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ParticipantRow {
    id: String,
    call_id: String,
    user_id: String,
    name: String,
    email: Option<String>,
    status: String,
    is_host: bool,
    is_creator: bool,
    kind: String,
    joined_at: chrono::DateTime<Utc>,
}

impl TryFrom<ParticipantRow> for Participant {
    type Error = AppError;

    fn try_from(row: ParticipantRow) -> Result<Self> {
        Ok(Participant {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            call_id: row.call_id,
            user_id: row.user_id,
            name: row.name,
            email: row.email,
            status: row
                .status
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid status: {}", e)))?,
            is_host: row.is_host,
            is_creator: row.is_creator,
            kind: row
                .kind
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid kind: {}", e)))?,
            joined_at: row.joined_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RoleRequestRow {
    id: String,
    kind: String,
    call_id: String,
    sender_id: String,
    receiver_id: String,
    status: String,
    created_at: chrono::DateTime<Utc>,
    responded_at: Option<chrono::DateTime<Utc>>,
}

impl TryFrom<RoleRequestRow> for RoleRequest {
    type Error = AppError;

    fn try_from(row: RoleRequestRow) -> Result<Self> {
        Ok(RoleRequest {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            kind: row
                .kind
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid kind: {}", e)))?,
            call_id: row.call_id,
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            status: row
                .status
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid status: {}", e)))?,
            created_at: row.created_at,
            responded_at: row.responded_at,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    pub async fn setup_test_db() -> Store {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");

        // The migration file holds multiple statements; run them one by
        // one since sqlite executes only the first statement of a batch.
        for stmt in include_str!("../migrations/0001_membership.sql").split(';') {
            let stmt = stmt.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt)
                    .execute(&pool)
                    .await
                    .expect("Failed to run migration statement");
            }
        }

        Store::new(pool)
    }

    pub fn meeting_request(call_id: &str, creator_id: &str) -> CreateMeetingRequest {
        CreateMeetingRequest {
            call_id: call_id.to_string(),
            title: "Test meeting".to_string(),
            creator_id: creator_id.to_string(),
            creator_name: "Creator".to_string(),
            creator_email: Some("creator@example.com".to_string()),
            participants: Vec::new(),
            invite_emails: Vec::new(),
        }
    }
}
