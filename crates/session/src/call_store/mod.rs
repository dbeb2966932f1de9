use crate::room::{CallId, RoomId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Durable record of a call's lifecycle, independent of the in-memory
/// `RoomRegistry`. Grounded on `ConferenceDao` (teacher's `dao/conference.rs`):
/// `join_participant`/`leave_participant` there are idempotent against
/// reconnect races, a property this trait's contract preserves.
///
/// Failures against this store are logged, never fatal to a live call
/// (spec.md §6.3): callers should treat a `CallStoreError` as "the call
/// proceeds in memory; persistence is best-effort."
#[async_trait]
pub trait CallStore: Send + Sync {
    async fn get_by_room_id(&self, room_id: &RoomId) -> Result<Option<CallRecord>, CallStoreError>;

    async fn start(
        &self,
        room_id: &RoomId,
        host_user_id: &UserId,
    ) -> Result<CallRecord, CallStoreError>;

    async fn add_participant(
        &self,
        call_id: &CallId,
        user_id: &UserId,
        display_name: &str,
    ) -> Result<(), CallStoreError>;

    async fn update_participant_status(
        &self,
        call_id: &CallId,
        user_id: &UserId,
        status: ParticipantStatus,
        at: DateTime<Utc>,
    ) -> Result<(), CallStoreError>;

    async fn end(&self, call_id: &CallId, at: DateTime<Utc>) -> Result<(), CallStoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantStatus {
    Joined,
    Left,
}

#[derive(Debug, Clone)]
pub struct CallRecord {
    pub call_id: CallId,
    pub room_id: RoomId,
    pub host_user_id: UserId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub participants: Vec<CallParticipantRecord>,
}

#[derive(Debug, Clone)]
pub struct CallParticipantRecord {
    pub user_id: UserId,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub status: ParticipantStatus,
}

#[derive(Debug, thiserror::Error)]
pub enum CallStoreError {
    #[error("call not found")]
    NotFound,
    #[error("call store backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

/// Reference/test double used by `vidmesh-tests` and unit tests in this
/// crate; mirrors the teacher's `TestApp` preference for exercising real
/// collaborator contracts without a live MongoDB (only the backing store
/// changes, not the trait).
#[derive(Default)]
pub struct InMemoryCallStore {
    calls: Mutex<HashMap<String, CallRecord>>,
    by_room: Mutex<HashMap<String, String>>,
}

impl InMemoryCallStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CallStore for InMemoryCallStore {
    async fn get_by_room_id(&self, room_id: &RoomId) -> Result<Option<CallRecord>, CallStoreError> {
        let by_room = self.by_room.lock().unwrap();
        let Some(call_id) = by_room.get(room_id.as_str()) else {
            return Ok(None);
        };
        let calls = self.calls.lock().unwrap();
        Ok(calls.get(call_id).cloned())
    }

    async fn start(
        &self,
        room_id: &RoomId,
        host_user_id: &UserId,
    ) -> Result<CallRecord, CallStoreError> {
        let mut by_room = self.by_room.lock().unwrap();
        if let Some(existing) = by_room.get(room_id.as_str()) {
            let calls = self.calls.lock().unwrap();
            if let Some(record) = calls.get(existing) {
                if record.ended_at.is_none() {
                    return Ok(record.clone());
                }
            }
        }
        let call_id = CallId::generate();
        let record = CallRecord {
            call_id: call_id.clone(),
            room_id: room_id.clone(),
            host_user_id: host_user_id.clone(),
            started_at: Utc::now(),
            ended_at: None,
            participants: Vec::new(),
        };
        by_room.insert(room_id.as_str().to_string(), call_id.as_str().to_string());
        self.calls
            .lock()
            .unwrap()
            .insert(call_id.as_str().to_string(), record.clone());
        Ok(record)
    }

    async fn add_participant(
        &self,
        call_id: &CallId,
        user_id: &UserId,
        display_name: &str,
    ) -> Result<(), CallStoreError> {
        let mut calls = self.calls.lock().unwrap();
        let record = calls
            .get_mut(call_id.as_str())
            .ok_or(CallStoreError::NotFound)?;
        if let Some(existing) = record
            .participants
            .iter_mut()
            .find(|p| &p.user_id == user_id)
        {
            existing.status = ParticipantStatus::Joined;
            existing.left_at = None;
            return Ok(());
        }
        record.participants.push(CallParticipantRecord {
            user_id: user_id.clone(),
            display_name: display_name.to_string(),
            joined_at: Utc::now(),
            left_at: None,
            status: ParticipantStatus::Joined,
        });
        Ok(())
    }

    async fn update_participant_status(
        &self,
        call_id: &CallId,
        user_id: &UserId,
        status: ParticipantStatus,
        at: DateTime<Utc>,
    ) -> Result<(), CallStoreError> {
        let mut calls = self.calls.lock().unwrap();
        let record = calls
            .get_mut(call_id.as_str())
            .ok_or(CallStoreError::NotFound)?;
        if let Some(p) = record.participants.iter_mut().find(|p| &p.user_id == user_id) {
            p.status = status;
            if status == ParticipantStatus::Left {
                p.left_at = Some(at);
            }
        }
        Ok(())
    }

    async fn end(&self, call_id: &CallId, at: DateTime<Utc>) -> Result<(), CallStoreError> {
        let mut calls = self.calls.lock().unwrap();
        let record = calls
            .get_mut(call_id.as_str())
            .ok_or(CallStoreError::NotFound)?;
        record.ended_at = Some(at);
        Ok(())
    }
}

impl CallId {
    pub fn generate() -> Self {
        Self(format!("call_{}", uuid::Uuid::new_v4().simple()))
    }
}
