use async_trait::async_trait;
use bson::{doc, DateTime as BsonDateTime};
use chrono::{DateTime, Utc};
use mongodb::{Collection, Database};
use vidmesh_session::call_store::{
    CallParticipantRecord, CallRecord, CallStore, CallStoreError, ParticipantStatus,
};
use vidmesh_session::room::{CallId, RoomId, UserId};

use crate::models::{CallDocument, CallParticipantDocument, ParticipantStatusDocument};

/// `CallStore` backed by MongoDB. Grounded on the teacher's
/// `ConferenceDao::start`/`join_participant`/`leave_participant`
/// (`services/src/dao/conference.rs`): `start` is an upsert keyed on
/// `room_id` so a host reconnecting before the first writer's insert lands
/// still gets the same call row, and participant writes go through a
/// dedicated `call_participants` collection rather than an embedded array,
/// since this port only ever reads a single participant's status at a time.
pub struct MongoCallStore {
    calls: Collection<CallDocument>,
    participants: Collection<CallParticipantDocument>,
}

impl MongoCallStore {
    pub fn new(db: &Database) -> Self {
        Self {
            calls: db.collection(CallDocument::COLLECTION),
            participants: db.collection(CallParticipantDocument::COLLECTION),
        }
    }

    async fn load(&self, call_id: &str) -> Result<Option<CallRecord>, CallStoreError> {
        let Some(doc) = self
            .calls
            .find_one(doc! { "call_id": call_id })
            .await
            .map_err(backend_err)?
        else {
            return Ok(None);
        };

        let mut cursor = self
            .participants
            .find(doc! { "call_id": call_id })
            .await
            .map_err(backend_err)?;

        let mut participants = Vec::new();
        use futures::stream::TryStreamExt;
        while let Some(p) = cursor.try_next().await.map_err(backend_err)? {
            participants.push(CallParticipantRecord {
                user_id: UserId::new(p.user_id),
                display_name: p.display_name,
                joined_at: to_chrono(p.joined_at),
                left_at: p.left_at.map(to_chrono),
                status: from_doc_status(p.status),
            });
        }

        Ok(Some(CallRecord {
            call_id: CallId::new(doc.call_id),
            room_id: RoomId::new(doc.room_id),
            host_user_id: UserId::new(doc.host_user_id),
            started_at: to_chrono(doc.started_at),
            ended_at: doc.ended_at.map(to_chrono),
            participants,
        }))
    }
}

#[async_trait]
impl CallStore for MongoCallStore {
    async fn get_by_room_id(&self, room_id: &RoomId) -> Result<Option<CallRecord>, CallStoreError> {
        let Some(doc) = self
            .calls
            .find_one(doc! { "room_id": room_id.as_str() })
            .await
            .map_err(backend_err)?
        else {
            return Ok(None);
        };
        self.load(&doc.call_id).await
    }

    async fn start(
        &self,
        room_id: &RoomId,
        host_user_id: &UserId,
    ) -> Result<CallRecord, CallStoreError> {
        if let Some(existing) = self.get_by_room_id(room_id).await? {
            if existing.ended_at.is_none() {
                return Ok(existing);
            }
        }

        let call_id = CallId::generate();
        let now = BsonDateTime::now();
        let document = CallDocument {
            id: None,
            call_id: call_id.as_str().to_string(),
            room_id: room_id.as_str().to_string(),
            host_user_id: host_user_id.as_str().to_string(),
            started_at: now,
            ended_at: None,
        };

        self.calls.insert_one(&document).await.map_err(backend_err)?;

        self.load(&document.call_id)
            .await?
            .ok_or(CallStoreError::NotFound)
    }

    async fn add_participant(
        &self,
        call_id: &CallId,
        user_id: &UserId,
        display_name: &str,
    ) -> Result<(), CallStoreError> {
        self.participants
            .update_one(
                doc! { "call_id": call_id.as_str(), "user_id": user_id.as_str() },
                doc! {
                    "$set": {
                        "display_name": display_name,
                        "status": "joined",
                        "left_at": bson::Bson::Null,
                    },
                    "$setOnInsert": {
                        "call_id": call_id.as_str(),
                        "user_id": user_id.as_str(),
                        "joined_at": BsonDateTime::now(),
                    },
                },
            )
            .upsert(true)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn update_participant_status(
        &self,
        call_id: &CallId,
        user_id: &UserId,
        status: ParticipantStatus,
        at: DateTime<Utc>,
    ) -> Result<(), CallStoreError> {
        let status_str = match status {
            ParticipantStatus::Joined => "joined",
            ParticipantStatus::Left => "left",
        };
        let mut set = doc! { "status": status_str };
        if status == ParticipantStatus::Left {
            set.insert("left_at", to_bson(at));
        }
        self.participants
            .update_one(
                doc! { "call_id": call_id.as_str(), "user_id": user_id.as_str() },
                doc! { "$set": set },
            )
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn end(&self, call_id: &CallId, at: DateTime<Utc>) -> Result<(), CallStoreError> {
        self.calls
            .update_one(
                doc! { "call_id": call_id.as_str() },
                doc! { "$set": { "ended_at": to_bson(at) } },
            )
            .await
            .map_err(backend_err)?;
        Ok(())
    }
}

fn backend_err(e: mongodb::error::Error) -> CallStoreError {
    CallStoreError::Backend(e.into())
}

fn to_chrono(d: BsonDateTime) -> DateTime<Utc> {
    d.to_chrono()
}

fn to_bson(d: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_chrono(d)
}

fn from_doc_status(status: ParticipantStatusDocument) -> ParticipantStatus {
    match status {
        ParticipantStatusDocument::Joined => ParticipantStatus::Joined,
        ParticipantStatusDocument::Left => ParticipantStatus::Left,
    }
}
