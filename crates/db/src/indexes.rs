use mongodb::{options::IndexOptions, Database, IndexModel};
use tracing::info;

pub async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    create_indexes(
        db,
        "calls",
        vec![
            index_unique(bson::doc! { "room_id": 1 }),
            index(bson::doc! { "host_user_id": 1, "started_at": -1 }),
            index(bson::doc! { "ended_at": 1 }),
        ],
    )
    .await?;

    create_indexes(
        db,
        "call_participants",
        vec![
            index_unique(bson::doc! { "call_id": 1, "user_id": 1 }),
            index(bson::doc! { "user_id": 1, "joined_at": -1 }),
        ],
    )
    .await?;

    info!("all indexes ensured");
    Ok(())
}

fn index(keys: bson::Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

fn index_unique(keys: bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

async fn create_indexes(
    db: &Database,
    collection: &str,
    indexes: Vec<IndexModel>,
) -> Result<(), mongodb::error::Error> {
    db.collection::<bson::Document>(collection)
        .create_indexes(indexes)
        .await?;
    info!(collection, "indexes created");
    Ok(())
}
