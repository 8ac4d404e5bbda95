use mongodb::{Database, IndexModel, options::IndexOptions};
use tracing::info;

pub async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    // Accounts
    create_indexes(
        db,
        "accounts",
        vec![index_unique(bson::doc! { "email": 1 })],
    )
    .await?;

    // API tokens
    create_indexes(
        db,
        "api_tokens",
        vec![
            index_unique(bson::doc! { "token": 1 }),
            index(bson::doc! { "account_id": 1 }),
        ],
    )
    .await?;

    // Meetings: lookups are "latest meeting for (account, platform, external id)"
    create_indexes(
        db,
        "meetings",
        vec![
            index(bson::doc! { "account_id": 1, "platform": 1, "external_id": 1, "created_at": -1 }),
            index(bson::doc! { "account_id": 1, "created_at": -1 }),
        ],
    )
    .await?;

    // Sessions
    create_indexes(
        db,
        "sessions",
        vec![
            index_unique(bson::doc! { "session_uid": 1 }),
            index(bson::doc! { "meeting_id": 1, "started_at": 1 }),
        ],
    )
    .await?;

    // Transcripts: the unique key is the idempotent-upsert identity
    create_indexes(
        db,
        "transcripts",
        vec![
            index_unique(bson::doc! { "session_uid": 1, "relative_start_ms": 1 }),
            index(bson::doc! { "meeting_id": 1, "relative_start_ms": 1 }),
        ],
    )
    .await?;

    info!("All indexes ensured");
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
    info!(collection, "Indexes created");
    Ok(())
}
