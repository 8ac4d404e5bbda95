use meetscribe_config::Settings;
use mongodb::{Client, Database, options::ClientOptions};
use tracing::info;

/// Opens the MongoDB client and proves liveness with a ping before any
/// pipeline task starts consuming.
pub async fn connect(settings: &Settings) -> Result<Database, mongodb::error::Error> {
    let mut options = ClientOptions::parse(&settings.database.url).await?;
    options.app_name = Some("meetscribe".to_string());
    options.max_pool_size = settings.database.max_pool_size;
    options.min_pool_size = settings.database.min_pool_size;

    let client = Client::with_options(options)?;
    let db = client.database(&settings.database.name);
    db.run_command(bson::doc! { "ping": 1 }).await?;

    info!(db = %settings.database.name, "Connected to MongoDB");
    Ok(db)
}
