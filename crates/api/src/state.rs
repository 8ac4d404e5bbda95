use std::sync::Arc;

use meetscribe_config::Settings;
use meetscribe_services::dao::{AccountDao, MeetingDao, SessionDao, TranscriptDao};
use mongodb::Database;
use redis::aio::ConnectionManager;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub settings: Settings,
    pub redis: ConnectionManager,
    pub accounts: Arc<AccountDao>,
    pub meetings: Arc<MeetingDao>,
    pub sessions: Arc<SessionDao>,
    pub transcripts: Arc<TranscriptDao>,
}

impl AppState {
    pub fn new(db: Database, redis: ConnectionManager, settings: Settings) -> Self {
        let accounts = Arc::new(AccountDao::new(&db));
        let meetings = Arc::new(MeetingDao::new(&db));
        let sessions = Arc::new(SessionDao::new(&db));
        let transcripts = Arc::new(TranscriptDao::new(&db));

        Self {
            db,
            settings,
            redis,
            accounts,
            meetings,
            sessions,
            transcripts,
        }
    }
}
