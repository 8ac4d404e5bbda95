pub mod account;
pub mod base;
pub mod meeting;
pub mod session;
pub mod transcript;

pub use account::AccountDao;
pub use base::{DaoError, DaoResult, PaginatedResult, PaginationParams};
pub use meeting::MeetingDao;
pub use session::SessionDao;
pub use transcript::TranscriptDao;
