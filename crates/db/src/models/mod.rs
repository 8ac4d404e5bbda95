pub mod account;
pub mod meeting;
pub mod session;
pub mod transcript;

pub use account::{Account, ApiToken};
pub use meeting::{Meeting, MeetingStatus, Platform};
pub use session::{MeetingSession, SessionStatus};
pub use transcript::{SpeakerStatus, TranscriptSegment};
