pub mod consumer;
pub mod decoder;
pub mod log;
pub mod resolver;

pub use consumer::{Outcome, StreamConsumer};
pub use log::{EventLog, LogEntry, RedisEventLog, StreamError};
pub use resolver::{Directory, DirectoryError, MongoDirectory, Resolver};
