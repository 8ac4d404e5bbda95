pub mod correlate;
pub mod dao;
pub mod filter;
pub mod reconcile;
pub mod stage;
pub mod stream;

pub use filter::FilterEngine;
pub use reconcile::Reconciler;
pub use stream::consumer::StreamConsumer;
