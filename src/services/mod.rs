pub mod analytics;
pub mod announcer;
pub mod cache;
pub mod matcher;
pub mod notify;
pub mod rate;
pub mod store;

pub use analytics::{Analytics, ScannerStatus};
pub use announcer::{Announcer, LogAnnouncer};
pub use cache::CacheService;
pub use matcher::{MatchReport, OrderMatcher};
pub use notify::{NotifyOutcome, Notifier};
pub use rate::{RateOracle, RateRule};
pub use store::{monitored_on, MemoryStore, OrderStore};
