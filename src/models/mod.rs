mod category;
mod link;
mod transaction;

pub use category::CategoryBucket;
pub use link::{LinkState, SelectedAccounts};
pub use transaction::{FeedCategory, FeedTransaction, RemovedFeedTransaction};
