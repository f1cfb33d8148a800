pub mod connection;
pub mod feed;

pub use feed::{ChangeFeed, FeedSubscription};
