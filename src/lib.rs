//! cachesync - a client-side data synchronization cache.
//!
//! A [`Store`] maps string keys to values fetched by registered async handlers. Reads are
//! served from a time-bounded cache while fresh, failed fetches are retried with
//! exponential backoff, and list values can be edited locally without a round trip.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod query;
pub mod registry;
pub mod retry;
pub mod store;

pub use error::SyncError;
pub use query::{KeyQuery, QueryStatus};
pub use registry::{handler, FetchArgument, FetchFn};
pub use retry::{retry, RetryPolicy};
pub use store::{FetchRequest, Method, MutationStatus, State, Store, Subscription};
