//! # Gatelist Client Core
//!
//! Client-side data layer for the event-management screens: guests,
//! events, and QR check-in lists, all paginated against the proxy's
//! batch endpoints.
//!
//! ## Why batch + cache
//!
//! Admin screens page through thousands of guests. Fetching one page per
//! click spends a full round trip on every interaction, so instead:
//! - a bounded per-view [`cache::PageCache`] keeps recent pages warm,
//! - the [`batch::BatchLoader`] fetches several pages per round trip and
//!   collapses concurrent identical requests onto one in-flight call,
//! - the [`pagination::Paginator`] preloads the pages next to the one on
//!   screen after a short quiet period.
//!
//! The cache trades consistency for latency: entries are evicted by
//! recency, never expired, and a slow response may overwrite a newer one
//! (last-writer-wins). A filter change throws the whole cache away
//! rather than partitioning it per filter.
//!
//! ## Auth
//!
//! Requests carry a short-lived access token minted from an HTTP-only
//! refresh cookie via `/api/auth/refresh`. Token payloads are decoded
//! for expiry hints only; signatures are verified by the backend, never
//! here.

pub mod auth;
pub mod batch;
pub mod cache;
pub mod error;
pub mod models;
pub mod pagination;
pub mod retry;
pub mod token;

pub use auth::AuthClient;
pub use batch::{BatchLoader, HttpFetcher, LoadOptions, PageFetcher};
pub use cache::PageCache;
pub use error::{ClientError, LoadError};
pub use models::{BatchRequest, BatchResponse, Entity, Event, FilterSet, Guest};
pub use pagination::{PageView, PaginationConfig, Paginator};
pub use retry::RetryPolicy;
pub use token::TokenStore;
