// Destination-side client for a Matrix Synapse homeserver
//
// This module provides:
// - A paced HTTP client that retries throttled (429) requests with backoff
// - Synapse admin user provisioning and room/space management
// - Password login helpers for obtaining an access token
// - The `DestinationApi` seam the import pipelines are written against

pub mod api;
pub mod auth;
pub mod destination;
pub mod errors;
pub mod matrix_client;
pub mod rate_limit;
pub mod types;


pub use destination::DestinationApi;
pub use errors::{ClientError, ClientResult, MatrixErrorBody};
pub use matrix_client::{ApiResponse, MatrixClient, DEFAULT_REQUEST_TIMEOUT};
pub use rate_limit::{backoff_delay, RateLimitConfig, MAX_RETRY_DELAY};
pub use types::{
    Invitation, LoginResponse, Provisioned, RoomSpec, UserResponse, WhoAmIResponse,
};
