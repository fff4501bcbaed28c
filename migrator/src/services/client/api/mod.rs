//! Homeserver API operations
//!
//! Functions here take the [`MatrixClient`](super::MatrixClient) as first
//! parameter and go through its paced, throttle-aware `send`.
//! - User provisioning through the Synapse admin API
//! - Room and space creation, invites and hierarchy state events

pub mod rooms;
pub mod users;
