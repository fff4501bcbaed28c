//! Infrastructure Services
//!
//! This module provides the infrastructure the migration steps run on:
//!
//! - **client**: Matrix homeserver client with pacing, throttle retry and login
//! - **source**: read-only Mattermost database access
//! - **tunnel**: SSH port forwarding and remote file access
//! - **archive**: compressed export artifacts
//! - **config**: configuration loading and validation
//! - **errors**: common error types and handling utilities

pub mod archive;
pub mod client;
pub mod config;
pub mod errors;
pub mod source;
pub mod tunnel;
