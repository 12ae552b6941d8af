//! Test Helpers Module
//!
//! Shared doubles and fixtures for unit and integration tests: an in-memory
//! shadow connection that records every call, and the reference pod session.

pub mod fixtures;
pub mod mock_connection;

pub use fixtures::{fake_pod_session, fake_pod_shadow, flatten, POD_PART_TYPES};
pub use mock_connection::{MockShadowConnection, RecordedCall};
