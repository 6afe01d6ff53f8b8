//! Common test utilities and mocks

mod fixtures;
mod mock_provider;

pub use fixtures::*;
pub use mock_provider::{LoggedQuery, MockProvider};
