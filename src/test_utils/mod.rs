//! Helpers for tests against a simulated telescope.

#[cfg(test)]
mod logging_env;

mod mock_origin;
pub use mock_origin::MockOrigin;
