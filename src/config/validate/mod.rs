//! Configuration validation
//!
//! Validates sweep parameters for correctness before any corpus or device
//! work begins.

mod error;
mod validator;

#[cfg(test)]
mod proptests;

pub use error::ValidationError;
pub use validator::validate_params;
