// file: src/security/mod.rs
// version: 2.0.0
// guid: p6q7r8s9-t0u1-2345-6789-012345pqrstu

//! Security module for secret generation and input validation

pub mod password;
pub mod validation;

pub use password::generate_password;
pub use validation::ValidationUtils;
