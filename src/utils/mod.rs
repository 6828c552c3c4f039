// file: src/utils/mod.rs
// version: 2.0.0
// guid: v2w3x4y5-z6a7-8901-2345-678901vwxyza

//! Utility modules for system operations

pub mod command;
pub mod retry;
pub mod system;

pub use command::{Cmd, CommandOutput, CommandRunner, RecordingRunner, SystemRunner};
pub use retry::{execute_with_retry, retry, wait_for_port, wait_for_service};
pub use system::SystemUtils;
