//! Command Implementations

pub mod estimate;
pub mod generate;
pub mod init;
pub mod resume;
pub mod status;
