pub mod blueprint;
pub mod chapter;
pub mod error;
pub mod session;

pub use blueprint::*;
pub use chapter::*;
pub use error::{ErrorCategory, ErrorClassifier, LlmError, NovelError, Result};
pub use session::*;
