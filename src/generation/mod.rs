//! Chapter Generation
//!
//! Context assembly, prompt construction, and provider call execution
//! for one chapter at a time.

pub mod context;
pub mod executor;
pub mod prompts;

pub use context::{
    ContextAssembler, ContextOptions, ContextSection, GenerationContext, PreviousChapter,
    SectionKind,
};
pub use executor::{GenerationExecutor, GenerationResult};
