//! XML parsing and writing.

pub mod engine;
pub mod queue;
pub mod writer;

pub use engine::{AbortHandle, ParseListener, ParseOutcome, ParsePass, StreamingParseEngine};
pub use queue::ParseQueue;
pub use writer::to_xml;
