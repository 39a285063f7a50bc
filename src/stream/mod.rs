//! Incremental framing and classification of subprocess output
//!
//! The Claude CLI emits one JSON object per line on stdout. Chunks arrive
//! with arbitrary boundaries, so lines are reassembled incrementally and
//! each completed line is classified into a [`StreamRecord`].

pub mod framer;
pub mod record;

pub use framer::LineFramer;
pub use record::{extract_final_text, StreamRecord};
