//! These models represent the objects passed between the pipeline stages
//!
//! There are a few related formats we need to interact with:
//! - openai chat messages/tools, sent from a role to the generation backend
//! - the search service's answer and citations, returned to the research role as text
//! - output events, streamed from the final stage to whoever renders the post
//!
//! We always immediately convert those wire formats into the internal structs
//! using to/from helpers, so the internal models are not an exact match to any of them.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
