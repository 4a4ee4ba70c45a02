//! These models represent the objects passed around by the agent
//!
//! There are a few related formats we need to interact with:
//! - the chat request/response bodies exchanged with the HTTP caller
//! - openai messages/tools, sent from the agent to the LLM
//! - gemini contents/function declarations, sent from the agent to the LLM
//! - tool invocations, sent from the agent to the registered tool handlers
//!
//! We always immediately convert those wire formats into the internal structs using
//! to/from helpers in the providers, so the agent loop only ever sees these types.
pub mod message;
pub mod role;
pub mod tool;
