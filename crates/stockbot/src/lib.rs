pub mod agent;
pub mod conversation;
pub mod errors;
pub mod executor;
pub mod models;
pub mod prompt_template;
pub mod providers;
pub mod router;
pub mod tools;
