pub mod agent;
pub mod consumer;
pub mod errors;
pub mod events;
pub mod models;
pub mod pipeline;
pub mod prompt_template;
pub mod providers;
pub mod roles;
pub mod runner;
pub mod search;
pub mod systems;
