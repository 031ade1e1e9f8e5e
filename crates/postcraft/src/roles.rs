//! The three roles a post is built by. Their instructions are templates under
//! `src/prompts`, rendered against the current year when the role is built.

use anyhow::Result;
use chrono::{Datelike, Utc};
use serde::Serialize;

use crate::agent::Agent;
use crate::prompt_template::load_prompt_file;
use crate::systems::SearchSystem;

pub const DEFAULT_MODEL: &str = "gpt-4o";

pub const RESEARCH_SPECIALIST: &str = "Research Specialist";
pub const CONTENT_STRATEGIST: &str = "Content Strategist";
pub const POST_WRITER: &str = "Post Writer";

#[derive(Serialize)]
struct PromptContext {
    year: i32,
}

fn instructions(template: &str) -> Result<String> {
    let context = PromptContext {
        year: Utc::now().year(),
    };
    Ok(load_prompt_file(template, &context)?)
}

/// Gathers current information on a topic; the only role with a tool
pub fn research_specialist(model: &str, search: SearchSystem) -> Result<Agent> {
    Ok(Agent::new(RESEARCH_SPECIALIST, instructions("research.md")?, model)
        .with_system(Box::new(search)))
}

/// Turns research into a structured narrative
pub fn content_strategist(model: &str) -> Result<Agent> {
    Ok(Agent::new(
        CONTENT_STRATEGIST,
        instructions("strategist.md")?,
        model,
    ))
}

pub fn post_writer(model: &str) -> Result<Agent> {
    Ok(Agent::new(POST_WRITER, instructions("writer.md")?, model))
}
