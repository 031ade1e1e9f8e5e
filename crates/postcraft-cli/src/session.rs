use anyhow::{anyhow, Result};
use bat::WrappingMode;
use cliclack::{input, spinner};
use console::{style, Term};
use postcraft::consumer::{Renderer, StreamConsumer};
use postcraft::pipeline::Pipeline;
use std::io::Stdout;

use crate::renderer::TerminalRenderer;

enum Input {
    Topic(String),
    Clear,
    Help,
    Exit,
}

fn get_input() -> Result<Input> {
    let text: String = input("What should the post be about?")
        .placeholder("e.g. electric vehicles")
        .interact()?;
    let text = text.trim();

    Ok(match text.to_ascii_lowercase().as_str() {
        "/exit" | "/quit" => Input::Exit,
        "/clear" => Input::Clear,
        "/?" | "/help" => Input::Help,
        _ => Input::Topic(text.to_string()),
    })
}

fn print_markdown(content: &str) -> Result<()> {
    bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()))
        .theme("zenburn")
        .language("Markdown")
        .wrapping_mode(WrappingMode::Character)
        .print()
        .map_err(|e| anyhow!("Failed to render post: {}", e))?;
    Ok(())
}

/// One terminal user generating posts until they exit
pub struct Session {
    pipeline: Pipeline,
    pretty: bool,
    renderer: TerminalRenderer<Stdout>,
    last_post: Option<String>,
}

impl Session {
    pub fn new(pipeline: Pipeline, pretty: bool) -> Self {
        Self {
            pipeline,
            pretty,
            renderer: TerminalRenderer::stdout(),
            last_post: None,
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        cliclack::intro(style(" postcraft ").on_cyan().black())?;
        cliclack::log::remark("Enter a topic to write a post about. /clear resets, /exit quits.")?;

        loop {
            match get_input()? {
                Input::Exit => break,
                Input::Clear => self.clear()?,
                Input::Help => {
                    println!("Commands:");
                    println!("/clear - Discard the topic and post");
                    println!("/exit - Exit the session");
                    println!("/? - Display this help message");
                }
                Input::Topic(topic) if topic.is_empty() => {
                    cliclack::log::warning("Please enter a topic")?;
                }
                Input::Topic(topic) => {
                    if let Err(e) = self.generate(&topic).await {
                        cliclack::log::error(format!("Post generation failed: {}", e))?;
                    }
                }
            }
        }

        cliclack::outro("Done")?;
        Ok(())
    }

    pub async fn headless_start(&mut self, topic: &str) -> Result<()> {
        self.generate(topic).await?;
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        let had_post = self.last_post.take().is_some();
        self.renderer.reset();
        Term::stdout().clear_screen()?;
        if had_post {
            cliclack::log::remark("Cleared the last post")?;
        }
        Ok(())
    }

    async fn generate(&mut self, topic: &str) -> Result<()> {
        let spin = spinner();
        spin.start("Researching and planning your post...");
        let events = match self.pipeline.run(topic).await {
            Ok(events) => events,
            Err(e) => {
                spin.error("Could not prepare the post");
                return Err(e);
            }
        };
        spin.stop("Research and strategy complete");

        if self.pipeline.degraded_searches() > 0 {
            cliclack::log::warning(
                "Web search was unavailable, so the post is based on limited research",
            )?;
        }

        let post = if self.pretty {
            let writing = spinner();
            writing.start("Writing post...");
            let result = StreamConsumer::new(|text: &str, _: bool| {
                writing.set_message(format!("Writing post... ({} characters)", text.chars().count()))
            })
            .consume(events)
            .await;

            match result {
                Ok(post) => {
                    writing.stop("Post ready");
                    print_markdown(&post)?;
                    post
                }
                Err(e) => {
                    writing.error("Writing failed");
                    return Err(e);
                }
            }
        } else {
            self.renderer.reset();
            let renderer = &mut self.renderer;
            StreamConsumer::new(|text: &str, in_progress: bool| renderer.render(text, in_progress))
                .consume(events)
                .await?
        };

        self.last_post = Some(post);
        Ok(())
    }
}
