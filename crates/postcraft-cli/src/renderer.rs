use std::io::{self, Write};

use postcraft::consumer::{display_text, Renderer};

// Steps back over the one-column typing marker and blanks it
const ERASE_MARKER: &str = "\u{8} \u{8}";

/// Writes a post to the terminal as it grows, printing only what is new
pub struct TerminalRenderer<W: Write> {
    out: W,
    printed: usize,
    marker_shown: bool,
}

impl TerminalRenderer<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            printed: 0,
            marker_shown: false,
        }
    }

    /// Forget the previous post so the next one prints from the start
    pub fn reset(&mut self) {
        self.printed = 0;
        self.marker_shown = false;
    }

    fn draw(&mut self, text: &str, in_progress: bool) -> io::Result<()> {
        if self.marker_shown {
            self.out.write_all(ERASE_MARKER.as_bytes())?;
            self.marker_shown = false;
        }

        let new = text.get(self.printed..).unwrap_or_default();
        self.out.write_all(display_text(new, in_progress).as_bytes())?;
        self.printed = text.len();
        self.marker_shown = in_progress;

        if !in_progress {
            writeln!(self.out)?;
        }
        self.out.flush()
    }
}

impl<W: Write> Renderer for TerminalRenderer<W> {
    fn render(&mut self, text: &str, in_progress: bool) {
        if let Err(e) = self.draw(text, in_progress) {
            tracing::warn!("failed to write post to terminal: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(renderer: TerminalRenderer<Vec<u8>>) -> String {
        String::from_utf8(renderer.out).unwrap()
    }

    #[test]
    fn test_prints_only_new_text() {
        let mut renderer = TerminalRenderer::new(Vec::new());
        renderer.render("Hello ", true);
        renderer.render("Hello world", true);
        renderer.render("Hello world", false);

        assert_eq!(
            output(renderer),
            "Hello ▌\u{8} \u{8}world▌\u{8} \u{8}\n"
        );
    }

    #[test]
    fn test_reset_starts_a_new_post() {
        let mut renderer = TerminalRenderer::new(Vec::new());
        renderer.render("First", false);
        renderer.reset();
        renderer.render("Second", false);

        assert_eq!(output(renderer), "First\nSecond\n");
    }
}
