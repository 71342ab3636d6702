use std::io::Write;

use anyhow::Result;

use crate::framebuffer::{Frame, SCREEN_WIDTH};

// move the cursor home so each frame paints over the last one
const CURSOR_HOME: &str = "\x1b[H";

/// Text renderer for the display, writing to any terminal-like sink.
pub(super) struct Hardware<W: Write> {
    out: W,
}

impl<W: Write> Hardware<W> {
    pub(super) fn new(out: W) -> Self {
        Self { out }
    }

    pub(super) fn refresh_graphics(&mut self, frame: &Frame) -> Result<()> {
        let border = "─".repeat(usize::from(SCREEN_WIDTH));

        write!(self.out, "{CURSOR_HOME}┌{border}┐\r\n")?;
        for line in frame.to_string().lines() {
            write!(self.out, "│{line}│\r\n")?;
        }
        write!(self.out, "└{border}┘\r\n")?;
        self.out.flush()?;

        Ok(())
    }

    #[cfg(test)]
    pub(super) fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::FrameBuffer;

    #[test]
    fn test_refresh_draws_bordered_grid() -> Result<()> {
        let fb = FrameBuffer::new();
        fb.draw(&[0b1000_0001], 0, 0);

        let mut hardware = Hardware::new(Vec::new());
        hardware.refresh_graphics(&fb.snapshot())?;
        let text = String::from_utf8(hardware.into_inner())?;

        let lines: Vec<&str> = text.split("\r\n").collect();
        // top border, 32 rows, bottom border, trailing empty
        assert_eq!(lines.len(), 35);
        assert!(lines[0].starts_with(CURSOR_HOME));
        assert!(lines[1].starts_with("│█      █ "));
        assert_eq!(lines[2].chars().count(), usize::from(SCREEN_WIDTH) + 2);
        Ok(())
    }
}
