//! Draws ASCII frames in place on a terminal.

use crate::pipeline::SharedFrameBuffer;
use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use crossterm::{execute, queue};
use snapshell_core::{ConnectionState, Frame, is_glyph};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

pub struct TerminalRenderer<W: Write> {
    out: W,
    last_seq: Option<u64>,
    rows_drawn: u16,
    entered: bool,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            last_seq: None,
            rows_drawn: 0,
            entered: false,
        }
    }

    /// Hides the cursor and clears the screen.
    pub fn enter(&mut self) -> io::Result<()> {
        execute!(self.out, Hide, Clear(ClearType::All), MoveTo(0, 0))?;
        self.entered = true;
        Ok(())
    }

    /// Overwrites the display with `frame`. Returns `false` without drawing
    /// when the frame is not newer than the last one drawn, or is a delta.
    pub fn render(&mut self, frame: &Frame) -> io::Result<bool> {
        if self.last_seq.is_some_and(|last| frame.seq <= last) || !frame.is_full() {
            return Ok(false);
        }

        let mut rows = 0u16;
        for (row, line) in frame.rows().enumerate() {
            let row = row as u16;
            queue!(
                self.out,
                MoveTo(0, row),
                Print(printable(line)),
                Clear(ClearType::UntilNewLine)
            )?;
            rows = row + 1;
        }
        self.out.flush()?;

        self.last_seq = Some(frame.seq);
        self.rows_drawn = rows;
        Ok(true)
    }

    /// Moves the cursor below the last frame and shows it again.
    pub fn leave(&mut self) -> io::Result<()> {
        if !self.entered {
            return Ok(());
        }
        self.entered = false;
        execute!(self.out, MoveTo(0, self.rows_drawn), Show, Print("\r\n"))
    }

    pub fn last_seq(&self) -> Option<u64> {
        self.last_seq
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Blanks anything that is not a glyph so cells can never carry escapes.
fn printable(line: &[u8]) -> String {
    line.iter()
        .map(|&b| if is_glyph(b) { b as char } else { ' ' })
        .collect()
}

/// Draws frames from `buffer` until the connection is `Closed`. Sleeps on
/// the buffer's insert notification, the pending gap deadline or
/// `refresh`, whichever comes first. Returns the number of frames drawn.
pub async fn run_render_loop<W: Write>(
    renderer: &mut TerminalRenderer<W>,
    buffer: Arc<SharedFrameBuffer>,
    mut state: watch::Receiver<ConnectionState>,
    refresh: Duration,
) -> io::Result<u64> {
    let mut drawn = 0;

    loop {
        if state.borrow_and_update().is_closed() {
            break;
        }

        let now = Instant::now();
        if let Some(frame) = buffer.take_next(now) {
            if renderer.render(&frame)? {
                drawn += 1;
            }
            continue;
        }

        let wake = match buffer.gap_deadline() {
            Some(gap) => gap.min(now + refresh),
            None => now + refresh,
        };

        tokio::select! {
            _ = buffer.notified() => {}
            _ = sleep_until(wake) => {}
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    debug!("Render loop drew {} frames", drawn);
    Ok(drawn)
}
