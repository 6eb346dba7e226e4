//! Display thread and the handle the event path writes through.

use super::frame::{render_frame, FRAME_HEIGHT};
use super::lines::{condense_thought, DisplayLine};
use super::snapshot::{LiveSnapshot, SharedSnapshot};
use super::{DisplayError, Verbosity};
use crate::progress::ProgressSource;
use chrono::Utc;
use crossterm::tty::IsTty;
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::widgets::{Paragraph, Widget};
use ratatui::{Terminal, TerminalOptions, Viewport};
use std::io::{self, Stdout, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

/// Repaint interval (4 frames per second).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(250);

/// How often the progress source is consulted.
const PROGRESS_REFRESH: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayConfig {
    pub verbosity: Verbosity,
    pub refresh_interval: Duration,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::default(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

/// Where the display writes.
pub enum Surface<B: Backend> {
    /// Inline viewport holding the live frame; lines scroll above it.
    Frame(Terminal<B>),
    /// Plain lines, no frame.
    Lines(Box<dyn Write + Send>),
}

impl Surface<CrosstermBackend<Stdout>> {
    /// The process stdout, framed only when `verbosity` draws a frame and
    /// stdout is a terminal. Redirected output always gets plain lines.
    pub fn stdout(verbosity: Verbosity) -> io::Result<Self> {
        if verbosity.shows_frame() && io::stdout().is_tty() {
            let terminal = Terminal::with_options(
                CrosstermBackend::new(io::stdout()),
                TerminalOptions {
                    viewport: Viewport::Inline(FRAME_HEIGHT),
                },
            )?;
            Ok(Surface::Frame(terminal))
        } else {
            Ok(Surface::Lines(Box::new(io::stdout())))
        }
    }
}

impl<B: Backend> Surface<B> {
    fn emit(&mut self, line: &DisplayLine) -> io::Result<()> {
        match self {
            Surface::Frame(terminal) => terminal.insert_before(1, |buf| {
                Paragraph::new(line.to_line()).render(buf.area, buf);
            }),
            Surface::Lines(out) => {
                writeln!(out, "{}", line.to_plain())?;
                out.flush()
            }
        }
    }

    fn paint(&mut self, shared: &SharedSnapshot, progress: (u32, u32)) -> io::Result<()> {
        let Surface::Frame(terminal) = self else {
            return Ok(());
        };
        let snapshot = read_snapshot(shared);
        let frame = render_frame(&snapshot, Utc::now(), progress);
        terminal.draw(|f| f.render_widget(&frame, f.area()))?;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        match self {
            Surface::Frame(terminal) => terminal.show_cursor(),
            Surface::Lines(out) => out.flush(),
        }
    }
}

fn read_snapshot(shared: &SharedSnapshot) -> LiveSnapshot {
    match shared.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Write side of the display, held by the event path.
///
/// Every method is fire-and-forget: once the display thread is gone, lines
/// are dropped and snapshot updates go nowhere.
#[derive(Debug, Clone)]
pub struct DisplayFeed {
    shared: SharedSnapshot,
    tx: Sender<DisplayLine>,
    verbosity: Verbosity,
}

impl DisplayFeed {
    /// A feed plus the receiving end of its line channel.
    pub fn channel(verbosity: Verbosity) -> (Self, Receiver<DisplayLine>) {
        let (tx, rx) = mpsc::channel();
        let feed = Self {
            shared: LiveSnapshot::shared(),
            tx,
            verbosity,
        };
        (feed, rx)
    }

    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> LiveSnapshot {
        read_snapshot(&self.shared)
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Mutate the shared snapshot.
    pub fn update(&self, f: impl FnOnce(&mut LiveSnapshot)) {
        let mut guard = match self.shared.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard);
    }

    /// Queue `line` if the verbosity shows it.
    pub fn print(&self, line: DisplayLine) {
        if line.visible_at(self.verbosity) {
            // A closed channel means the display has shut down.
            let _ = self.tx.send(line);
        }
    }

    /// Record agent narrative: full text in verbose mode, condensed otherwise.
    pub fn thought(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.update(|s| s.last_thought = Some(text.to_string()));
        let shown = match self.verbosity {
            Verbosity::Verbose => text.to_string(),
            _ => condense_thought(text),
        };
        self.print(DisplayLine::Thought(shown));
    }

    pub fn phase(&self, text: impl Into<String>) {
        self.print(DisplayLine::Phase(text.into()));
    }

    pub fn error(&self, text: impl Into<String>) {
        self.print(DisplayLine::Error(text.into()));
    }
}

/// Handle to the running display thread.
pub struct LiveDisplay<B: Backend> {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Result<Surface<B>, DisplayError>>,
}

impl<B: Backend + Send + 'static> LiveDisplay<B> {
    /// Start repainting `surface` on a background thread.
    pub fn spawn(
        surface: Surface<B>,
        progress: Arc<dyn ProgressSource>,
        config: DisplayConfig,
    ) -> (Self, DisplayFeed) {
        let (feed, rx) = DisplayFeed::channel(config.verbosity);
        let stop = Arc::new(AtomicBool::new(false));

        let thread_shared = Arc::clone(&feed.shared);
        let thread_stop = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            run(surface, &thread_shared, &rx, progress.as_ref(), config, &thread_stop)
        });
        (Self { stop, handle }, feed)
    }

    /// Flush queued lines, paint a last frame, and hand the surface back.
    pub fn shutdown(self) -> Result<Surface<B>, DisplayError> {
        self.stop.store(true, Ordering::SeqCst);
        self.handle
            .join()
            .map_err(|_| DisplayError::ThreadPanicked)?
    }
}

fn run<B: Backend>(
    mut surface: Surface<B>,
    shared: &SharedSnapshot,
    rx: &Receiver<DisplayLine>,
    progress: &dyn ProgressSource,
    config: DisplayConfig,
    stop: &AtomicBool,
) -> Result<Surface<B>, DisplayError> {
    let mut counts = progress.lookup();
    let mut looked_up = Instant::now();

    loop {
        let mut disconnected = false;
        match rx.recv_timeout(config.refresh_interval) {
            Ok(line) => {
                surface.emit(&line)?;
                while let Ok(line) = rx.try_recv() {
                    surface.emit(&line)?;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => disconnected = true,
        }

        let stopping = disconnected || stop.load(Ordering::SeqCst);
        if stopping || looked_up.elapsed() >= PROGRESS_REFRESH {
            counts = progress.lookup();
            looked_up = Instant::now();
        }

        if stopping {
            while let Ok(line) = rx.try_recv() {
                surface.emit(&line)?;
            }
            surface.paint(shared, counts)?;
            surface.close()?;
            debug!("Display stopped");
            return Ok(surface);
        }

        surface.paint(shared, counts)?;
    }
}
