//! Interactive chat UI.
//!
//! The [`App`] holds everything the user sees: the current transcript, the
//! archive of earlier transcripts, and the latest pitch and rating. Model
//! calls run in [`crate::worker`]; the app only queues requests in its outbox
//! and applies replies, so its state changes can be tested without a
//! terminal.

use std::sync::Arc;

use anyhow::{Context, Result};
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use pitchbot_core::{
    CancellationToken, ChatConfig, Engine, Message, PitchResult, RatingResult, Sender, Transcript,
};
use ratatui::DefaultTerminal;
use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::output::{pitch_lines, rating_lines};
use crate::worker::{self, WorkerReply, WorkerRequest};

const CHANNEL_CAPACITY: usize = 16;
const MAX_STATUS_LINES: usize = 10;

const HELP: &str = "Commands:
  /pitch <idea>   archive this chat and pitch a new idea
  /rate           rate the current pitch
  /history        list archived conversations
  /resume <n>     continue archived conversation n
  /reset          start a new conversation
  /quit           leave (also Ctrl-C)
Esc cancels a pending request; PageUp/PageDown scroll the chat.";

/// Run the chat UI until the user quits.
///
/// # Errors
///
/// Returns an error if the terminal fails or the worker task stops early.
pub async fn run_chat(engine: Engine, idea: Option<String>, location: Option<String>) -> Result<()> {
    let engine = Arc::new(engine);
    let (request_tx, request_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (reply_tx, reply_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let worker = tokio::spawn(worker::run(Arc::clone(&engine), request_rx, reply_tx));

    let mut app = App::new(engine.chat_config().clone(), location);
    if let Some(idea) = idea {
        app.start_pitch(idea);
    }

    let mut terminal = ratatui::init();
    let result = app.run(&mut terminal, &request_tx, reply_rx).await;
    ratatui::restore();

    app.shutdown();
    drop(request_tx);
    worker.await.context("chat worker panicked")?;
    info!(archived = app.archive.len(), "chat finished");
    result
}

/// A parsed slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Pitch(String),
    Rate,
    History,
    Resume(usize),
    Reset,
    Help,
    Quit,
}

impl Command {
    /// Parse a line starting with `/`. Archive numbers are 1-based.
    fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (name, arg) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let arg = arg.trim();
        match name {
            "/pitch" if arg.is_empty() => Err("Usage: /pitch <idea>".to_owned()),
            "/pitch" => Ok(Self::Pitch(arg.to_owned())),
            "/rate" => Ok(Self::Rate),
            "/history" => Ok(Self::History),
            "/resume" => match arg.parse::<usize>() {
                Ok(n) if n > 0 => Ok(Self::Resume(n)),
                _ => Err("Usage: /resume <n>, see /history for numbers".to_owned()),
            },
            "/reset" => Ok(Self::Reset),
            "/help" => Ok(Self::Help),
            "/quit" | "/exit" => Ok(Self::Quit),
            other => Err(format!("Unknown command {other}. Type /help for commands.")),
        }
    }
}

/// Main TUI application state.
pub struct App {
    running: bool,
    chat: ChatConfig,
    location: Option<String>,
    idea: Option<String>,
    pitch: Option<PitchResult>,
    rating: Option<RatingResult>,
    transcript: Transcript,
    archive: Vec<Transcript>,
    input: String,
    status: Option<String>,
    /// Lines scrolled up from the bottom of the chat.
    scroll_back: u16,
    /// Cancels every request on shutdown; each request gets a child token.
    root_cancel: CancellationToken,
    in_flight: Option<CancellationToken>,
    outbox: Vec<WorkerRequest>,
}

impl App {
    pub fn new(chat: ChatConfig, location: Option<String>) -> Self {
        let transcript = Transcript::with_greeting(chat.greeting.as_str());
        Self {
            running: true,
            location: location.filter(|l| !l.trim().is_empty()),
            chat,
            idea: None,
            pitch: None,
            rating: None,
            transcript,
            archive: Vec::new(),
            input: String::new(),
            status: None,
            scroll_back: 0,
            root_cancel: CancellationToken::new(),
            in_flight: None,
            outbox: Vec::new(),
        }
    }

    /// Run the TUI event loop.
    async fn run(
        &mut self,
        terminal: &mut DefaultTerminal,
        requests: &mpsc::Sender<WorkerRequest>,
        mut replies: mpsc::Receiver<WorkerReply>,
    ) -> Result<()> {
        let mut events = EventStream::new();
        while self.running {
            for request in self.outbox.drain(..) {
                requests
                    .send(request)
                    .await
                    .context("chat worker stopped unexpectedly")?;
            }
            terminal.draw(|frame| self.draw(frame))?;

            tokio::select! {
                event = events.next() => match event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => self.on_key(key),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e).context("failed to read terminal event"),
                    None => self.running = false,
                },
                Some(reply) = replies.recv() => self.on_reply(reply),
            }
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        self.running = false;
        self.root_cancel.cancel();
    }

    fn busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Child token for a new model call, marking the app busy.
    fn begin_request(&mut self) -> CancellationToken {
        let token = self.root_cancel.child_token();
        self.in_flight = Some(token.clone());
        token
    }

    fn on_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.shutdown();
            }
            KeyCode::Char(c) => self.input.push(c),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Enter => {
                let line = std::mem::take(&mut self.input);
                self.submit(line);
            }
            KeyCode::Esc => self.cancel_in_flight(),
            KeyCode::PageUp => self.scroll_back = self.scroll_back.saturating_add(5),
            KeyCode::PageDown => self.scroll_back = self.scroll_back.saturating_sub(5),
            _ => {}
        }
    }

    fn cancel_in_flight(&mut self) {
        if let Some(token) = &self.in_flight {
            token.cancel();
            self.status = Some("Cancelling…".to_owned());
        }
    }

    /// Handle one line of input. Input typed while a request is pending is
    /// put back so nothing is lost.
    fn submit(&mut self, line: String) {
        let text = line.trim();
        if text.is_empty() {
            return;
        }
        if text.starts_with('/') {
            match Command::parse(text) {
                Ok(command) => self.execute(command, line),
                Err(message) => self.status = Some(message),
            }
            return;
        }
        if self.busy() {
            self.input = line;
            self.status = Some("Still waiting for the previous reply (Esc to cancel).".to_owned());
            return;
        }

        let text = text.to_owned();
        self.transcript.push(Message::user(text.as_str()));
        let cancel = self.begin_request();
        self.outbox.push(WorkerRequest::Chat { text, cancel });
        self.scroll_back = 0;
        self.status = None;
    }

    fn execute(&mut self, command: Command, line: String) {
        let needs_model = matches!(
            command,
            Command::Pitch(_) | Command::Rate | Command::Resume(_) | Command::Reset
        );
        if needs_model && self.busy() {
            self.input = line;
            self.status = Some("Still waiting for the previous reply (Esc to cancel).".to_owned());
            return;
        }

        match command {
            Command::Pitch(idea) => self.start_pitch(idea),
            Command::Rate => self.start_rating(),
            Command::History => self.status = Some(self.history_listing()),
            Command::Resume(n) => self.resume(n),
            Command::Reset => {
                self.archive_current();
                self.transcript = Transcript::with_greeting(self.chat.greeting.as_str());
                self.outbox.push(WorkerRequest::Reset);
                self.status = Some("Started a new conversation.".to_owned());
            }
            Command::Help => self.status = Some(HELP.to_owned()),
            Command::Quit => self.shutdown(),
        }
    }

    /// Archive the chat, clear the session and generate a pitch for `idea`.
    fn start_pitch(&mut self, idea: String) {
        self.archive_current();
        self.transcript = Transcript::with_greeting(self.chat.greeting.as_str());
        self.pitch = None;
        self.rating = None;
        self.scroll_back = 0;

        self.outbox.push(WorkerRequest::Reset);
        let cancel = self.begin_request();
        self.outbox.push(WorkerRequest::Pitch {
            idea: idea.clone(),
            location: self.location.clone(),
            cancel,
        });
        self.idea = Some(idea);
        self.status = Some("Generating pitch…".to_owned());
    }

    fn start_rating(&mut self) {
        let (Some(idea), Some(pitch)) = (self.idea.clone(), self.pitch.clone()) else {
            self.status = Some("No pitch to rate yet. Use /pitch <idea> first.".to_owned());
            return;
        };
        let cancel = self.begin_request();
        self.outbox.push(WorkerRequest::Rate {
            idea,
            pitch: Box::new(pitch),
            cancel,
        });
        self.status = Some("Rating idea…".to_owned());
    }

    fn resume(&mut self, n: usize) {
        let Some(selected) = self.archive.get(n - 1).cloned() else {
            self.status = Some(format!(
                "No conversation {n}; there are {} archived.",
                self.archive.len()
            ));
            return;
        };
        self.archive_current();
        self.transcript = selected.clone();
        self.outbox.push(WorkerRequest::Resume(selected));
        self.scroll_back = 0;
        self.status = Some(format!("Resumed conversation {n}."));
        debug!(n, messages = self.transcript.len(), "resuming archived conversation");
    }

    /// Keep the current transcript if anything beyond the greeting was said
    /// and an identical copy isn't archived already.
    fn archive_current(&mut self) {
        if self.transcript.has_conversation() && !self.archive.contains(&self.transcript) {
            self.archive.push(self.transcript.clone());
        }
    }

    fn history_listing(&self) -> String {
        if self.archive.is_empty() {
            return "No archived conversations yet.".to_owned();
        }
        let mut lines = vec!["Archived conversations (/resume <n>):".to_owned()];
        lines.extend(self.archive.iter().enumerate().map(|(i, t)| {
            format!(
                "  {}. {} ({} messages)",
                i + 1,
                t.title().unwrap_or("untitled"),
                t.len()
            )
        }));
        lines.join("\n")
    }

    fn on_reply(&mut self, reply: WorkerReply) {
        self.in_flight = None;
        match reply {
            WorkerReply::Chat(Ok(text)) => {
                self.transcript.push(Message::assistant(text));
                self.status = None;
            }
            WorkerReply::Chat(Err(e)) if e.is_cancelled() => {
                self.status = Some("Cancelled.".to_owned());
            }
            WorkerReply::Chat(Err(e)) => {
                // Shown to the user only; the session never sees it.
                self.transcript
                    .push(Message::assistant(self.chat.fallback_reply.as_str()));
                self.status = Some(format!("Error: {e}"));
            }
            WorkerReply::Pitch(Ok(pitch)) => {
                self.pitch = Some(pitch);
                self.status =
                    Some("Pitch ready. Type /rate to score it, or ask me about it.".to_owned());
            }
            WorkerReply::Pitch(Err(e)) => self.status = Some(format!("Error: {e}")),
            WorkerReply::Rating(Ok(rating)) => {
                self.rating = Some(rating);
                self.status = None;
            }
            WorkerReply::Rating(Err(e)) => self.status = Some(format!("Error: {e}")),
        }
        self.scroll_back = 0;
    }

    // ── Rendering ────────────────────────────────────────────

    fn draw(&self, frame: &mut Frame) {
        let status_lines = self
            .status
            .as_deref()
            .map_or(1, |s| s.lines().count().clamp(1, MAX_STATUS_LINES));
        let [main, status, input] = Layout::vertical([
            Constraint::Min(3),
            Constraint::Length(status_lines as u16),
            Constraint::Length(3),
        ])
        .areas(frame.area());

        if self.pitch.is_some() || self.rating.is_some() {
            let [pitch_area, chat_area] =
                Layout::horizontal([Constraint::Percentage(45), Constraint::Percentage(55)])
                    .areas(main);
            self.draw_pitch(frame, pitch_area);
            self.draw_chat(frame, chat_area);
        } else {
            self.draw_chat(frame, main);
        }

        let status_text = self.status.as_deref().unwrap_or_default();
        frame.render_widget(
            Paragraph::new(status_text).style(Style::default().fg(Color::Yellow)),
            status,
        );
        self.draw_input(frame, input);
    }

    fn draw_pitch(&self, frame: &mut Frame, area: Rect) {
        let mut lines: Vec<Line> = Vec::new();
        if let Some(pitch) = &self.pitch {
            lines.extend(pitch_lines(pitch).into_iter().map(Line::from));
        }
        if let Some(rating) = &self.rating {
            lines.push(Line::default());
            lines.extend(rating_lines(rating).into_iter().map(Line::from));
        }
        let title = match &self.idea {
            Some(idea) => format!(" Pitch: {idea} "),
            None => " Pitch ".to_owned(),
        };
        frame.render_widget(
            Paragraph::new(lines)
                .block(Block::default().borders(Borders::ALL).title(title))
                .wrap(Wrap { trim: false }),
            area,
        );
    }

    fn draw_chat(&self, frame: &mut Frame, area: Rect) {
        let mut lines: Vec<Line> = Vec::new();
        for message in self.transcript.messages() {
            let (label, color) = match message.sender {
                Sender::User => ("You".to_owned(), Color::Cyan),
                Sender::Assistant => (self.chat.assistant_name.clone(), Color::Green),
            };
            let label_style = Style::default().fg(color).add_modifier(Modifier::BOLD);
            let mut text_lines = message.text.lines();
            lines.push(Line::from(vec![
                Span::styled(format!("{label}: "), label_style),
                Span::raw(text_lines.next().unwrap_or_default().to_owned()),
            ]));
            lines.extend(text_lines.map(|l| Line::from(l.to_owned())));
            lines.push(Line::default());
        }
        if self.busy() && self.status.is_none() {
            lines.push(Line::styled(
                format!("{} is typing…", self.chat.assistant_name),
                Style::default().add_modifier(Modifier::ITALIC | Modifier::DIM),
            ));
        }

        let inner_width = area.width.saturating_sub(2).max(1) as usize;
        let inner_height = area.height.saturating_sub(2) as usize;
        let total: usize = lines
            .iter()
            .map(|l| l.width().div_ceil(inner_width).max(1))
            .sum();
        let bottom = total.saturating_sub(inner_height);
        let offset = bottom.saturating_sub(self.scroll_back as usize);

        frame.render_widget(
            Paragraph::new(lines)
                .block(Block::default().borders(Borders::ALL).title(" Chat "))
                .wrap(Wrap { trim: false })
                .scroll((u16::try_from(offset).unwrap_or(u16::MAX), 0)),
            area,
        );
    }

    fn draw_input(&self, frame: &mut Frame, area: Rect) {
        frame.render_widget(
            Paragraph::new(self.input.as_str()).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" Message (/help for commands) "),
            ),
            area,
        );
        let typed = u16::try_from(self.input.chars().count()).unwrap_or(u16::MAX);
        let x = area
            .x
            .saturating_add(1)
            .saturating_add(typed)
            .min(area.right().saturating_sub(2));
        frame.set_cursor_position((x, area.y + 1));
    }
}
