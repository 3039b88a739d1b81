#![cfg(feature = "tui")]

use crate::app;
use crate::chat::{ChatClient, Completion};
use crate::provider::ChatSettings;
use anyhow::Context;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Terminal;
use std::io;
use tokio::sync::mpsc;

/// The bubble only ever shows the tail of a long reply.
const MAX_BUBBLE_CHARS: usize = 5000;

#[derive(Debug)]
enum StreamMsg {
    Chunk(String),
    Done(Completion),
}

/// Messages are tagged with the turn that produced them.
type Tagged = (u64, StreamMsg);

#[derive(Debug, Default)]
struct Bubble {
    question: String,
    reply: String,
    status: Option<String>,
    thinking: bool,
    turn: u64,
}

impl Bubble {
    fn start(&mut self, question: String) -> u64 {
        self.turn += 1;
        self.question = question;
        self.reply.clear();
        self.status = None;
        self.thinking = true;
        self.turn
    }

    fn apply(&mut self, turn: u64, msg: StreamMsg) {
        if turn != self.turn {
            // A superseded turn closing out.
            return;
        }
        match msg {
            StreamMsg::Chunk(t) => {
                self.reply.push_str(&t);
                cap_to_tail(&mut self.reply, MAX_BUBBLE_CHARS);
            }
            StreamMsg::Done(completion) => {
                self.thinking = false;
                self.status = match completion {
                    Completion::Finished => None,
                    Completion::Cancelled => Some("(stopped)".to_string()),
                    Completion::Failed(e) => Some(format!("error: {e}")),
                };
            }
        }
    }
}

fn cap_to_tail(s: &mut String, max_chars: usize) {
    let count = s.chars().count();
    if count > max_chars {
        let cut = s.char_indices().nth(count - max_chars).map(|(i, _)| i).unwrap_or(0);
        s.drain(..cut);
    }
}

pub async fn run_tui(mut settings: ChatSettings) -> anyhow::Result<()> {
    app::ensure_valid(&settings)?;
    let client = ChatClient::new(app::http_client()?);

    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("enter alt screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let (ev_tx, mut ev_rx) = mpsc::unbounded_channel::<Event>();
    std::thread::spawn(move || {
        while let Ok(ev) = crossterm::event::read() {
            if ev_tx.send(ev).is_err() {
                break;
            }
        }
    });

    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel::<Tagged>();
    let mut input = String::new();
    let mut bubble = Bubble {
        status: Some("Type a message and press Enter. Esc stops a reply. Commands: /quit, /clear, /model <name>".to_string()),
        ..Bubble::default()
    };

    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(33));

    let res = loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = draw(&mut terminal, &settings, &bubble, &input) {
                    break Err(e);
                }
            }
            Some(ev) = ev_rx.recv() => {
                if let Event::Key(key) = ev {
                    if handle_key(key, &mut input, &mut bubble, &mut settings, &client, &msg_tx) {
                        break Ok(());
                    }
                }
            }
            Some((turn, msg)) = msg_rx.recv() => {
                bubble.apply(turn, msg);
            }
        }
    };

    client.cancel();
    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    res
}

/// Returns true when the panel should close.
fn handle_key(
    key: KeyEvent,
    input: &mut String,
    bubble: &mut Bubble,
    settings: &mut ChatSettings,
    client: &ChatClient,
    msg_tx: &mpsc::UnboundedSender<Tagged>,
) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return true;
    }

    match key.code {
        KeyCode::Esc => {
            if !client.is_active() {
                return true;
            }
            client.cancel();
        }
        KeyCode::Char(c) => input.push(c),
        KeyCode::Backspace => {
            input.pop();
        }
        KeyCode::Enter => {
            let msg = input.trim().to_string();
            input.clear();
            if msg.is_empty() {
                return false;
            }

            if msg == "/quit" {
                return true;
            }
            if msg == "/clear" {
                client.cancel();
                *bubble = Bubble {
                    turn: bubble.turn,
                    ..Bubble::default()
                };
                return false;
            }
            if let Some(rest) = msg.strip_prefix("/model ") {
                settings.model = rest.trim().to_string();
                bubble.status = Some(format!("model set to: {}", settings.model));
                return false;
            }

            let turn = bubble.start(msg.clone());
            let chunk_tx = msg_tx.clone();
            let done_tx = msg_tx.clone();

            // Any reply still streaming is superseded here.
            client.send_message(
                settings,
                &msg,
                move |text| {
                    let _ = chunk_tx.send((turn, StreamMsg::Chunk(text.to_string())));
                },
                move |completion| {
                    let _ = done_tx.send((turn, StreamMsg::Done(completion)));
                },
            );
        }
        _ => {}
    }

    false
}

fn draw(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    settings: &ChatSettings,
    bubble: &Bubble,
    input: &str,
) -> anyhow::Result<()> {
    terminal.draw(|f| {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(3)])
            .split(f.area());

        let mut text = Text::default();
        if !bubble.question.is_empty() {
            text.lines
                .push(Line::styled(format!("> {}", bubble.question), Style::default().add_modifier(Modifier::BOLD)));
            text.lines.push(Line::from(""));
        }
        text.lines.extend(Text::from(bubble.reply.clone()).lines);
        if bubble.thinking && bubble.reply.is_empty() {
            text.lines.push(Line::from("…"));
        }
        if let Some(status) = &bubble.status {
            text.lines.push(Line::from(""));
            text.lines
                .push(Line::styled(status.clone(), Style::default().add_modifier(Modifier::ITALIC)));
        }

        let title = format!(
            "pet-chat: {} / {}{}",
            settings.provider,
            settings.model,
            if bubble.thinking { " (thinking)" } else { "" }
        );
        let chat = Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL).title(title))
            .wrap(Wrap { trim: false });

        let input_w = Paragraph::new(input.to_string())
            .block(Block::default().borders(Borders::ALL).title("say something"));

        f.render_widget(chat, chunks[0]);
        f.render_widget(input_w, chunks[1]);

        let x = chunks[1].x + 1 + input.chars().count() as u16;
        let y = chunks[1].y + 1;
        f.set_cursor_position((x.min(chunks[1].x + chunks[1].width.saturating_sub(2)), y));
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_reply_to_its_tail() {
        let mut s = "ab你好".repeat(2);
        cap_to_tail(&mut s, 3);
        assert_eq!(s, "b你好");

        let mut short = "hi".to_string();
        cap_to_tail(&mut short, 3);
        assert_eq!(short, "hi");
    }

    #[test]
    fn stale_turns_are_ignored() {
        let mut bubble = Bubble::default();
        let first = bubble.start("one".into());
        let second = bubble.start("two".into());

        bubble.apply(first, StreamMsg::Done(Completion::Cancelled));
        assert!(bubble.thinking);

        bubble.apply(second, StreamMsg::Chunk("hi".into()));
        bubble.apply(second, StreamMsg::Done(Completion::Finished));
        assert_eq!(bubble.reply, "hi");
        assert!(!bubble.thinking);
        assert!(bubble.status.is_none());
    }
}
