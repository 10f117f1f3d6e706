//! Terminal rendering, subscribed to dispatch context changes.
//!
//! ASCII only, no emojis. The renderer never mutates conversation
//! state; it observes the transcript through the subscription
//! interface and prints what changed.

use crate::dispatch::{DispatchContext, StateChange};
use console::Term;
use owo_colors::OwoColorize;
use somm_common::{AgentMessage, MessagePayload, Role};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Renderer {
    /// Lines already printed per streaming message, so updates only
    /// emit what is new
    printed: Mutex<HashMap<Uuid, usize>>,
    /// Messages currently showing the typing indicator; the indicator
    /// line is erased once real content lands
    typing: Mutex<HashSet<Uuid>>,
}

/// Attach a terminal renderer to the context. Call once, before the
/// first dispatch.
pub fn attach(ctx: &DispatchContext) {
    let renderer = Renderer::default();
    ctx.subscribe(Box::new(move |ctx, change| renderer.render(ctx, change)));
}

impl Renderer {
    fn render(&self, ctx: &DispatchContext, change: &StateChange) {
        match change {
            StateChange::MessageAppended(id) | StateChange::MessageUpdated(id) => {
                ctx.with_transcript(|transcript| {
                    if let Some(message) = transcript.messages().iter().find(|m| m.id == *id) {
                        self.print_message(message);
                    }
                });
            }
            StateChange::PhaseChanged(_) | StateChange::FlowStateCleared => {}
        }
    }

    fn print_message(&self, message: &AgentMessage) {
        match (&message.role, &message.payload) {
            (Role::User, MessagePayload::Text { text }) => {
                println!("{} {}", "you:".cyan(), text);
            }
            (_, MessagePayload::Image { caption }) => {
                println!(
                    "{} [label photo]{}",
                    "you:".cyan(),
                    caption
                        .as_deref()
                        .map(|c| format!(" {}", c))
                        .unwrap_or_default()
                );
            }
            (_, MessagePayload::Typing) => {
                println!("{}", "  ...".dimmed());
                self.typing
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .insert(message.id);
            }
            (_, MessagePayload::Text { text }) => self.print_progressive(message.id, text),
            (_, MessagePayload::Chips { prompt, chips, .. }) => {
                println!();
                println!("{}", prompt);
                for (i, chip) in chips.iter().enumerate() {
                    let line = format!("  {}. {}", i + 1, chip.label);
                    if chip.disabled {
                        println!("{}", line.dimmed());
                    } else {
                        println!("{}", line);
                    }
                }
            }
            (_, MessagePayload::Error {
                message: text,
                retryable,
                ..
            }) => {
                eprintln!("{} {}", "[ERROR]".red(), text.red());
                if *retryable {
                    eprintln!("{}", "  (worth retrying)".dimmed());
                }
            }
            (_, MessagePayload::Enrichment { summary }) => {
                println!("{} {}", "[NOTE]".yellow(), summary);
            }
        }
    }

    /// Print only lines not yet shown for this message, so streamed
    /// fields appear one at a time.
    fn print_progressive(&self, id: Uuid, text: &str) {
        if self
            .typing
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&id)
        {
            let _ = Term::stdout().clear_last_lines(1);
        }
        let mut printed = self.printed.lock().unwrap_or_else(|p| p.into_inner());
        let already = printed.entry(id).or_insert(0);
        let lines: Vec<&str> = text.lines().collect();
        for line in lines.iter().skip(*already) {
            if let Some((label, value)) = line.split_once(':') {
                println!("  {}{} {}", label.green(), ":".green(), value.trim());
            } else {
                println!("  {}", line);
            }
        }
        *already = lines.len();
    }
}
