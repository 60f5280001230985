//! Line-oriented stand-in for the chat surface.
//!
//! Every outbound message is printed to stdout; every stdin line is one
//! student or admin action.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use listen_core::model::{AdminId, DeckId, StudentId};
use services::{
    AppServices, DeliveryError, Feedback, FlagOutcome, ImportedDeck, Presentation, Prompt,
    StartOutcome, Transport,
};

pub struct ConsoleTransport;

#[async_trait]
impl Transport for ConsoleTransport {
    async fn deliver_prompt(&self, student: StudentId, prompt: &Prompt) -> Result<(), DeliveryError> {
        match &prompt.hint {
            Some(hint) => println!(
                "[to {student}] deck {} card {}: play {} {} (hint: {hint})",
                prompt.deck_id,
                prompt.card_id,
                prompt.media.kind().as_str(),
                prompt.media.handle()
            ),
            None => println!(
                "[to {student}] deck {} card {}: play {} {}",
                prompt.deck_id,
                prompt.card_id,
                prompt.media.kind().as_str(),
                prompt.media.handle()
            ),
        }
        Ok(())
    }

    async fn deliver_feedback(&self, student: StudentId, feedback: &Feedback) -> Result<(), DeliveryError> {
        let mark = if feedback.verdict.is_correct() { "✓" } else { "✗" };
        println!(
            "[to {student}] {mark} you wrote \"{}\", answer: {}",
            feedback.submitted, feedback.revealed_answer
        );
        Ok(())
    }

    async fn deliver_finished(
        &self,
        student: StudentId,
        deck_id: DeckId,
        has_more: bool,
    ) -> Result<(), DeliveryError> {
        if has_more {
            println!(
                "[to {student}] deck {deck_id}: it's all for today. \
                 Type `more {student} {deck_id}` to study more."
            );
        } else {
            println!("[to {student}] deck {deck_id}: it's all for today.");
        }
        Ok(())
    }

    async fn report_delivery_failure(&self, student: StudentId, deck_id: DeckId, reason: &str) {
        log::error!("student {student} unreachable in deck {deck_id}: {reason}");
    }
}

//
// ─── COMMANDS ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join { student: StudentId, link: String },
    Answer { student: StudentId, deck: DeckId, text: String },
    Bad { student: StudentId, deck: DeckId },
    More { student: StudentId, deck: DeckId },
    Resend { student: StudentId, deck: DeckId },
    Stats { student: StudentId, deck: DeckId },
    Import { path: String, owner: AdminId },
    SetNewPerDay { deck: DeckId, n: u32 },
    Enable(DeckId),
    Disable(DeckId),
    Flags(DeckId),
    Rotate(DeckId),
    Decks,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    Empty,
    Unknown(String),
    Missing { command: &'static str, what: &'static str },
    Invalid { what: &'static str, raw: String },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Empty => write!(f, "empty command"),
            CommandError::Unknown(cmd) => write!(f, "unknown command: {cmd} (try `help`)"),
            CommandError::Missing { command, what } => write!(f, "{command} needs a {what}"),
            CommandError::Invalid { what, raw } => write!(f, "invalid {what}: {raw}"),
        }
    }
}

impl std::error::Error for CommandError {}

fn arg<'a>(
    words: &mut impl Iterator<Item = &'a str>,
    command: &'static str,
    what: &'static str,
) -> Result<&'a str, CommandError> {
    words.next().ok_or(CommandError::Missing { command, what })
}

fn parsed<'a, T: FromStr>(
    words: &mut impl Iterator<Item = &'a str>,
    command: &'static str,
    what: &'static str,
) -> Result<T, CommandError> {
    let raw = arg(words, command, what)?;
    raw.parse().map_err(|_| CommandError::Invalid {
        what,
        raw: raw.to_string(),
    })
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or(CommandError::Empty)?;
        let w = &mut words;
        let command = match name {
            "join" => Command::Join {
                student: parsed(w, "join", "student id")?,
                link: arg(w, "join", "link")?.to_string(),
            },
            "answer" => {
                let student = parsed(w, "answer", "student id")?;
                let deck = parsed(w, "answer", "deck id")?;
                let text = w.collect::<Vec<_>>().join(" ");
                if text.is_empty() {
                    return Err(CommandError::Missing {
                        command: "answer",
                        what: "text",
                    });
                }
                Command::Answer { student, deck, text }
            }
            "bad" => Command::Bad {
                student: parsed(w, "bad", "student id")?,
                deck: parsed(w, "bad", "deck id")?,
            },
            "more" => Command::More {
                student: parsed(w, "more", "student id")?,
                deck: parsed(w, "more", "deck id")?,
            },
            "resend" => Command::Resend {
                student: parsed(w, "resend", "student id")?,
                deck: parsed(w, "resend", "deck id")?,
            },
            "stats" => Command::Stats {
                student: parsed(w, "stats", "student id")?,
                deck: parsed(w, "stats", "deck id")?,
            },
            "import" => Command::Import {
                path: arg(w, "import", "manifest path")?.to_string(),
                owner: match w.next() {
                    Some(raw) => raw.parse().map_err(|_| CommandError::Invalid {
                        what: "owner id",
                        raw: raw.to_string(),
                    })?,
                    None => AdminId::new(1),
                },
            },
            "setn" => Command::SetNewPerDay {
                deck: parsed(w, "setn", "deck id")?,
                n: parsed(w, "setn", "count")?,
            },
            "enable" => Command::Enable(parsed(w, "enable", "deck id")?),
            "disable" => Command::Disable(parsed(w, "disable", "deck id")?),
            "flags" => Command::Flags(parsed(w, "flags", "deck id")?),
            "rotate" => Command::Rotate(parsed(w, "rotate", "deck id")?),
            "decks" => Command::Decks,
            "help" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

pub fn print_commands() {
    println!("Student actions:");
    println!("  join <student> <link>            enroll through a deck link");
    println!("  answer <student> <deck> <text>   answer the card on screen");
    println!("  bad <student> <deck>             flag the card on screen");
    println!("  more <student> <deck>            study more today");
    println!("  resend <student> <deck>          retry a prompt that did not arrive");
    println!("  stats <student> <deck>");
    println!("Admin actions:");
    println!("  import <manifest.json> [owner]   import a deck");
    println!("  setn <deck> <n>                  new cards per day (1..=500)");
    println!("  enable <deck> | disable <deck>");
    println!("  flags <deck>                     most flagged cards");
    println!("  rotate <deck>                    issue a new join link");
    println!("  decks");
    println!("  quit");
}

fn describe_start(outcome: StartOutcome) -> &'static str {
    match outcome {
        StartOutcome::Started(Presentation::Card(_)) => "studying",
        StartOutcome::Started(Presentation::Finished { .. }) => "nothing left for today",
        StartOutcome::AlreadyActive => "already studying",
        StartOutcome::AlreadyStartedToday => "already started today",
        StartOutcome::DeckInactive => "deck is disabled",
    }
}

pub async fn import_manifest(
    services: &AppServices,
    path: &str,
    owner: AdminId,
) -> Result<(), Box<dyn std::error::Error>> {
    let raw = tokio::fs::read_to_string(path).await?;
    let manifest = ImportedDeck::from_json(&raw)?;
    let report = services.import_deck(owner, manifest).await?;
    println!(
        "deck {} imported: {} cards, link payload {}",
        report.deck_id,
        report.imported,
        report.token.payload()
    );
    for skipped in &report.skipped {
        println!("  skipped row {}: {}", skipped.index, skipped.reason);
    }
    Ok(())
}

/// Run one command. Returns `false` on `quit`.
pub async fn dispatch(
    services: &AppServices,
    command: Command,
) -> Result<bool, Box<dyn std::error::Error>> {
    let engine = services.engine();
    match command {
        Command::Join { student, link } => {
            let outcome = engine.enroll(student, &link).await?;
            let joined = if outcome.newly_enrolled { "joined" } else { "back in" };
            println!(
                "student {student} {joined} deck {}: {}",
                outcome.deck_id,
                describe_start(outcome.start)
            );
        }
        Command::Answer { student, deck, text } => {
            engine.submit_answer(student, deck, &text).await?;
        }
        Command::Bad { student, deck } => match engine.flag_bad(student, deck).await? {
            FlagOutcome::Suspended { card_id, .. } => println!("card {card_id} reported, thanks"),
            FlagOutcome::AlreadySuspended { card_id } => println!("card {card_id} was already reported"),
            FlagOutcome::NothingToFlag => println!("no card on screen"),
        },
        Command::More { student, deck } => {
            let outcome = engine.study_more(student, deck).await?;
            println!("student {student}, deck {deck}: {}", describe_start(outcome));
        }
        Command::Resend { student, deck } => {
            if engine.redeliver(student, deck).await? {
                println!("student {student}, deck {deck}: prompt sent again");
            } else {
                println!("student {student}, deck {deck}: no prompt waiting for delivery");
            }
        }
        Command::Stats { student, deck } => {
            let stats = services.stats().progress_stats(student, deck).await?;
            println!(
                "{}: {}/{} cards introduced, {} suspended, {} new left; today {} new, {}/{} correct{}",
                stats.date,
                stats.introduced,
                stats.total_cards,
                stats.suspended,
                stats.new_remaining,
                stats.introduced_today,
                stats.correct_today,
                stats.answered_today,
                if stats.done_for_today { ", done" } else { "" }
            );
        }
        Command::Import { path, owner } => import_manifest(services, &path, owner).await?,
        Command::SetNewPerDay { deck, n } => {
            services.decks().set_new_per_day(deck, n).await?;
            println!("deck {deck}: {n} new cards per day from the next day on");
        }
        Command::Enable(deck) => {
            services.decks().set_active(deck, true).await?;
            println!("deck {deck} enabled");
        }
        Command::Disable(deck) => {
            services.decks().set_active(deck, false).await?;
            println!("deck {deck} disabled");
        }
        Command::Flags(deck) => {
            let report = services.decks().flag_report(deck).await?;
            if report.is_empty() {
                println!("deck {deck}: no flagged cards");
            }
            for row in report {
                println!("  card {} ({}): {} flags", row.card_id, row.primary_answer, row.flags);
            }
        }
        Command::Rotate(deck) => {
            let token = services.decks().rotate_token(deck).await?;
            println!("deck {deck}: new link payload {}", token.payload());
        }
        Command::Decks => {
            for deck in services.decks().list_decks().await? {
                let settings = deck.settings();
                println!(
                    "  {} \"{}\" {} new/day at {} {}{}",
                    deck.id(),
                    deck.title(),
                    settings.new_per_day(),
                    settings.trigger_time().format("%H:%M"),
                    settings.timezone().name(),
                    if deck.is_active() { "" } else { " (disabled)" }
                );
            }
        }
        Command::Help => print_commands(),
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_answer_with_spaces() {
        let command: Command = "answer 7 3  au   revoir".parse().unwrap();
        assert_eq!(
            command,
            Command::Answer {
                student: StudentId::new(7),
                deck: DeckId::new(3),
                text: "au revoir".into(),
            }
        );
    }

    #[test]
    fn parses_resend() {
        let command: Command = "resend 4 2".parse().unwrap();
        assert_eq!(
            command,
            Command::Resend {
                student: StudentId::new(4),
                deck: DeckId::new(2),
            }
        );
    }

    #[test]
    fn import_owner_defaults_to_first_admin() {
        let command: Command = "import deck.json".parse().unwrap();
        assert_eq!(
            command,
            Command::Import {
                path: "deck.json".into(),
                owner: AdminId::new(1),
            }
        );
    }

    #[test]
    fn reports_missing_and_invalid_arguments() {
        assert_eq!(
            "bad 1".parse::<Command>().unwrap_err(),
            CommandError::Missing {
                command: "bad",
                what: "deck id",
            }
        );
        assert_eq!(
            "setn 1 many".parse::<Command>().unwrap_err(),
            CommandError::Invalid {
                what: "count",
                raw: "many".into(),
            }
        );
        assert_eq!("".parse::<Command>().unwrap_err(), CommandError::Empty);
        assert!(matches!("fly".parse::<Command>(), Err(CommandError::Unknown(_))));
    }
}
