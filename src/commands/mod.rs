//! # Prefix Commands
//!
//! Text commands behind the configured prefix (`!` by default). Anything that
//! does not parse as a command is left for the mention responder.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.3.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.0.0: `speak`, `help` and the `alice`/`eliza` groups

pub mod handler;

pub use handler::CommandHandler;

use crate::engine::EngineKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Help,
    /// Top-level `speak`: default engine, plain reply, voice playback.
    Speak { text: String },
    /// `<engine> speak <text>`: reply as an embed.
    EngineSpeak { engine: EngineKind, text: String },
    Describe(EngineKind),
    Reset(EngineKind),
    /// A group name with a missing or unknown subcommand.
    GroupHelp(EngineKind),
}

/// Parses `content` as a command. Returns `None` for anything that is not one.
///
/// # Example
/// ```
/// use chatterbox::commands::{parse_command, ChatCommand};
/// use chatterbox::engine::EngineKind;
///
/// let cmd = parse_command("!eliza speak I feel sad", "!");
/// assert_eq!(
///     cmd,
///     Some(ChatCommand::EngineSpeak { engine: EngineKind::Eliza, text: "I feel sad".to_string() })
/// );
/// ```
pub fn parse_command(content: &str, prefix: &str) -> Option<ChatCommand> {
    let body = content.trim().strip_prefix(prefix)?;
    let (name, rest) = split_word(body);

    if name.eq_ignore_ascii_case("help") {
        return Some(ChatCommand::Help);
    }
    if name.eq_ignore_ascii_case("speak") {
        return Some(ChatCommand::Speak { text: rest.to_string() });
    }

    let engine = EngineKind::from_name(name)?;
    let (sub, text) = split_word(rest);
    let command = match sub.to_ascii_lowercase().as_str() {
        "speak" => ChatCommand::EngineSpeak {
            engine,
            text: text.to_string(),
        },
        "description" => ChatCommand::Describe(engine),
        "reset" if engine == EngineKind::Alice => ChatCommand::Reset(engine),
        _ => ChatCommand::GroupHelp(engine),
    };
    Some(command)
}

/// First word and the trimmed remainder.
fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(end) => (&input[..end], input[end..].trim()),
        None => (input, ""),
    }
}

pub fn get_help_text(prefix: &str) -> String {
    let mut help = String::from("**ChatterBox Commands**\n\n");

    help.push_str(&format!("`{}speak <text>` - Talk to ALICE (and hear the answer if you are in voice)\n", prefix));
    help.push_str(&format!("`{}help` - Show this help message\n\n", prefix));

    help.push_str("**ALICE:**\n");
    help.push_str(&group_commands(EngineKind::Alice, prefix));
    help.push_str("\n**ELIZA:**\n");
    help.push_str(&group_commands(EngineKind::Eliza, prefix));

    help.push_str("\nYou can also just mention me in a message.");
    help
}

pub fn get_group_help(engine: EngineKind, prefix: &str) -> String {
    format!("**{} Commands**\n{}", engine, group_commands(engine, prefix))
}

fn group_commands(engine: EngineKind, prefix: &str) -> String {
    let group = engine.command_name();
    let mut lines = format!(
        "`{p}{g} speak <text>` - Ask {e} something\n`{p}{g} description` - What is {e}?\n",
        p = prefix,
        g = group,
        e = engine
    );
    if engine == EngineKind::Alice {
        lines.push_str(&format!("`{}{} reset` - Wipe what ALICE has learned (owner only)\n", prefix, group));
    }
    lines
}
