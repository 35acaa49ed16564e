/// Slash-command parsing for comment bodies.
///
/// The parser is deliberately two-layered: `parse` turns any command text
/// into a structural `Command { name, args }` without judging the name, and
/// `SlashCommand::classify` maps it onto the commands this bot understands.
/// Unknown names survive parsing so the router can answer them with a help
/// pointer instead of silence.

/// A parsed slash command. Ephemeral: built per comment event, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
    pub raw: String,
}

/// True when the text is a command: its first non-whitespace token starts
/// with `/`. `parse` must only be called when this returns true.
pub fn is_command(text: &str) -> bool {
    text.trim_start().starts_with('/')
}

/// Split command text into name and positional args. Flags like `--force`
/// are ordinary args; callers interpret them by membership.
pub fn parse(text: &str) -> Command {
    let mut tokens = text.split_whitespace();
    let name = tokens.next().unwrap_or_default().to_string();
    let args = tokens.map(|t| t.to_string()).collect();
    Command {
        name,
        args,
        raw: text.to_string(),
    }
}

/// The commands the router understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    /// `/ai-review [type]` or `/review [security|performance]`
    Review { focus: Option<String> },
    /// `/suggest improvements`
    SuggestImprovements,
    /// `/resolve-conflicts [--force]`
    ResolveConflicts { force: bool },
    /// `/ai-status`
    Status,
    /// `/ai-help`
    Help,
    /// Anything else starting with `/`
    Unknown { attempted: String },
}

impl SlashCommand {
    pub fn classify(command: &Command) -> SlashCommand {
        match command.name.to_lowercase().as_str() {
            "/ai-review" => SlashCommand::Review {
                focus: command
                    .args
                    .iter()
                    .find(|arg| !arg.starts_with("--"))
                    .map(|arg| arg.to_lowercase()),
            },
            "/review" => SlashCommand::Review {
                // /review only recognizes the documented focus areas;
                // anything else runs a plain review.
                focus: command
                    .args
                    .first()
                    .map(|arg| arg.to_lowercase())
                    .filter(|arg| arg == "security" || arg == "performance"),
            },
            "/suggest" => {
                if command
                    .args
                    .first()
                    .is_some_and(|arg| arg.eq_ignore_ascii_case("improvements"))
                {
                    SlashCommand::SuggestImprovements
                } else {
                    SlashCommand::Unknown {
                        attempted: command.raw.trim().to_string(),
                    }
                }
            }
            "/resolve-conflicts" => SlashCommand::ResolveConflicts {
                force: command.args.iter().any(|arg| arg == "--force"),
            },
            "/ai-status" => SlashCommand::Status,
            "/ai-help" => SlashCommand::Help,
            _ => SlashCommand::Unknown {
                attempted: command.name.clone(),
            },
        }
    }
}

/// Help text posted for `/ai-help` and as the pointer after an unknown
/// command.
pub fn help_text() -> String {
    "**Available commands**\n\n\
     - `/ai-review [type]` - run a full review, optionally focused on one area\n\
     - `/review [security|performance]` - run a focused review\n\
     - `/suggest improvements` - run a review emphasizing improvement suggestions\n\
     - `/resolve-conflicts [--force]` - check this pull request for merge conflicts\n\
     - `/ai-status` - show the review workflow status for this pull request\n\
     - `/ai-help` - show this message"
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn classify(text: &str) -> SlashCommand {
        SlashCommand::classify(&parse(text))
    }

    #[test]
    fn test_is_command() {
        assert!(is_command("/ai-review"));
        assert!(is_command("  /review security"));
        assert!(!is_command("please review this"));
        assert!(!is_command(""));
        assert!(!is_command("   "));
        assert!(!is_command("ai-review"));
    }

    #[test]
    fn test_parse_name_and_args() {
        let command = parse("/ai-review security --fast");
        assert_eq!(command.name, "/ai-review");
        assert_eq!(command.args, vec!["security", "--fast"]);
        assert_eq!(command.raw, "/ai-review security --fast");
    }

    #[test]
    fn test_parse_bare_command() {
        let command = parse("/ai-status");
        assert_eq!(command.name, "/ai-status");
        assert!(command.args.is_empty());
    }

    #[test]
    fn test_classify_ai_review() {
        assert_eq!(classify("/ai-review"), SlashCommand::Review { focus: None });
        assert_eq!(
            classify("/ai-review security"),
            SlashCommand::Review {
                focus: Some("security".to_string())
            }
        );
        // Flags are not a focus
        assert_eq!(
            classify("/ai-review --strict"),
            SlashCommand::Review { focus: None }
        );
        assert_eq!(
            classify("/AI-Review Security"),
            SlashCommand::Review {
                focus: Some("security".to_string())
            }
        );
    }

    #[test]
    fn test_classify_review_restricts_focus() {
        assert_eq!(
            classify("/review security"),
            SlashCommand::Review {
                focus: Some("security".to_string())
            }
        );
        assert_eq!(
            classify("/review performance"),
            SlashCommand::Review {
                focus: Some("performance".to_string())
            }
        );
        // Undocumented focus areas run a plain review
        assert_eq!(
            classify("/review style"),
            SlashCommand::Review { focus: None }
        );
        assert_eq!(classify("/review"), SlashCommand::Review { focus: None });
    }

    #[test]
    fn test_classify_suggest_improvements() {
        assert_eq!(
            classify("/suggest improvements"),
            SlashCommand::SuggestImprovements
        );
        assert_eq!(
            classify("/suggest Improvements"),
            SlashCommand::SuggestImprovements
        );
        // /suggest alone is not a documented command
        assert_eq!(
            classify("/suggest"),
            SlashCommand::Unknown {
                attempted: "/suggest".to_string()
            }
        );
    }

    #[test]
    fn test_classify_resolve_conflicts() {
        assert_eq!(
            classify("/resolve-conflicts"),
            SlashCommand::ResolveConflicts { force: false }
        );
        assert_eq!(
            classify("/resolve-conflicts --force"),
            SlashCommand::ResolveConflicts { force: true }
        );
    }

    #[test]
    fn test_classify_status_and_help() {
        assert_eq!(classify("/ai-status"), SlashCommand::Status);
        assert_eq!(classify("/ai-help"), SlashCommand::Help);
    }

    #[test]
    fn test_classify_unknown() {
        assert_eq!(
            classify("/deploy production"),
            SlashCommand::Unknown {
                attempted: "/deploy".to_string()
            }
        );
    }

    proptest! {
        /// No text without a leading slash is ever a command, so the router
        /// never reacts to ordinary comments.
        #[test]
        fn non_slash_text_is_never_a_command(text in "[^/\\s][^\\r\\n]{0,80}") {
            prop_assert!(!is_command(&text));
        }

        /// Parsing preserves every whitespace-delimited token after the name,
        /// in order.
        #[test]
        fn parse_keeps_all_args(args in proptest::collection::vec("[a-z-]{1,8}", 0..5)) {
            let text = format!("/ai-review {}", args.join(" "));
            let command = parse(&text);
            prop_assert_eq!(command.name, "/ai-review");
            prop_assert_eq!(command.args, args);
        }
    }
}
