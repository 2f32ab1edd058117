//! Slash-command parsing for the terminal front end.

use super::Action;
use super::view::Page;
use crate::assist::AssistKind;

/// Slash commands offered for completion.
pub const SLASH_COMMANDS: &[&str] = &[
    "/connect",
    "/disconnect",
    "/reload",
    "/mint",
    "/grant",
    "/revoke",
    "/check",
    "/simulate",
    "/submit",
    "/lookup",
    "/summarize",
    "/next-steps",
    "/explain",
    "/page",
    "/dashboard",
    "/how",
    "/identity",
    "/research",
    "/close",
    "/svm",
    "/results",
    "/status",
    "/help",
    "/quit",
];

/// What a line of input asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Dispatch(Action),
    /// Close every open assist modal.
    CloseAll,
    ShowResults,
    ShowStatus,
    Help,
    Quit,
}

/// Parse one line of input.
///
/// `Ok(None)` means the line was empty. Plain text that is not a command
/// is treated as a term to explain, matching the most common use.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(body) = line.strip_prefix('/') else {
        return Ok(Some(Command::Dispatch(Action::ExplainTerm {
            term: line.to_string(),
        })));
    };

    let mut parts = body.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default().to_ascii_lowercase();
    let rest = parts.next().unwrap_or_default().trim();

    let command = match name.as_str() {
        "connect" => Command::Dispatch(Action::Connect),
        "disconnect" => Command::Dispatch(Action::Disconnect),
        "reload" => Command::Dispatch(Action::Reload),
        "mint" => Command::Dispatch(Action::MintIdentity),
        "grant" => {
            let (token_id, agent, data_type) = access_args(rest, "/grant")?;
            Command::Dispatch(Action::GrantAccess {
                token_id,
                agent,
                data_type,
            })
        }
        "revoke" => {
            let (token_id, agent, data_type) = access_args(rest, "/revoke")?;
            Command::Dispatch(Action::RevokeAccess {
                token_id,
                agent,
                data_type,
            })
        }
        "check" => {
            let (token_id, agent, data_type) = access_args(rest, "/check")?;
            Command::Dispatch(Action::CheckAccess {
                token_id,
                agent,
                data_type,
            })
        }
        "simulate" => Command::Dispatch(Action::SimulateResearch),
        "submit" => Command::Dispatch(Action::SubmitResult {
            id: optional_id(rest)?,
        }),
        "lookup" => {
            let mut args = rest.splitn(2, char::is_whitespace);
            let agent = args.next().unwrap_or_default().to_string();
            let topic = args.next().unwrap_or_default().trim().to_string();
            if agent.is_empty() || topic.is_empty() {
                return Err("Usage: /lookup <agent address> <research topic>".to_string());
            }
            Command::Dispatch(Action::LookupResult { topic, agent })
        }
        "summarize" | "summary" => Command::Dispatch(Action::Summarize {
            id: optional_id(rest)?,
        }),
        "next-steps" | "next" | "steps" => Command::Dispatch(Action::SuggestNextSteps {
            id: optional_id(rest)?,
        }),
        // A blank term still goes through so the user sees the prompt for one.
        "explain" => Command::Dispatch(Action::ExplainTerm {
            term: rest.to_string(),
        }),
        "page" | "go" => {
            let page: Page = rest.parse()?;
            Command::Dispatch(Action::Navigate(page))
        }
        "dashboard" | "home" => Command::Dispatch(Action::Navigate(Page::Dashboard)),
        "how" | "how-it-works" => Command::Dispatch(Action::Navigate(Page::HowItWorks)),
        "identity" | "id" => Command::Dispatch(Action::Navigate(Page::Identity)),
        "research" | "agent" => Command::Dispatch(Action::Navigate(Page::Research)),
        "close" => match rest.to_ascii_lowercase().as_str() {
            "" | "all" => Command::CloseAll,
            "summary" | "summarize" => Command::Dispatch(Action::CloseModal(AssistKind::Summary)),
            "next-steps" | "next" | "steps" => {
                Command::Dispatch(Action::CloseModal(AssistKind::NextSteps))
            }
            "explain" | "term" => Command::Dispatch(Action::CloseModal(AssistKind::ExplainTerm)),
            other => {
                return Err(format!(
                    "Unknown modal '{other}'. Use summary, next-steps, explain or all."
                ));
            }
        },
        "svm" => Command::Dispatch(Action::ToggleSvmAgent),
        "results" => Command::ShowResults,
        "status" => Command::ShowStatus,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(format!("Unknown command '/{other}'. Try /help.")),
    };
    Ok(Some(command))
}

/// `<token id> <agent address> <data type...>`; missing trailing fields stay blank
/// so the app reports them the same way an empty form would.
fn access_args(rest: &str, usage: &str) -> Result<(String, String, String), String> {
    if rest.is_empty() {
        return Err(format!(
            "Usage: {usage} <token id> <agent address> <data type>"
        ));
    }
    let mut args = rest.splitn(3, char::is_whitespace);
    let token_id = args.next().unwrap_or_default().to_string();
    let agent = args.next().unwrap_or_default().trim().to_string();
    let data_type = args.next().unwrap_or_default().trim().to_string();
    Ok((token_id, agent, data_type))
}

fn optional_id(rest: &str) -> Result<Option<u64>, String> {
    let rest = rest.trim_start_matches('#');
    if rest.is_empty() {
        return Ok(None);
    }
    rest.parse()
        .map(Some)
        .map_err(|_| format!("'{rest}' is not a result id"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatched(line: &str) -> Action {
        match parse(line) {
            Ok(Some(Command::Dispatch(action))) => action,
            other => panic!("expected an action for {line:?}, got {other:?}"),
        }
    }

    #[test]
    fn parses_access_commands_with_multiword_data_type() {
        assert_eq!(
            dispatched("/grant 42 0xabc clinical trial data"),
            Action::GrantAccess {
                token_id: "42".to_string(),
                agent: "0xabc".to_string(),
                data_type: "clinical trial data".to_string(),
            }
        );
        assert_eq!(
            dispatched("/check 42 0xabc"),
            Action::CheckAccess {
                token_id: "42".to_string(),
                agent: "0xabc".to_string(),
                data_type: String::new(),
            }
        );
        assert!(parse("/revoke").is_err());
    }

    #[test]
    fn result_ids_are_optional() {
        assert_eq!(dispatched("/summarize"), Action::Summarize { id: None });
        assert_eq!(dispatched("/submit #3"), Action::SubmitResult { id: Some(3) });
        assert!(parse("/next-steps three").is_err());
    }

    #[test]
    fn plain_text_is_a_term_to_explain() {
        assert_eq!(
            dispatched("myocardial infarction"),
            Action::ExplainTerm {
                term: "myocardial infarction".to_string()
            }
        );
        assert_eq!(parse("   "), Ok(None));
    }

    #[test]
    fn navigation_and_meta_commands() {
        assert_eq!(dispatched("/page how"), Action::Navigate(Page::HowItWorks));
        assert_eq!(dispatched("/research"), Action::Navigate(Page::Research));
        assert_eq!(parse("/close"), Ok(Some(Command::CloseAll)));
        assert_eq!(
            dispatched("/close next"),
            Action::CloseModal(AssistKind::NextSteps)
        );
        assert_eq!(parse("/QUIT"), Ok(Some(Command::Quit)));
        assert!(parse("/settings").is_err());
    }

    #[test]
    fn lookup_needs_agent_and_topic() {
        assert_eq!(
            dispatched("/lookup 0xabc Drug Discovery - Phase 1"),
            Action::LookupResult {
                topic: "Drug Discovery - Phase 1".to_string(),
                agent: "0xabc".to_string(),
            }
        );
        assert!(parse("/lookup 0xabc").is_err());
    }
}
