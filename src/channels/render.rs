//! Markdown for each page, the banner and the assist modals.
//!
//! Everything here is a pure function of app state so it can be tested
//! without a terminal.

use crate::app::App;
use crate::app::view::{Banner, Page};
use crate::assist::{AssistKind, AssistRequest, AssistStatus};
use crate::config::ContractTarget;
use crate::contracts::ContractAction;
use crate::research::ResearchResult;

const HOW_IT_WORKS: &str = "\
## The research journey

1. **Patient owns data**, via a CARV ID identity token (ERC-7231).
2. **Grants privacy-preserving access** to specific AI agents for specific data types.
3. **AI agents research** collaboratively with federated learning.
4. **Insights go on-chain** as verifiable result hashes, with generated explanations.

## Research process

- *Data registration*: anonymized records are registered with the data layer.
- *Access granting*: the token owner grants an agent access per data type.
- *Federated learning*: agents train without the raw data leaving its source.
- *Results publication*: aggregated result hashes and accuracy are recorded on-chain.

## Key benefits

- **Privacy first**: complete data ownership with granular access controls.
- **Collaborative**: multiple institutions contribute to research safely.
- **Verifiable**: on-chain proofs keep research results honest.
- **Decentralized**: no single point of failure or control.
";

pub fn page(app: &App) -> String {
    let page = app.page();
    let body = match page {
        Page::Dashboard => dashboard(app),
        Page::HowItWorks => HOW_IT_WORKS.to_string(),
        Page::Identity => identity(app),
        Page::Research => research(app),
    };
    format!("# {}\n\n{body}", page.title())
}

fn connection_line(app: &App) -> String {
    match app.session() {
        Some(session) => format!(
            "Connected as `{}` on chain `{}`.",
            session.address, session.chain_id
        ),
        None if app.session_manager().has_wallet() => {
            "Wallet not connected. Use `/connect`.".to_string()
        }
        None => "No wallet available. Set `WALLET_BACKEND` to `rpc` or `memory`.".to_string(),
    }
}

fn dashboard(app: &App) -> String {
    let results = app.results();
    let svm = if app.svm_agent_active() {
        "active"
    } else {
        "paused"
    };
    format!(
        "Patients own their medical data through a CARV ID and grant AI research agents \
         privacy-preserving access to it.\n\n\
         - {}\n\
         - Research results stored locally: **{}**\n\
         - SVM agent simulation: **{svm}**\n\n\
         Pages: `/identity`, `/research`, `/how`. Type `/help` for every command.\n",
        connection_line(app),
        results.len(),
    )
}

fn contract_line(name: &str, target: &ContractTarget) -> String {
    match target {
        ContractTarget::Deployed(address) => format!("- {name} contract: `{address}`"),
        ContractTarget::Placeholder(raw) => {
            format!("- {name} contract: *not configured* (`{raw}`)")
        }
    }
}

fn identity(app: &App) -> String {
    let config = app.contracts_config();
    let mut out = format!(
        "{}\n\n{}\n\n",
        connection_line(app),
        contract_line("Identity", &config.identity)
    );

    match app.last_mint() {
        Some(mint) => out.push_str(&format!(
            "Last minted CARV ID: **{}**\n\n- metadata: `{}`\n- transaction: `{}`\n\n",
            mint.token_id, mint.metadata_uri, mint.transaction_id
        )),
        None => out.push_str("No CARV ID minted in this session.\n\n"),
    }

    let pending: Vec<&str> = [
        ContractAction::Mint,
        ContractAction::GrantAccess,
        ContractAction::RevokeAccess,
    ]
    .into_iter()
    .filter(|action| app.is_pending(*action))
    .map(ContractAction::as_str)
    .collect();
    if !pending.is_empty() {
        out.push_str(&format!("*Pending:* {}\n\n", pending.join(", ")));
    }

    out.push_str(
        "Commands: `/mint`, `/grant <token id> <agent> <data type>`, \
         `/revoke <token id> <agent> <data type>`, `/check <token id> <agent> <data type>`\n",
    );
    out
}

fn research(app: &App) -> String {
    let config = app.contracts_config();
    let svm = if app.svm_agent_active() {
        "active"
    } else {
        "paused"
    };
    let mut out = format!(
        "{}\n\nSVM agent simulation: **{svm}** (`/svm` toggles)\n\n",
        contract_line("Research results", &config.research_results)
    );
    out.push_str(&results_table(&app.results()));
    out.push_str(
        "\nCommands: `/simulate`, `/summarize [id]`, `/next-steps [id]`, `/explain <term>`, \
         `/submit [id]`, `/lookup <agent> <topic>`\n",
    );
    out
}

pub fn results_table(results: &[ResearchResult]) -> String {
    if results.is_empty() {
        return "No research results yet. Run `/simulate`.\n".to_string();
    }
    let mut out = String::from("| id | topic | accuracy | agent | time |\n|---|---|---|---|---|\n");
    for result in results {
        out.push_str(&format!(
            "| {} | {} | {}% | `{}` | {} |\n",
            result.id,
            result.topic,
            result.accuracy,
            result.agent_address,
            result.timestamp.format("%Y-%m-%d %H:%M:%S")
        ));
    }
    out
}

pub fn banner(banner: &Banner) -> Option<String> {
    if let Some(error) = &banner.error {
        let kind = banner
            .error_kind
            .map(|k| format!(" ({k})"))
            .unwrap_or_default();
        return Some(format!("\x1b[31m\u{2717} {error}{kind}\x1b[0m"));
    }
    banner
        .message
        .as_ref()
        .map(|message| format!("\x1b[32m\u{25CF}\x1b[0m {message}"))
}

/// Modal body, or `None` while nothing has resolved yet.
pub fn modal(request: &AssistRequest) -> Option<String> {
    let title = request.kind.title();
    let body = match request.status {
        AssistStatus::Idle => return None,
        AssistStatus::Loading => return Some(format!("## {title}\n\n*Loading...*\n")),
        AssistStatus::Ready | AssistStatus::Failed => request.result_text.clone()?,
    };
    let close = match request.kind {
        AssistKind::Summary => "summary",
        AssistKind::NextSteps => "next-steps",
        AssistKind::ExplainTerm => "explain",
    };
    Some(format!("## {title}\n\n{body}\n\n*`/close {close}` to dismiss*\n"))
}

pub fn status(app: &App) -> String {
    let pending: Vec<&str> = [
        ContractAction::Mint,
        ContractAction::GrantAccess,
        ContractAction::RevokeAccess,
        ContractAction::SubmitResult,
    ]
    .into_iter()
    .filter(|action| app.is_pending(*action))
    .map(ContractAction::as_str)
    .collect();
    let wallet = app
        .session_manager()
        .wallet_name()
        .unwrap_or("none")
        .to_string();
    format!(
        "- page: `{}`\n- wallet: `{wallet}`\n- {}\n- results: {}\n- pending: {}\n",
        app.page().slug(),
        connection_line(app),
        app.results().len(),
        if pending.is_empty() {
            "none".to_string()
        } else {
            pending.join(", ")
        }
    )
}
