//! Interactive REPL with line editing and markdown rendering.
//!
//! Uses rustyline for line editing, history and slash-command completion,
//! and termimad for rendering pages and assist modals inline. Input is read
//! on a dedicated thread; everything else runs on the tokio runtime so a
//! slow contract call or generation never blocks the prompt.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;
use rustyline::completion::Completer;
use rustyline::config::Config;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{CompletionType, Editor, Helper};
use termimad::MadSkin;
use tokio::sync::{broadcast, mpsc};

use crate::app::router::{self, Command, SLASH_COMMANDS};
use crate::app::view::{Banner, Page};
use crate::app::{Action, App};
use crate::assist::AssistKind;
use crate::channels::render;
use crate::settings::Settings;

/// Rustyline helper for slash-command tab completion.
struct ReplHelper;

impl Completer for ReplHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        if !line.starts_with('/') {
            return Ok((0, vec![]));
        }

        let prefix = &line[..pos];
        let matches: Vec<String> = SLASH_COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(prefix))
            .map(|cmd| cmd.to_string())
            .collect();

        Ok((0, matches))
    }
}

impl Hinter for ReplHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if !line.starts_with('/') || pos < line.len() {
            return None;
        }

        SLASH_COMMANDS
            .iter()
            .find(|cmd| cmd.starts_with(line) && **cmd != line)
            .map(|cmd| cmd[line.len()..].to_string())
    }
}

impl Highlighter for ReplHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(format!("\x1b[90m{hint}\x1b[0m"))
    }
}

impl Validator for ReplHelper {}
impl Helper for ReplHelper {}

fn make_skin() -> MadSkin {
    let mut skin = MadSkin::default();
    skin.set_headers_fg(termimad::crossterm::style::Color::Yellow);
    skin.bold.set_fg(termimad::crossterm::style::Color::White);
    skin.italic
        .set_fg(termimad::crossterm::style::Color::Magenta);
    skin.inline_code
        .set_fg(termimad::crossterm::style::Color::Green);
    skin.code_block
        .set_fg(termimad::crossterm::style::Color::Green);
    skin.code_block.left_margin = 2;
    skin
}

fn terminal_width() -> usize {
    crossterm::terminal::size()
        .map(|(w, _)| w as usize)
        .unwrap_or(80)
}

fn print_markdown(markdown: &str) {
    let width = terminal_width();
    eprintln!("\x1b[90m{}\x1b[0m", "\u{2500}".repeat(width.min(80)));
    let skin = make_skin();
    let text = termimad::FmtText::from(&skin, markdown, Some(width));
    print!("{text}");
    println!();
}

fn print_help() {
    let h = "\x1b[1m";
    let c = "\x1b[1;36m";
    let d = "\x1b[90m";
    let r = "\x1b[0m";

    println!();
    println!("  {h}medresearch{r}");
    println!();
    println!("  {h}Wallet{r}");
    println!("  {c}/connect{r}                      {d}request wallet accounts{r}");
    println!("  {c}/disconnect{r}                   {d}forget the current session{r}");
    println!("  {c}/reload{r}                       {d}clear local state and restore the session{r}");
    println!();
    println!("  {h}CARV ID{r}");
    println!("  {c}/mint{r}                         {d}mint an identity token{r}");
    println!("  {c}/grant <id> <agent> <type>{r}    {d}grant data access to an agent{r}");
    println!("  {c}/revoke <id> <agent> <type>{r}   {d}revoke data access{r}");
    println!("  {c}/check <id> <agent> <type>{r}    {d}check data access{r}");
    println!();
    println!("  {h}Research{r}");
    println!("  {c}/simulate{r}                     {d}run a simulated research job{r}");
    println!("  {c}/results{r}                      {d}list local research results{r}");
    println!("  {c}/submit [id]{r}                  {d}publish a result on-chain{r}");
    println!("  {c}/lookup <agent> <topic>{r}       {d}read a published result{r}");
    println!("  {c}/svm{r}                          {d}toggle the SVM agent simulation{r}");
    println!();
    println!("  {h}AI assist{r}");
    println!("  {c}/summarize [id]{r}               {d}summarize a result{r}");
    println!("  {c}/next-steps [id]{r}              {d}suggest next research steps{r}");
    println!("  {c}/explain <term>{r}               {d}explain a medical term{r}");
    println!("  {c}/close [kind|all]{r}             {d}dismiss assist output{r}");
    println!();
    println!("  {h}Navigation{r}");
    println!("  {c}/page <name>{r}                  {d}dashboard, how-it-works, identity, research{r}");
    println!("  {c}/status{r}                       {d}session and pending actions{r}");
    println!("  {c}/quit{r}                         {d}exit{r}");
    println!();
}

/// Scrub credentials that a provider may echo into an error message.
fn redact_sensitive_preview(raw: &str) -> String {
    let mut value = raw.to_string();

    let patterns = [
        (r"(?i)\b(bearer)\s+[a-z0-9._\-~+/]+=*", "$1 [REDACTED]"),
        (
            r"(?i)\b(token|api[_\-]?key|key|secret|password)\b(\s*[:=]\s*)([^,&\s]+)",
            "$1$2[REDACTED]",
        ),
        (r"\bAIza[0-9A-Za-z_\-]{20,}", "[REDACTED]"),
    ];

    for (pattern, replacement) in patterns {
        if let Ok(re) = Regex::new(pattern) {
            value = re.replace_all(&value, replacement).to_string();
        }
    }

    value
}

fn history_path() -> PathBuf {
    Settings::home_dir().join("history")
}

/// Read lines on a std thread and forward them to the async loop.
fn spawn_input_thread(tx: mpsc::Sender<String>) {
    std::thread::spawn(move || {
        let config = match Config::builder().history_ignore_dups(true) {
            Ok(builder) => builder
                .auto_add_history(true)
                .completion_type(CompletionType::List)
                .build(),
            Err(e) => {
                eprintln!("Failed to configure line editor: {e}");
                return;
            }
        };

        let mut rl = match Editor::with_config(config) {
            Ok(editor) => editor,
            Err(e) => {
                eprintln!("Failed to initialize line editor: {e}");
                return;
            }
        };

        rl.set_helper(Some(ReplHelper));

        let hist_path = history_path();
        if let Some(parent) = hist_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = rl.load_history(&hist_path);

        loop {
            match rl.readline("\x1b[1;36m\u{203A}\x1b[0m ") {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("\x1b[90m/quit to exit\x1b[0m");
                }
                Err(ReadlineError::Eof) => {
                    let _ = tx.blocking_send("/quit".to_string());
                    break;
                }
                Err(e) => {
                    eprintln!("Input error: {e}");
                    break;
                }
            }
        }

        let _ = rl.save_history(&hist_path);
    });
}

/// Tracks what was last printed so each change renders only what is new.
#[derive(Default)]
struct Rendered {
    page: Option<Page>,
    banner: Banner,
    modals: HashMap<AssistKind, (u64, bool)>,
}

impl Rendered {
    fn refresh(&mut self, app: &App) {
        let page = app.page();
        if self.page != Some(page) {
            self.page = Some(page);
            print_markdown(&render::page(app));
        }

        let banner = app.banner();
        if banner != self.banner {
            if let Some(line) = render::banner(&banner) {
                println!("{}", redact_sensitive_preview(&line));
            }
            self.banner = banner;
        }

        for kind in AssistKind::ALL {
            let open = app.is_modal_open(kind);
            let request = app.assist_request(kind);
            let resolved = request.result_text.is_some();
            let key = (request.seq, resolved);
            if !open {
                self.modals.remove(&kind);
                continue;
            }
            if self.modals.get(&kind) == Some(&key) {
                continue;
            }
            if let Some(markdown) = render::modal(&request) {
                print_markdown(&markdown);
                self.modals.insert(kind, key);
            }
        }
    }
}

/// The terminal front end.
pub struct ReplChannel {
    app: Arc<App>,
}

impl ReplChannel {
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }

    /// Run until `/quit` or end of input.
    pub async fn run(self) -> anyhow::Result<()> {
        let app = self.app;
        let _subscription = app.session_manager().attach();
        let mut notices = Some(app.session_manager().notices());
        let mut changes = app.changes();

        println!("\x1b[1mmedresearch\x1b[0m  /help for commands, /quit to exit");
        println!();

        app.dispatch(Action::Restore).await;
        let mut rendered = Rendered::default();
        rendered.refresh(&app);

        let (tx, mut rx) = mpsc::channel::<String>(32);
        spawn_input_thread(tx);

        loop {
            tokio::select! {
                line = rx.recv() => {
                    let Some(line) = line else { break };
                    match router::parse(&line) {
                        Ok(None) => {}
                        Ok(Some(Command::Quit)) => break,
                        Ok(Some(Command::Help)) => print_help(),
                        Ok(Some(Command::ShowResults)) => {
                            print_markdown(&render::results_table(&app.results()));
                        }
                        Ok(Some(Command::ShowStatus)) => print_markdown(&render::status(&app)),
                        Ok(Some(Command::CloseAll)) => {
                            for kind in app.open_modals() {
                                app.dispatch(Action::CloseModal(kind)).await;
                            }
                        }
                        Ok(Some(Command::Dispatch(Action::Navigate(page)))) => {
                            // Re-entering the current page still reprints it.
                            rendered.page = None;
                            app.dispatch(Action::Navigate(page)).await;
                        }
                        Ok(Some(Command::Dispatch(action))) => {
                            let app = Arc::clone(&app);
                            tokio::spawn(async move { app.dispatch(action).await });
                        }
                        Err(message) => println!("\x1b[33m{message}\x1b[0m"),
                    }
                }
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    rendered.refresh(&app);
                }
                notice = recv_notice(&mut notices) => {
                    if let Some(notice) = notice {
                        let app = Arc::clone(&app);
                        tokio::spawn(async move { app.dispatch(Action::WalletNotice(notice)).await });
                    }
                }
            }
        }

        tracing::debug!("REPL loop finished");
        Ok(())
    }
}

/// Next wallet notice; pends forever once the channel is gone.
async fn recv_notice(
    notices: &mut Option<broadcast::Receiver<crate::session::SessionNotice>>,
) -> Option<crate::session::SessionNotice> {
    let Some(rx) = notices.as_mut() else {
        return std::future::pending().await;
    };
    match rx.recv().await {
        Ok(notice) => Some(notice),
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "Dropped wallet notices");
            None
        }
        Err(broadcast::error::RecvError::Closed) => {
            *notices = None;
            None
        }
    }
}
