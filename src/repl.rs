//! Interactive prompt over a [`Session`].

use std::path::PathBuf;

use owo_colors::OwoColorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Editor, Helper};

use monkey::bytecode::disasm::render_bytecode;
use monkey::config::ReplConfig;
use monkey::frontend;
use monkey::lang::ast::Statement;
use monkey::runtime::builtins::BUILTINS;
use monkey::{Error, Session};

const MAX_HISTORY_SIZE: usize = 1000;

const KEYWORDS: &[&str] = &["let", "fn", "if", "else", "return", "true", "false"];

/// REPL commands that can be executed with a dot prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Exit,
    Clear,
}

impl ReplCommand {
    pub fn parse(input: &str) -> Option<Self> {
        let cmd = input.trim().strip_prefix('.')?;

        match cmd.to_lowercase().as_str() {
            "help" | "h" | "?" => Some(ReplCommand::Help),
            "exit" | "quit" | "q" => Some(ReplCommand::Exit),
            "clear" | "cls" => Some(ReplCommand::Clear),
            _ => None,
        }
    }

    pub fn all_commands() -> &'static [(&'static str, &'static str)] {
        &[
            (".help", "Show this help message"),
            (".exit", "Exit the REPL"),
            (".clear", "Clear the screen"),
        ]
    }
}

enum CommandResult {
    Continue,
    Exit,
}

/// Completion of keywords and builtin names, plus multi-line input while
/// brackets are open.
struct MonkeyHelper {
    words: Vec<&'static str>,
}

impl MonkeyHelper {
    fn new() -> Self {
        let mut words: Vec<&'static str> = KEYWORDS.to_vec();
        words.extend(BUILTINS.iter().map(|b| b.name));
        Self { words }
    }
}

impl Completer for MonkeyHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = line[..pos]
            .rfind(|c: char| !c.is_alphanumeric() && c != '_')
            .map(|i| i + 1)
            .unwrap_or(0);

        let word = &line[start..pos];
        if word.is_empty() {
            return Ok((pos, vec![]));
        }

        let matches = self
            .words
            .iter()
            .filter(|w| w.starts_with(word))
            .map(|w| Pair {
                display: w.to_string(),
                replacement: w.to_string(),
            })
            .collect();

        Ok((start, matches))
    }
}

impl Hinter for MonkeyHelper {
    type Hint = String;
}

impl Highlighter for MonkeyHelper {}

impl Validator for MonkeyHelper {
    fn validate(&self, ctx: &mut ValidationContext<'_>) -> rustyline::Result<ValidationResult> {
        if is_balanced(ctx.input()) {
            Ok(ValidationResult::Valid(None))
        } else {
            Ok(ValidationResult::Incomplete)
        }
    }
}

impl Helper for MonkeyHelper {}

/// Check if brackets, braces, and parentheses are balanced
fn is_balanced(input: &str) -> bool {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;

    for c in input.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }

        if in_string {
            match c {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '(' => stack.push(')'),
            '[' => stack.push(']'),
            '{' => stack.push('}'),
            ')' | ']' | '}' => {
                if stack.pop() != Some(c) {
                    return true; // let the parser report it
                }
            }
            _ => {}
        }
    }

    stack.is_empty() && !in_string
}

pub struct Repl {
    session: Session,
    editor: Editor<MonkeyHelper, DefaultHistory>,
    history_path: Option<PathBuf>,
    prompt: String,
    color: bool,
    show_bytecode: bool,
}

impl Repl {
    pub fn new(
        config: &ReplConfig,
        session: Session,
        color: bool,
        show_bytecode: bool,
    ) -> rustyline::Result<Self> {
        let editor_config = rustyline::Config::builder()
            .history_ignore_dups(true)?
            .history_ignore_space(true)
            .max_history_size(MAX_HISTORY_SIZE)?
            .auto_add_history(true)
            .build();

        let mut editor = Editor::with_config(editor_config)?;
        editor.set_helper(Some(MonkeyHelper::new()));

        let history_path = if config.history_file.is_empty() {
            None
        } else {
            Some(PathBuf::from(&config.history_file))
        };
        if let Some(path) = &history_path {
            let _ = editor.load_history(path);
        }

        Ok(Self {
            session,
            editor,
            history_path,
            prompt: config.prompt.clone(),
            color,
            show_bytecode,
        })
    }

    pub fn run(&mut self) -> rustyline::Result<()> {
        println!(
            "Monkey {} (type .help for commands)",
            env!("CARGO_PKG_VERSION")
        );

        loop {
            let prompt = self.prompt.clone();
            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    if let Some(cmd) = ReplCommand::parse(trimmed) {
                        match self.execute_command(cmd) {
                            CommandResult::Continue => continue,
                            CommandResult::Exit => break,
                        }
                    }

                    self.eval_and_print(trimmed);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err),
            }
        }

        if let Some(path) = &self.history_path {
            let _ = self.editor.save_history(path);
        }
        Ok(())
    }

    fn execute_command(&mut self, cmd: ReplCommand) -> CommandResult {
        match cmd {
            ReplCommand::Help => {
                for (name, desc) in ReplCommand::all_commands() {
                    if self.color {
                        println!("  {:16} {}", name.cyan(), desc.dimmed());
                    } else {
                        println!("  {:16} {}", name, desc);
                    }
                }
                CommandResult::Continue
            }
            ReplCommand::Exit => CommandResult::Exit,
            ReplCommand::Clear => {
                print!("\x1B[2J\x1B[H");
                CommandResult::Continue
            }
        }
    }

    fn eval_and_print(&mut self, source: &str) {
        match self.eval(source) {
            Ok(Some(value)) => {
                if self.color {
                    println!("{}", value.to_string().bright_white());
                } else {
                    println!("{}", value);
                }
            }
            Ok(None) => {}
            Err(err) => {
                if self.color {
                    eprintln!("{} {}", "error:".red().bold(), err);
                } else {
                    eprintln!("error: {}", err);
                }
            }
        }
    }

    /// Only inputs ending in an expression statement produce a value to print.
    fn eval(&mut self, source: &str) -> Result<Option<String>, Error> {
        let program = frontend::parse(source)?;
        let bytecode = self.session.compile(&program)?;

        if self.show_bytecode {
            print!("{}", render_bytecode(&bytecode));
        }

        let value = self.session.run(bytecode)?;
        match program.statements.last() {
            Some(Statement::Expression(_)) => Ok(Some(value.to_string())),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(ReplCommand::parse(".help"), Some(ReplCommand::Help));
        assert_eq!(ReplCommand::parse("  .EXIT "), Some(ReplCommand::Exit));
        assert_eq!(ReplCommand::parse(".cls"), Some(ReplCommand::Clear));
        assert_eq!(ReplCommand::parse(".nope"), None);
        assert_eq!(ReplCommand::parse("help"), None);
    }

    #[test]
    fn test_balance() {
        assert!(is_balanced("let a = fn(x) { x };"));
        assert!(!is_balanced("let a = fn(x) {"));
        assert!(!is_balanced("[1, 2"));
        assert!(is_balanced(r#""{" + "(""#));
        assert!(!is_balanced(r#""unterminated"#));
    }
}
