// ABOUTME: Turns a raw shell line into a structured Command
// Picks one simple command out of lists and pipelines, then classifies its arguments

use super::lexer::{tokenize, Token};
use super::{Command, ParseError};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

lazy_static! {
    /// `--name` or `--name=value`
    static ref LONG_OPT: Regex = Regex::new(r"^--[^=]+(=|$)").unwrap();
    /// `-a`, `-abc`
    static ref SHORT_OPT: Regex = Regex::new(r"^-[a-zA-Z0-9]+$").unwrap();
    /// `NAME=value` before the command name
    static ref ASSIGNMENT: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*=").unwrap();
}

/// One command of a pipeline, redirections removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct SimpleCommand {
    words: Vec<String>,
}

pub struct CommandParser;

impl CommandParser {
    /// Parse a shell line.
    ///
    /// When the line holds several commands (`;`, `&&`, `||`), the last one is used. When that
    /// command is a pipeline, only its **first** stage is parsed; later stages are discarded.
    pub fn parse(line: &str) -> Result<Command, ParseError> {
        debug!("Parsing command: {}", line);
        if line.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        let pipelines = split_pipelines(tokenize(line)?);
        let chosen = pipelines
            .into_iter()
            .rev()
            .find(|pipeline| !pipeline.is_empty())
            .and_then(|pipeline| pipeline.into_iter().next())
            .ok_or(ParseError::MissingCommandName)?;

        Self::parse_command(chosen)
    }

    fn parse_command(command: SimpleCommand) -> Result<Command, ParseError> {
        let mut words = command
            .words
            .into_iter()
            .skip_while(|word| ASSIGNMENT.is_match(word));
        let name = words.next().ok_or(ParseError::MissingCommandName)?;

        let mut args = Vec::new();
        for word in words {
            if LONG_OPT.is_match(&word) {
                // --debug --tags=test,test2
                args.extend(word.splitn(2, '=').map(str::to_string));
            } else if SHORT_OPT.is_match(&word) {
                // -a -am -cvf
                args.extend(word.chars().skip(1).map(|opt| format!("-{}", opt)));
            } else {
                args.push(word);
            }
        }

        Ok(Command::new(name, args))
    }
}

/// Group tokens into pipelines of simple commands. Empty commands are dropped.
fn split_pipelines(tokens: Vec<Token>) -> Vec<Vec<SimpleCommand>> {
    let mut pipelines = Vec::new();
    let mut pipeline = Vec::new();
    let mut current = SimpleCommand::default();
    let mut redirect_target = false;

    for token in tokens {
        match token {
            Token::Word(word) => {
                if std::mem::take(&mut redirect_target) {
                    continue;
                }
                current.words.push(word);
            }
            Token::Redirect(op) => {
                debug!("Ignored redirection {}", op);
                redirect_target = true;
            }
            Token::Pipe => {
                redirect_target = false;
                if !current.words.is_empty() {
                    pipeline.push(std::mem::take(&mut current));
                }
            }
            Token::Separator => {
                redirect_target = false;
                if !current.words.is_empty() {
                    pipeline.push(std::mem::take(&mut current));
                }
                if !pipeline.is_empty() {
                    pipelines.push(std::mem::take(&mut pipeline));
                }
            }
        }
    }
    if !current.words.is_empty() {
        pipeline.push(current);
    }
    if !pipeline.is_empty() {
        pipelines.push(pipeline);
    }
    pipelines
}
