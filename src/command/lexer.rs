// ABOUTME: Shell command line tokenizer
// Handles quoting, escapes, substitutions, control operators and redirections

use super::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A word with its quotes removed
    Word(String),
    /// `|`
    Pipe,
    /// `;`, `&`, `&&`, `||` or a newline
    Separator,
    /// A redirection operator, possibly with its io number (`2>`, `>>`, `&>`, `<`, ...)
    Redirect(String),
}

/// Split a command line into tokens.
///
/// Expansions (`$VAR`, `$(...)`, backticks) are kept verbatim inside their word. A `#` starting a
/// word comments out the rest of the line.
pub fn tokenize(line: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    let mut word = String::new();
    // Distinguishes `""` (an empty word) from no word at all
    let mut in_word = false;

    macro_rules! flush_word {
        () => {
            if in_word {
                tokens.push(Token::Word(std::mem::take(&mut word)));
                in_word = false;
            }
        };
    }

    while let Some(c) = chars.next() {
        match c {
            ' ' | '\t' | '\r' => flush_word!(),
            '\n' | ';' => {
                flush_word!();
                tokens.push(Token::Separator);
            }
            '#' if !in_word => {
                // Comment until end of line
                for next in chars.by_ref() {
                    if next == '\n' {
                        tokens.push(Token::Separator);
                        break;
                    }
                }
            }
            '|' => {
                flush_word!();
                if chars.peek() == Some(&'|') {
                    chars.next();
                    tokens.push(Token::Separator);
                } else {
                    if chars.peek() == Some(&'&') {
                        chars.next();
                    }
                    tokens.push(Token::Pipe);
                }
            }
            '&' => {
                flush_word!();
                match chars.peek() {
                    Some('&') => {
                        chars.next();
                        tokens.push(Token::Separator);
                    }
                    Some('>') => {
                        chars.next();
                        let mut op = String::from("&>");
                        if chars.peek() == Some(&'>') {
                            chars.next();
                            op.push('>');
                        }
                        tokens.push(Token::Redirect(op));
                    }
                    _ => tokens.push(Token::Separator),
                }
            }
            '>' | '<' => {
                // A word made only of digits right before the operator is its io number
                let mut op = if in_word && word.chars().all(|d| d.is_ascii_digit()) {
                    in_word = false;
                    std::mem::take(&mut word)
                } else {
                    flush_word!();
                    String::new()
                };
                op.push(c);
                while let Some(&next) = chars.peek() {
                    if next == '>' || next == '<' || next == '&' || next == '|' {
                        op.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Redirect(op));
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(next) => word.push(next),
                        None => return Err(ParseError::UnterminatedQuote('\'')),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped @ ('"' | '\\' | '$' | '`')) => word.push(escaped),
                            Some('\n') => {}
                            Some(other) => {
                                word.push('\\');
                                word.push(other);
                            }
                            None => return Err(ParseError::UnterminatedQuote('"')),
                        },
                        Some(next) => word.push(next),
                        None => return Err(ParseError::UnterminatedQuote('"')),
                    }
                }
            }
            '\\' => match chars.next() {
                Some('\n') => {}
                Some(escaped) => {
                    in_word = true;
                    word.push(escaped);
                }
                None => {}
            },
            '`' => {
                in_word = true;
                word.push('`');
                loop {
                    match chars.next() {
                        Some('`') => break,
                        Some(next) => word.push(next),
                        None => return Err(ParseError::UnterminatedQuote('`')),
                    }
                }
                word.push('`');
            }
            '$' if chars.peek() == Some(&'(') => {
                in_word = true;
                word.push('$');
                let mut depth = 0usize;
                for next in chars.by_ref() {
                    word.push(next);
                    match next {
                        '(' => depth += 1,
                        ')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                }
                if depth != 0 {
                    return Err(ParseError::UnterminatedQuote('('));
                }
            }
            other => {
                in_word = true;
                word.push(other);
            }
        }
    }
    flush_word!();

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn word(text: &str) -> Token {
        Token::Word(text.to_string())
    }

    #[test]
    fn test_quotes_are_removed() {
        assert_eq!(
            tokenize(r#"git commit -m "fix: the \"thing\"" 'it''s'"#).unwrap(),
            vec![word("git"), word("commit"), word("-m"), word(r#"fix: the "thing""#), word("its")]
        );
        assert_eq!(tokenize(r#"echo "" x"#).unwrap(), vec![word("echo"), word(""), word("x")]);
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            tokenize("cat a|grep b && ls; echo 2>err.log >>out").unwrap(),
            vec![
                word("cat"),
                word("a"),
                Token::Pipe,
                word("grep"),
                word("b"),
                Token::Separator,
                word("ls"),
                Token::Separator,
                word("echo"),
                Token::Redirect("2>".to_string()),
                word("err.log"),
                Token::Redirect(">>".to_string()),
                word("out"),
            ]
        );
    }

    #[test]
    fn test_substitutions_stay_in_word() {
        assert_eq!(
            tokenize("echo $(ls -l | wc -l) `whoami` $HOME/test").unwrap(),
            vec![word("echo"), word("$(ls -l | wc -l)"), word("`whoami`"), word("$HOME/test")]
        );
    }

    #[test]
    fn test_comment_and_escapes() {
        assert_eq!(
            tokenize(r"touch my\ file # create it").unwrap(),
            vec![word("touch"), word("my file")]
        );
        assert_eq!(tokenize("echo a#b").unwrap(), vec![word("echo"), word("a#b")]);
    }

    #[test]
    fn test_unterminated_quotes() {
        assert_eq!(tokenize("echo 'abc"), Err(ParseError::UnterminatedQuote('\'')));
        assert_eq!(tokenize("echo \"abc"), Err(ParseError::UnterminatedQuote('"')));
        assert_eq!(tokenize("echo $(ls"), Err(ParseError::UnterminatedQuote('(')));
    }
}
