// ABOUTME: TTY log marker emitted by the shell prompt hook and the line splitter that extracts it
// The marker is the authoritative "a command just finished" signal

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Prefix of every marker line.
pub const TTYLOG_PREFIX: &str = "ttylog";

/// Environment injected in the attached shell so that every prompt cycle prints a marker line.
pub const PROMPT_COMMAND_ENV: &str = r##"PROMPT_COMMAND=RETRN_VAL=$?;echo "ttylog#$(whoami)#$(history 1 | sed "s/^[ ]*[0-9]\+[ ]*//" )#$RETRN_VAL#$(pwd)""##;

lazy_static! {
    static ref MARKER: Regex =
        Regex::new(r"^ttylog#(?P<user>[^#]*)#(?P<cmd>.*)#(?P<exit_code>-?\d+)#(?P<workdir>/.*)$").unwrap();
}

/// One finished command, as reported by the shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtyLog {
    pub user: String,
    pub cmd: String,
    pub exit_code: i32,
    pub workdir: String,
}

impl TtyLog {
    /// Parse `ttylog#<user>#<cmd>#<exitCode>#<workdir>`.
    ///
    /// The user ends at the first `#`. The exit code is the rightmost `#<digits>#/` group, so
    /// both the command and the working directory may contain `#`. A working directory that
    /// itself contains `#<digits>#/` is still misread.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let Some(captures) = MARKER.captures(line) else {
            if line.starts_with(TTYLOG_PREFIX) {
                warn!("Malformed ttylog marker: {:?}", line);
            }
            return None;
        };

        let exit_code = match captures["exit_code"].parse::<i32>() {
            Ok(code) => code,
            Err(e) => {
                warn!("Exit code out of range in ttylog marker: {}", e);
                return None;
            }
        };

        Some(Self {
            user: captures["user"].to_string(),
            cmd: captures["cmd"].trim().to_string(),
            exit_code,
            workdir: captures["workdir"].to_string(),
        })
    }
}

/// What a chunk of raw shell output turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellLine {
    /// Terminal data to display
    Show(String),
    /// A command completed
    TtyLog(TtyLog),
}

/// Splits raw shell output into display lines and ttylog markers.
///
/// Display pieces are forwarded as soon as they arrive, without their `\n`. A trailing piece that
/// is, or could still become, a marker line is held back until its line is complete.
#[derive(Debug, Default)]
pub struct TtyLogSplitter {
    pending: String,
    seen_first_marker: bool,
}

impl TtyLogSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) -> Vec<ShellLine> {
        let mut data = std::mem::take(&mut self.pending);
        data.push_str(chunk);

        let mut lines = Vec::new();
        let mut pieces = data.split('\n').peekable();
        while let Some(piece) = pieces.next() {
            let is_last = pieces.peek().is_none();

            if is_last && may_be_marker(piece) {
                // Marker line not terminated yet, or cut inside the prefix
                self.pending = piece.to_string();
                break;
            }
            if piece.starts_with(TTYLOG_PREFIX) {
                self.marker(piece, &mut lines);
            } else if !(is_last && piece.is_empty()) {
                lines.push(ShellLine::Show(piece.to_string()));
            }
        }
        lines
    }

    fn marker(&mut self, piece: &str, lines: &mut Vec<ShellLine>) {
        if !self.seen_first_marker {
            // The first prompt reports a history entry that was not typed in this session
            self.seen_first_marker = true;
            debug!("Skipping initial ttylog marker");
            return;
        }
        match TtyLog::parse(piece) {
            Some(ttylog) => lines.push(ShellLine::TtyLog(ttylog)),
            None => lines.push(ShellLine::Show(piece.to_string())),
        }
    }
}

fn may_be_marker(piece: &str) -> bool {
    !piece.is_empty() && (piece.starts_with(TTYLOG_PREFIX) || TTYLOG_PREFIX.starts_with(piece))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ttylog(cmd: &str, exit_code: i32, workdir: &str) -> ShellLine {
        ShellLine::TtyLog(TtyLog {
            user: "root".to_string(),
            cmd: cmd.to_string(),
            exit_code,
            workdir: workdir.to_string(),
        })
    }

    #[test]
    fn test_parse_marker() {
        let parsed = TtyLog::parse("ttylog#root#ls -l#0#/root\r").unwrap();
        assert_eq!(parsed.user, "root");
        assert_eq!(parsed.cmd, "ls -l");
        assert_eq!(parsed.exit_code, 0);
        assert_eq!(parsed.workdir, "/root");
    }

    #[test]
    fn test_parse_marker_with_hash_in_command() {
        let parsed = TtyLog::parse("ttylog#root#echo '#1' # note#127#/tmp").unwrap();
        assert_eq!(parsed.cmd, "echo '#1' # note");
        assert_eq!(parsed.exit_code, 127);
        assert_eq!(parsed.workdir, "/tmp");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(TtyLog::parse("ttylog#root").is_none());
        assert!(TtyLog::parse("ttylog#root#ls#zero#/").is_none());
        assert!(TtyLog::parse("hello").is_none());
    }

    #[test]
    fn test_first_marker_is_skipped() {
        let mut splitter = TtyLogSplitter::new();
        let lines = splitter.push("ttylog#root#old#0#/\r\nroot@box:/# ");
        assert_eq!(lines, vec![ShellLine::Show("root@box:/# ".to_string())]);

        let lines = splitter.push("ls\r\nfile.txt\r\nttylog#root#ls#0#/\r\n");
        assert_eq!(
            lines,
            vec![
                ShellLine::Show("ls\r".to_string()),
                ShellLine::Show("file.txt\r".to_string()),
                ttylog("ls", 0, "/"),
            ]
        );
    }

    #[test]
    fn test_marker_split_across_chunks() {
        let mut splitter = TtyLogSplitter::new();
        splitter.push("ttylog#root#boot#0#/\n");

        assert!(splitter.push("ttylog#root#touch a#1#/ro").is_empty());
        let lines = splitter.push("ot\nprompt$ ");
        assert_eq!(
            lines,
            vec![ttylog("touch a", 1, "/root"), ShellLine::Show("prompt$ ".to_string())]
        );
    }

    #[test]
    fn test_marker_cut_inside_prefix() {
        let mut splitter = TtyLogSplitter::new();
        splitter.push("ttylog#root#boot#0#/\n");

        assert_eq!(
            splitter.push("file.txt\nttyl"),
            vec![ShellLine::Show("file.txt".to_string())]
        );
        let lines = splitter.push("og#root#ls#0#/root\nprompt$ ");
        assert_eq!(
            lines,
            vec![ttylog("ls", 0, "/root"), ShellLine::Show("prompt$ ".to_string())]
        );

        // A held fragment that turns out to be plain output is still shown
        assert!(splitter.push("t").is_empty());
        assert_eq!(splitter.push("ea\n"), vec![ShellLine::Show("tea".to_string())]);
    }

    #[test]
    fn test_parse_marker_with_hash_in_workdir() {
        let parsed = TtyLog::parse("ttylog#root#cd 'a#b'#0#/root/a#b").unwrap();
        assert_eq!(parsed.cmd, "cd 'a#b'");
        assert_eq!(parsed.exit_code, 0);
        assert_eq!(parsed.workdir, "/root/a#b");
    }

    #[test]
    fn test_prompt_env_contains_marker() {
        assert!(PROMPT_COMMAND_ENV.starts_with("PROMPT_COMMAND="));
        assert!(PROMPT_COMMAND_ENV.contains("ttylog#$(whoami)#"));
    }
}
