//! Status lines printed by the subcommands

use colored::{ColoredString, Colorize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Done,
    Failed,
    Note,
    Caution,
}

impl Status {
    fn marker(self) -> ColoredString {
        match self {
            Status::Done => "✓".green(),
            Status::Failed => "✗".red(),
            Status::Note => "ℹ".blue(),
            Status::Caution => "⚠".yellow(),
        }
    }
}

fn line(status: Status, msg: &str) -> String {
    format!("{} {}", status.marker(), msg)
}

/// A step that completed, such as a created index or a written rollup.
pub fn success(msg: &str) {
    println!("{}", line(Status::Done, msg));
}

/// Fatal errors go to stderr so `--json` output stays parseable.
pub fn error(msg: &str) {
    eprintln!("{}", line(Status::Failed, msg));
}

pub fn info(msg: &str) {
    println!("{}", line(Status::Note, msg));
}

/// Something the operator should look at, e.g. an unacknowledged index or skipped groups.
pub fn warning(msg: &str) {
    println!("{}", line(Status::Caution, msg));
}
