//! File-format interfaces: MPS and LP readers with content sniffing, and
//! MPS-style basis files.
//!
//! Readers take a text stream and produce a populated [`LinearProgram`]
//! together with the row/column name tables; failures carry the offending
//! line number.

pub mod basis;
pub mod lpf;
pub mod mps;

use derive_more::{Display, Error};

use crate::lp::LinearProgram;
use crate::settings::ObjSense;

#[derive(Debug, Display, Error, PartialEq)]
pub enum ParseError {
    #[display("parse error at line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[display("model error: {message}")]
    Model { message: String },
    #[display("i/o error: {message}")]
    Io { message: String },
}

impl ParseError {
    pub(crate) fn at(line: usize, message: impl Into<String>) -> Self {
        ParseError::Syntax {
            line,
            message: message.into(),
        }
    }
}

/// Row and column name tables filled by the readers and consumed by basis
/// I/O.
#[derive(Debug, Clone, Default)]
pub struct NameTables {
    pub rows: Vec<String>,
    pub cols: Vec<String>,
}

/// Recognized input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Mps,
    Lp,
}

/// Decides the format from the leading content: MPS files open with a
/// `NAME` (or section) card, LP files with an objective keyword.
pub fn sniff(text: &str) -> Result<Format, ParseError> {
    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('*') || line.starts_with('\\') {
            continue;
        }
        let word = line
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_ascii_uppercase();
        return match word.as_str() {
            "NAME" | "ROWS" | "OBJSENSE" => Ok(Format::Mps),
            "MINIMIZE" | "MAXIMIZE" | "MINIMISE" | "MAXIMISE" | "MIN" | "MAX" => Ok(Format::Lp),
            _ => Err(ParseError::at(
                lineno + 1,
                format!("unrecognized leading keyword '{}'", word),
            )),
        };
    }
    Err(ParseError::at(1, "empty input"))
}

/// Reads an LP from text, dispatching on the sniffed format.
///
/// `default_sense` applies when the format does not carry a sense of its
/// own (plain MPS).
pub fn read_str(
    text: &str,
    default_sense: ObjSense,
) -> Result<(LinearProgram, NameTables), ParseError> {
    match sniff(text)? {
        Format::Mps => mps::read(text, default_sense),
        Format::Lp => lpf::read(text),
    }
}

/// Reads an LP from a file path.
pub fn read_file(
    path: &str,
    default_sense: ObjSense,
) -> Result<(LinearProgram, NameTables), ParseError> {
    let text = std::fs::read_to_string(path).map_err(|e| ParseError::Io {
        message: format!("{}: {}", path, e),
    })?;
    read_str(&text, default_sense)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniffing() {
        assert_eq!(sniff("* comment\nNAME test\nROWS\n").unwrap(), Format::Mps);
        assert_eq!(sniff("\\ comment\nMINIMIZE\n obj: x\n").unwrap(), Format::Lp);
        assert_eq!(sniff("MAXIMISE\n obj: x\n").unwrap(), Format::Lp);
        assert!(matches!(
            sniff("GARBAGE\n"),
            Err(ParseError::Syntax { line: 1, .. })
        ));
    }
}
