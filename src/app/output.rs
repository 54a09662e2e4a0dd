//! Console output sink with coloured severities

use std::io::{self, Write};

use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};

use crate::optimizer::OutputSink;

/// Writes optimizer messages to the console.
///
/// Normal messages use the terminal's default colour, highlights are
/// yellow and errors are red on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleOutput;

impl ConsoleOutput {
    fn write_line(out: &mut impl Write, color: Option<Color>, message: &str) -> io::Result<()> {
        match color {
            Some(color) => execute!(
                out,
                SetForegroundColor(color),
                Print(message),
                ResetColor,
                Print("\n")
            ),
            None => writeln!(out, "{}", message),
        }
    }

    fn emit(&self, color: Option<Color>, message: &str, to_stderr: bool) {
        let result = if to_stderr {
            Self::write_line(&mut io::stderr(), color, message)
        } else {
            Self::write_line(&mut io::stdout(), color, message)
        };

        if let Err(e) = result {
            log::debug!("Console write failed: {}", e);
        }
    }
}

impl OutputSink for ConsoleOutput {
    fn output(&self, message: &str) {
        self.emit(None, message, false);
    }

    fn output_highlight(&self, message: &str) {
        self.emit(Some(Color::Yellow), message, false);
    }

    fn output_error(&self, message: &str) {
        self.emit(Some(Color::Red), message, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_line() {
        let mut buffer = Vec::new();
        ConsoleOutput::write_line(&mut buffer, None, "ordinary1 : Normal -> Idle").unwrap();
        assert_eq!(buffer, b"ordinary1 : Normal -> Idle\n");
    }

    #[test]
    fn test_coloured_line_is_reset() {
        let mut buffer = Vec::new();
        ConsoleOutput::write_line(&mut buffer, Some(Color::Red), "failed").unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("failed"));
        assert!(text.ends_with('\n'));
    }
}
