use std::io::{BufRead, Cursor, Stderr, StdinLock, Stdout, Write};

/// Abstracts stdin/stdout/stderr so commands can run against captured I/O.
///
/// Input is line-oriented (`BufRead`) because the chat loop reads one
/// question per line.
pub trait ConsoleIO<IN: BufRead, OUT: Write, ERR: Write> {
    fn stdin(&mut self) -> &mut IN;
    fn stdout(&mut self) -> &mut OUT;
    fn stderr(&mut self) -> &mut ERR;

    /// Next input line without its line terminator, `None` at end of input.
    fn read_line(&mut self) -> std::io::Result<Option<String>> {
        let mut line = String::new();
        if self.stdin().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }
}

/// Process stdin/stdout/stderr.
pub struct StdIO {
    stdin: StdinLock<'static>,
    stdout: Stdout,
    stderr: Stderr,
}

impl StdIO {
    pub fn new() -> Self {
        Self {
            stdin: std::io::stdin().lock(),
            stdout: std::io::stdout(),
            stderr: std::io::stderr(),
        }
    }
}

impl Default for StdIO {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleIO<StdinLock<'static>, Stdout, Stderr> for StdIO {
    fn stdin(&mut self) -> &mut StdinLock<'static> {
        &mut self.stdin
    }

    fn stdout(&mut self) -> &mut Stdout {
        &mut self.stdout
    }

    fn stderr(&mut self) -> &mut Stderr {
        &mut self.stderr
    }
}

/// Captured output and canned stdin, for tests.
pub struct BufferedIO {
    stdin: Cursor<Vec<u8>>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl BufferedIO {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stdin(data: &[u8]) -> Self {
        Self {
            stdin: Cursor::new(data.to_vec()),
            ..Self::default()
        }
    }

    pub fn stdout_to_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_to_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

impl Default for BufferedIO {
    fn default() -> Self {
        Self {
            stdin: Cursor::new(Vec::new()),
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }
}

impl ConsoleIO<Cursor<Vec<u8>>, Vec<u8>, Vec<u8>> for BufferedIO {
    fn stdin(&mut self) -> &mut Cursor<Vec<u8>> {
        &mut self.stdin
    }

    fn stdout(&mut self) -> &mut Vec<u8> {
        &mut self.stdout
    }

    fn stderr(&mut self) -> &mut Vec<u8> {
        &mut self.stderr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffered_io_captures_both_streams() {
        let mut io = BufferedIO::new();
        writeln!(io.stdout(), "answer").unwrap();
        writeln!(io.stderr(), "warning").unwrap();
        assert_eq!(io.stdout_to_string(), "answer\n");
        assert_eq!(io.stderr_to_string(), "warning\n");
    }

    #[test]
    fn read_line_strips_terminators() {
        let mut io = BufferedIO::with_stdin(b"first question\r\nsecond\nlast");
        assert_eq!(io.read_line().unwrap().as_deref(), Some("first question"));
        assert_eq!(io.read_line().unwrap().as_deref(), Some("second"));
        assert_eq!(io.read_line().unwrap().as_deref(), Some("last"));
        assert_eq!(io.read_line().unwrap(), None);
    }

    #[test]
    fn blank_line_is_not_end_of_input() {
        let mut io = BufferedIO::with_stdin(b"\nq\n");
        assert_eq!(io.read_line().unwrap().as_deref(), Some(""));
        assert_eq!(io.read_line().unwrap().as_deref(), Some("q"));
    }
}
