/// Reusable receive buffer that splits device output into reply lines
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Next complete line, without its `\n` / `\r\n` terminator.
    pub fn pop_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let rest = self.buf.split_off(pos + 1);
        let line = std::mem::replace(&mut self.buf, rest);
        Some(decode_line(&line))
    }

    /// Release an unterminated tail that is exactly `token`.
    /// Some firmware omits the newline after the final `ok`.
    pub fn take_partial_with(&mut self, token: &str) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let tail = decode_line(&self.buf);
        if tail.trim() == token {
            self.buf.clear();
            Some(tail)
        } else {
            None
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}
