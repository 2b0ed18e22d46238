/// Carry-over buffer for a newline-delimited body arriving in arbitrary chunks
///
/// Bytes are decoded as UTF-8 incrementally: a multi-byte character split
/// across two chunks is held back until it is complete, and invalid sequences
/// become U+FFFD instead of failing the stream.
#[derive(Debug, Default)]
pub struct LineBuffer {
    /// Decoded text after the last newline seen so far
    text: String,
    /// Trailing bytes of an incomplete UTF-8 sequence
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed, without the `\n`
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.decode(chunk);

        let Some(last_newline) = self.text.rfind('\n') else {
            return Vec::new();
        };

        let tail = self.text.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.text, tail);

        complete[..last_newline]
            .split('\n')
            .map(str::to_string)
            .collect()
    }

    /// Drain whatever is left once the body has ended
    ///
    /// Returns `None` when the remainder is only whitespace, so a body ending
    /// exactly on a newline yields no extra record.
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            self.pending.clear();
            self.text.push(char::REPLACEMENT_CHARACTER);
        }

        let rest = std::mem::take(&mut self.text);
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest)
        }
    }

    fn decode(&mut self, chunk: &[u8]) {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut input = bytes.as_slice();
        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    return;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    self.text.push_str(&String::from_utf8_lossy(valid));

                    match e.error_len() {
                        Some(invalid_len) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[invalid_len..];
                        }
                        None => {
                            // Incomplete sequence at the end of the chunk
                            self.pending = rest.to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }
}
