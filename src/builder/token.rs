//! Placeholder token scanning.

use crate::error::MapperResult;

/// Finds `open ... close` tokens and replaces each with the handler's output.
///
/// A backslash before `open` escapes it; a backslash before `close` inside a
/// token keeps the close marker as part of the expression. An unterminated
/// token is copied through literally.
#[derive(Debug, Clone, Copy)]
pub struct GenericTokenParser {
    open: &'static str,
    close: &'static str,
}

impl GenericTokenParser {
    pub const fn new(open: &'static str, close: &'static str) -> Self {
        Self { open, close }
    }

    /// Parser for `#{...}` parameter placeholders.
    pub const fn parameters() -> Self {
        Self::new("#{", "}")
    }

    pub fn parse<F>(&self, text: &str, mut handler: F) -> MapperResult<String>
    where
        F: FnMut(&str) -> MapperResult<String>,
    {
        let Some(mut start) = text.find(self.open) else {
            return Ok(text.to_string());
        };
        let mut out = String::with_capacity(text.len());
        let mut offset = 0;

        loop {
            if start > 0 && text.as_bytes()[start - 1] == b'\\' {
                // escaped open marker: drop the backslash, keep the marker
                out.push_str(&text[offset..start - 1]);
                out.push_str(self.open);
                offset = start + self.open.len();
            } else {
                out.push_str(&text[offset..start]);
                let body_start = start + self.open.len();
                let mut expression = String::new();
                let mut cursor = body_start;
                let mut end = text[cursor..].find(self.close).map(|i| i + cursor);
                while let Some(e) = end {
                    if e > cursor && text.as_bytes()[e - 1] == b'\\' {
                        expression.push_str(&text[cursor..e - 1]);
                        expression.push_str(self.close);
                        cursor = e + self.close.len();
                        end = text[cursor..].find(self.close).map(|i| i + cursor);
                    } else {
                        expression.push_str(&text[cursor..e]);
                        break;
                    }
                }
                match end {
                    None => {
                        out.push_str(&text[start..]);
                        offset = text.len();
                    }
                    Some(e) => {
                        out.push_str(&handler(&expression)?);
                        offset = e + self.close.len();
                    }
                }
            }
            match text[offset..].find(self.open) {
                Some(next) => start = offset + next,
                None => break,
            }
        }
        if offset < text.len() {
            out.push_str(&text[offset..]);
        }
        Ok(out)
    }
}
