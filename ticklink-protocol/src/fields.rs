//! Field reader for `:`-delimited lines
//!
//! Every field is yielded with its byte offset inside the line so that a
//! handler can report the exact position of a malformed field.

/// Field delimiter
pub const FIELD_SEP: char = ':';

/// Errors raised while decoding a single field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FieldError {
    /// Field is missing or malformed at the given offset
    Syntax { offset: usize },
    /// Field value does not fit its range at the given offset
    Overflow { offset: usize },
}

impl FieldError {
    /// Byte offset inside the line
    pub fn offset(&self) -> usize {
        match *self {
            FieldError::Syntax { offset } | FieldError::Overflow { offset } => offset,
        }
    }
}

/// One field of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field<'a> {
    /// Raw field text
    pub text: &'a str,
    /// Byte offset of the first character inside the line
    pub offset: usize,
}

impl<'a> Field<'a> {
    /// Syntax error located at this field
    pub fn syntax(&self) -> FieldError {
        FieldError::Syntax {
            offset: self.offset,
        }
    }

    /// Range error located at this field
    pub fn overflow(&self) -> FieldError {
        FieldError::Overflow {
            offset: self.offset,
        }
    }

    /// Decode as hexadecimal `u8`
    pub fn hex_u8(&self) -> Result<u8, FieldError> {
        let value = parse_hex(self.text, 2).map_err(|e| e.at(self.offset))?;
        Ok(value as u8)
    }

    /// Decode as hexadecimal `u16`
    pub fn hex_u16(&self) -> Result<u16, FieldError> {
        let value = parse_hex(self.text, 4).map_err(|e| e.at(self.offset))?;
        Ok(value as u16)
    }

    /// Decode as a single-digit channel index below `limit`
    ///
    /// A digit at or above `limit` is an overflow, anything else a syntax
    /// error.
    pub fn index(&self, limit: u8) -> Result<u8, FieldError> {
        let mut chars = self.text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => match c.to_digit(10) {
                Some(d) if (d as u8) < limit => Ok(d as u8),
                Some(_) => Err(self.overflow()),
                None => Err(self.syntax()),
            },
            _ => Err(self.syntax()),
        }
    }

    /// Case-insensitive single character
    pub fn single_char(&self) -> Result<char, FieldError> {
        let mut chars = self.text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c.to_ascii_lowercase()),
            _ => Err(self.syntax()),
        }
    }
}

/// Relative hex decoding error, located once the field offset is known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HexError {
    Syntax(usize),
    Overflow(usize),
}

impl HexError {
    pub(crate) fn at(self, base: usize) -> FieldError {
        match self {
            HexError::Syntax(rel) => FieldError::Syntax { offset: base + rel },
            HexError::Overflow(rel) => FieldError::Overflow { offset: base + rel },
        }
    }
}

/// Parse up to `max_digits` hexadecimal digits
pub(crate) fn parse_hex(text: &str, max_digits: usize) -> Result<u32, HexError> {
    if text.is_empty() {
        return Err(HexError::Syntax(0));
    }
    let mut value: u32 = 0;
    for (i, c) in text.char_indices() {
        let digit = c.to_digit(16).ok_or(HexError::Syntax(i))?;
        if i >= max_digits {
            return Err(HexError::Overflow(i));
        }
        value = (value << 4) | digit;
    }
    Ok(value)
}

/// Iterator over the fields of one line
///
/// The first field is the command or response name.
#[derive(Debug, Clone)]
pub struct Fields<'a> {
    line: &'a str,
    pos: usize,
    done: bool,
}

impl<'a> Fields<'a> {
    /// Split `line` into fields
    pub fn new(line: &'a str) -> Self {
        Self {
            line,
            pos: 0,
            done: false,
        }
    }

    /// Offset just past the last consumed field
    ///
    /// Used to report a missing field at the end of the line.
    pub fn offset(&self) -> usize {
        self.pos.min(self.line.len())
    }

    /// Next field, or a syntax error at the end of the line if none is left
    pub fn require(&mut self) -> Result<Field<'a>, FieldError> {
        let offset = self.offset();
        self.next().ok_or(FieldError::Syntax { offset })
    }

    /// Fail with a syntax error if any field is left
    pub fn finish(&mut self) -> Result<(), FieldError> {
        match self.next() {
            Some(extra) => Err(extra.syntax()),
            None => Ok(()),
        }
    }

    /// True once every field has been consumed
    pub fn is_empty(&self) -> bool {
        self.done
    }

    /// The unconsumed tail of the line, without the leading separator
    pub fn rest(&self) -> Option<&'a str> {
        if self.done {
            None
        } else {
            Some(&self.line[self.pos..])
        }
    }
}

impl<'a> Iterator for Fields<'a> {
    type Item = Field<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let start = self.pos;
        let tail = &self.line[start..];
        match tail.find(FIELD_SEP) {
            Some(idx) => {
                self.pos = start + idx + 1;
                Some(Field {
                    text: &tail[..idx],
                    offset: start,
                })
            }
            None => {
                self.done = true;
                self.pos = self.line.len();
                Some(Field {
                    text: tail,
                    offset: start,
                })
            }
        }
    }
}
