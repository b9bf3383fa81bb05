//! Text payloads: `NAME|arg|arg`.

use super::TextCommand;

/// Separator between the command name and each argument.
pub const FIELD_SEPARATOR: char = '|';

/// Argument fields of a text command, in wire order.
///
/// The command name itself is not part of the payload; it is consumed
/// into the [`TextCommand`] routing key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextPayload {
    fields: Vec<String>,
}

impl TextPayload {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    /// Build from anything that yields string-like fields.
    pub fn from_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Split a text frame into its command and argument fields.
    ///
    /// An empty string yields `Unknown` with no arguments.
    pub fn parse(text: &str) -> (TextCommand, TextPayload) {
        let mut parts = text.split(FIELD_SEPARATOR);
        let name = parts.next().unwrap_or_default();
        let fields = parts.map(str::to_owned).collect();
        (TextCommand::parse(name), TextPayload { fields })
    }

    /// Append `NAME|arg|arg` to `out`.
    pub fn write_to(&self, command: TextCommand, out: &mut String) {
        out.push_str(command.name());
        for field in &self.fields {
            out.push(FIELD_SEPARATOR);
            out.push_str(field);
        }
    }

    /// Encode `NAME|arg|arg` into a new string.
    pub fn to_wire(&self, command: TextCommand) -> String {
        let mut out = String::new();
        self.write_to(command, &mut out);
        out
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    /// Parse a field as a number, `None` if missing or malformed.
    pub fn get_parsed<T: std::str::FromStr>(&self, index: usize) -> Option<T> {
        self.get(index).and_then(|s| s.parse().ok())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Add an argument.
    pub fn push(&mut self, field: impl Into<String>) -> &mut Self {
        self.fields.push(field.into());
        self
    }

    /// Add a value rendered with `Display`.
    pub fn push_display(&mut self, value: impl std::fmt::Display) -> &mut Self {
        self.fields.push(value.to_string());
        self
    }
}
