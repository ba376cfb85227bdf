//! CK-005: Diagnostics with named substitutions.
//!
//! The core never formats user messages itself. It fills a [`SubContext`]
//! with structured values (`File_Name`, `Number`, `MeSsaGe`, capture names)
//! and hands a template to [`Diagnostics::report`].

use super::position::ExprPosition;
use parking_lot::Mutex;

/// Named substitution values for one message.
#[derive(Debug, Clone, Default)]
pub struct SubContext {
    vars: Vec<(String, String)>,
}

/// Names compare case-insensitively with underscores ignored, so
/// `File_Name`, `filename` and `FILE_NAME` are the same variable.
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

impl SubContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_string(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        let key = normalize(name);
        let value = value.into();
        match self.vars.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.vars.push((key, value)),
        }
        self
    }

    pub fn set_long(&mut self, name: &str, value: i64) -> &mut Self {
        self.set_string(name, value.to_string())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        let key = normalize(name);
        self.vars
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Expand `$name` and `${name}` in `template`. `$$` is a literal dollar;
    /// unknown names are left in place.
    pub fn substitute(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let bytes = template.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] != b'$' {
                let ch_len = template[i..].chars().next().map_or(1, char::len_utf8);
                out.push_str(&template[i..i + ch_len]);
                i += ch_len;
                continue;
            }
            if bytes.get(i + 1) == Some(&b'$') {
                out.push('$');
                i += 2;
                continue;
            }
            let (name, consumed) = if bytes.get(i + 1) == Some(&b'{') {
                match template[i + 2..].find('}') {
                    Some(end) => (&template[i + 2..i + 2 + end], end + 3),
                    None => ("", 0),
                }
            } else {
                let len = template[i + 1..]
                    .bytes()
                    .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
                    .count();
                (&template[i + 1..i + 1 + len], len + 1)
            };
            match (consumed, self.get(name)) {
                (n, Some(value)) if n > 1 && !name.is_empty() => {
                    out.push_str(value);
                    i += n;
                }
                _ => {
                    out.push('$');
                    i += 1;
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub severity: Severity,
    pub text: String,
}

/// Collects rendered messages for the final report.
#[derive(Debug, Default)]
pub struct Diagnostics {
    messages: Mutex<Vec<Message>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report an error. With a known position the message is rendered as
    /// `$filename: $number: $message`.
    pub fn report(&self, pos: Option<&ExprPosition>, scp: &SubContext, template: &str) {
        let text = render(pos, scp, template);
        tracing::error!("{}", text);
        self.messages.lock().push(Message {
            severity: Severity::Error,
            text,
        });
    }

    pub fn warn(&self, pos: Option<&ExprPosition>, scp: &SubContext, template: &str) {
        let text = render(pos, scp, template);
        tracing::warn!("{}", text);
        self.messages.lock().push(Message {
            severity: Severity::Warning,
            text,
        });
    }

    pub fn error_count(&self) -> usize {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.severity == Severity::Error)
            .count()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// Take every collected message, leaving the collector empty.
    pub fn drain(&self) -> Vec<Message> {
        std::mem::take(&mut *self.messages.lock())
    }
}

fn render(pos: Option<&ExprPosition>, scp: &SubContext, template: &str) -> String {
    let mut scp = scp.clone();
    scp.set_string("MeSsaGe", scp.substitute(template));
    match pos.and_then(|p| p.file.as_ref().map(|f| (f, p.line))) {
        Some((file, line)) => {
            scp.set_string("File_Name", file.as_str());
            scp.set_long("Number", i64::from(line));
            scp.substitute("$filename: $number: $message")
        }
        None => scp.substitute("$message"),
    }
}
