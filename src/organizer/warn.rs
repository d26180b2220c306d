/// Values become single tokens: whitespace runs turn into `_`, control and
/// non-ASCII characters are dropped, and an empty result reads `na`.
fn token(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for word in value.split_ascii_whitespace() {
        let kept = word
            .chars()
            .filter(char::is_ascii_graphic)
            .collect::<String>();
        if kept.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('_');
        }
        out.push_str(&kept);
    }
    if out.is_empty() {
        "na".to_string()
    } else {
        out
    }
}

/// A stderr incident line for things that need a human: escapes, torn
/// ledgers, files that moved without a journal entry.
#[derive(Debug, Clone)]
pub struct Incident {
    code: &'static str,
    fields: Vec<(&'static str, String)>,
}

impl Incident {
    pub fn new(code: &'static str) -> Self {
        Self {
            code,
            fields: Vec::new(),
        }
    }

    pub fn with(mut self, key: &'static str, value: impl AsRef<str>) -> Self {
        self.fields.push((key, token(value.as_ref())));
        self
    }

    pub fn line(&self) -> String {
        let mut line = format!("ORGANIZER_WARN code={}", token(self.code));
        for (key, value) in &self.fields {
            line.push(' ');
            line.push_str(key);
            line.push('=');
            line.push_str(value);
        }
        line
    }

    pub fn emit(&self) {
        eprintln!("{}", self.line());
    }
}
