//! Line parsing for the text control protocol.
//!
//! A line is split at the first run of whitespace into a command token and an
//! optional argument. The token is lower-cased, a `?` anywhere in it marks a
//! query, and the remainder is split on `:` into path segments. The argument is
//! a number when it parses as one and free text otherwise (switch words, file
//! names, `min?`/`max?`).

/// Argument following the command token.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    /// Numeric argument
    Number(f64),
    /// Anything that is not a number; file names keep their case
    Text(String),
}

impl Argument {
    fn parse(raw: &str) -> Self {
        raw.parse::<f64>()
            .map(Argument::Number)
            .unwrap_or_else(|_| Argument::Text(raw.to_string()))
    }

    /// Lower-cased text argument, if textual.
    pub fn word(&self) -> Option<String> {
        match self {
            Argument::Text(text) => Some(text.to_lowercase()),
            Argument::Number(_) => None,
        }
    }
}

/// One parsed control line.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    /// Line as received, without surrounding whitespace
    pub original: String,
    /// Lower-cased path segments, `?` removed
    pub path: Vec<String>,
    /// The command token contained `?`
    pub query: bool,
    /// Optional argument
    pub argument: Option<Argument>,
}

impl ParsedLine {
    /// Parse `line`. Returns `None` for blank lines.
    pub fn parse(line: &str) -> Option<Self> {
        let original = line.trim();
        if original.is_empty() {
            return None;
        }

        let (token, rest) = match original.split_once(char::is_whitespace) {
            Some((token, rest)) => (token, rest.trim()),
            None => (original, ""),
        };
        let token = token.to_lowercase();
        let query = token.contains('?');
        let path = token
            .replace('?', "")
            .split(':')
            .map(str::to_string)
            .collect();
        let argument = (!rest.is_empty()).then(|| Argument::parse(rest));

        Some(Self {
            original: original.to_string(),
            path,
            query,
            argument,
        })
    }

    /// Colon-joined lookup key, e.g. `w1:freq`.
    pub fn key(&self) -> String {
        self.path.join(":")
    }

    /// Whether the line asks for a reply: a `?` in the token or a `min?`/`max?`
    /// style argument.
    pub fn is_query(&self) -> bool {
        self.query
            || matches!(&self.argument, Some(Argument::Text(text)) if text.ends_with('?'))
    }
}
