use std::sync::LazyLock;

use regex::Regex;

use crate::{Environment, Resolved, Value, resolver::Scope};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"#\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Positional marker written in place of every `#{name}`.
pub const POSITIONAL_MARKER: char = '?';

/// Final query text and its arguments, one argument per marker, in marker order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResolvedQuery {
    sql: String,
    args: Vec<Value>,
}

impl ResolvedQuery {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.args)
    }

    fn push_fragment(&mut self, text: &str, lookup: impl Fn(&str) -> Value) {
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(text) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            self.sql.push_str(&text[last..whole.start()]);
            self.sql.push(POSITIONAL_MARKER);
            self.args.push(lookup(name.as_str()));
            last = whole.end();
        }
        self.sql.push_str(&text[last..]);
    }
}

/// Replaces the placeholders of resolved text with positional markers.
///
/// Text rendered for a `<foreach>` element reads that element's own environment first, so
/// every occurrence, repeated ones included, contributes exactly one argument.
pub fn extract(resolved: &Resolved<'_>) -> ResolvedQuery {
    let mut query = ResolvedQuery::default();
    for chunk in resolved.chunks() {
        let scope: &Scope<'_> = &chunk.scope;
        query.push_fragment(&chunk.text, |name| scope.value(name));
    }
    query
}

/// Like [`extract`] for plain text: every placeholder reads `env`, unbound names are null.
pub fn extract_text(text: &str, env: &Environment) -> ResolvedQuery {
    let mut query = ResolvedQuery::default();
    query.push_fragment(text, |name| env.value(name).cloned().unwrap_or_default());
    query
}
