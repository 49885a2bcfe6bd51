//! Parsing of `<if>` / `<foreach>` markup into a [`Template`] tree.
//!
//! Anything that is not one of the two directive tags (SQL `<`, `<>`, `<=` included) is kept
//! as text. A parsed template is immutable and can be shared between threads.

use std::sync::LazyLock;

use regex::Regex;

use crate::{Error, Operator, Value};

static OPERATOR_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"'[^']*'|"[^"]*"|==|!=|&lt;=|&gt;=|&lt;|&gt;|<=|>=|<|>"#)
        .expect("operator pattern is valid")
});

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Directive(Directive),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Conditional { test: Condition, body: Vec<Node> },
    Repeat(Repeat),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Repeat {
    pub item: String,
    pub collection: String,
    pub open: String,
    pub separator: String,
    pub close: String,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Literal(bool),
    Compare {
        op: Operator,
        left: Operand,
        right: Operand,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    /// Looked up in the environment; unbound names are null.
    Ident(String),
}

impl Condition {
    /// Parses the content of a `test` attribute.
    pub fn parse(test: &str) -> Result<Self, Error> {
        match test.trim() {
            "true" => return Ok(Condition::Literal(true)),
            "false" => return Ok(Condition::Literal(false)),
            _ => {}
        }

        let operators: Vec<_> = OPERATOR_TOKEN
            .find_iter(test)
            .filter(|m| !m.as_str().starts_with(['\'', '"']))
            .collect();
        let [m] = operators.as_slice() else {
            return Err(Error::configuration(format!(
                "test `{test}` must contain exactly one comparison operator, found {}",
                operators.len()
            )));
        };
        let op = Operator::parse(m.as_str()).ok_or_else(|| {
            Error::configuration(format!("unknown operator `{}` in `{test}`", m.as_str()))
        })?;

        Ok(Condition::Compare {
            op,
            left: Operand::parse(&test[..m.start()], test)?,
            right: Operand::parse(&test[m.end()..], test)?,
        })
    }
}

impl Operand {
    fn parse(token: &str, test: &str) -> Result<Self, Error> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::configuration(format!("missing operand in `{test}`")));
        }
        let quoted = token.len() >= 2
            && ((token.starts_with('\'') && token.ends_with('\''))
                || (token.starts_with('"') && token.ends_with('"')));
        let operand = match token {
            _ if quoted => Operand::Literal(Value::Text(token[1..token.len() - 1].to_string())),
            "null" | "nil" => Operand::Literal(Value::Null),
            "true" => Operand::Literal(Value::Bool(true)),
            "false" => Operand::Literal(Value::Bool(false)),
            _ if IDENTIFIER.is_match(token) => Operand::Ident(token.to_string()),
            _ if token.contains(|c: char| {
                c.is_whitespace() || matches!(c, '=' | '!' | '<' | '>' | '\'' | '"')
            }) =>
            {
                return Err(Error::configuration(format!(
                    "malformed operand `{token}` in `{test}`"
                )));
            }
            // numbers and other bare words compare as text
            _ => Operand::Literal(Value::Text(token.to_string())),
        };
        Ok(operand)
    }
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    /// Normalizes whitespace and parses every directive, nested ones included.
    pub fn parse(src: &str) -> Result<Self, Error> {
        let normalized = collapse_whitespace(src);
        let mut parser = Parser {
            src: &normalized,
            pos: 0,
        };
        let nodes = parser.nodes(None)?;
        Ok(Self { nodes })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// `true` when the template contains no directive at all.
    pub fn is_static(&self) -> bool {
        self.nodes.iter().all(|n| matches!(n, Node::Text(_)))
    }
}

/// Collapses whitespace runs (newlines included) into one space and trims both ends.
///
/// Runs before parsing, so quoted test literals are collapsed too: `s == 'x  y'` compares
/// against `x y`.
pub fn collapse_whitespace(src: &str) -> String {
    src.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagName {
    If,
    Foreach,
}

impl TagName {
    fn as_str(&self) -> &'static str {
        match self {
            TagName::If => "if",
            TagName::Foreach => "foreach",
        }
    }
}

enum Tag {
    Open(TagName),
    Close(TagName, usize),
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn nodes(&mut self, closing: Option<TagName>) -> Result<Vec<Node>, Error> {
        let mut nodes = Vec::new();
        loop {
            let Some((start, tag)) = self.next_tag() else {
                push_text(&mut nodes, &self.src[self.pos..]);
                self.pos = self.src.len();
                return match closing {
                    Some(name) => Err(Error::configuration(format!(
                        "<{}> is never closed",
                        name.as_str()
                    ))),
                    None => Ok(nodes),
                };
            };
            push_text(&mut nodes, &self.src[self.pos..start]);
            match tag {
                Tag::Open(name) => {
                    self.pos = start + 1 + name.as_str().len();
                    let directive = self.directive(name)?;
                    nodes.push(Node::Directive(directive));
                }
                Tag::Close(name, len) => {
                    self.pos = start + len;
                    return match closing {
                        Some(open) if open == name => Ok(nodes),
                        _ => Err(Error::configuration(format!(
                            "unexpected </{}> at offset {start}",
                            name.as_str()
                        ))),
                    };
                }
            }
        }
    }

    /// Finds the next directive tag at or after `pos`.
    fn next_tag(&self) -> Option<(usize, Tag)> {
        let rest = &self.src[self.pos..];
        rest.match_indices('<')
            .find_map(|(i, _)| tag_at(&rest[i..]).map(|tag| (self.pos + i, tag)))
    }

    fn directive(&mut self, name: TagName) -> Result<Directive, Error> {
        let (attrs, self_closing) = self.attributes(name)?;
        let body = if self_closing {
            Vec::new()
        } else {
            self.nodes(Some(name))?
        };
        let mut attrs = Attributes(attrs);
        let directive = match name {
            TagName::If => {
                let test = attrs.required(name, "test")?;
                Directive::Conditional {
                    test: Condition::parse(&test)?,
                    body,
                }
            }
            TagName::Foreach => Directive::Repeat(Repeat {
                collection: attrs.required(name, "collection")?,
                item: attrs.optional("item"),
                open: attrs.optional("open"),
                separator: attrs.optional("separator"),
                close: attrs.optional("close"),
                body,
            }),
        };
        attrs.finish(name)?;
        Ok(directive)
    }

    /// Reads `name="value"` pairs up to the closing `>` of an opening tag.
    fn attributes(&mut self, tag: TagName) -> Result<(Vec<(String, String)>, bool), Error> {
        let mut attrs: Vec<(String, String)> = Vec::new();
        let malformed = |pos: usize| {
            Error::configuration(format!(
                "malformed <{}> attributes at offset {pos}",
                tag.as_str()
            ))
        };
        loop {
            self.skip_whitespace();
            let rest = &self.src[self.pos..];
            if rest.starts_with('>') {
                self.pos += 1;
                return Ok((attrs, false));
            }
            if rest.starts_with("/>") {
                self.pos += 2;
                return Ok((attrs, true));
            }

            let name_len = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
                .unwrap_or(rest.len());
            if name_len == 0 {
                return Err(malformed(self.pos));
            }
            let name = rest[..name_len].to_string();
            self.pos += name_len;

            self.skip_whitespace();
            if !self.src[self.pos..].starts_with('=') {
                return Err(malformed(self.pos));
            }
            self.pos += 1;
            self.skip_whitespace();

            let rest = &self.src[self.pos..];
            let quote = match rest.chars().next() {
                Some(q @ ('"' | '\'')) => q,
                _ => return Err(malformed(self.pos)),
            };
            let Some(len) = rest[1..].find(quote) else {
                return Err(malformed(self.pos));
            };
            let value = unescape(&rest[1..1 + len]);
            self.pos += len + 2;

            if attrs.iter().any(|(n, _)| *n == name) {
                return Err(Error::configuration(format!(
                    "duplicate attribute `{name}` on <{}>",
                    tag.as_str()
                )));
            }
            attrs.push((name, value));
        }
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.src[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }
}

struct Attributes(Vec<(String, String)>);

impl Attributes {
    fn take(&mut self, key: &str) -> Option<String> {
        let i = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(i).1)
    }

    fn required(&mut self, tag: TagName, key: &str) -> Result<String, Error> {
        self.take(key).ok_or_else(|| {
            Error::configuration(format!("<{}> requires a `{key}` attribute", tag.as_str()))
        })
    }

    fn optional(&mut self, key: &str) -> String {
        self.take(key).unwrap_or_default()
    }

    fn finish(self, tag: TagName) -> Result<(), Error> {
        match self.0.first() {
            Some((key, _)) => Err(Error::configuration(format!(
                "unsupported attribute `{key}` on <{}>",
                tag.as_str()
            ))),
            None => Ok(()),
        }
    }
}

fn tag_at(s: &str) -> Option<Tag> {
    for name in [TagName::If, TagName::Foreach] {
        let open = &s[1..];
        if let Some(after) = open.strip_prefix(name.as_str())
            && after.starts_with(|c: char| c.is_whitespace() || c == '>' || c == '/')
        {
            return Some(Tag::Open(name));
        }
        if let Some(after) = s
            .strip_prefix("</")
            .and_then(|r| r.strip_prefix(name.as_str()))
        {
            let trimmed = after.trim_start();
            if trimmed.starts_with('>') {
                let len = s.len() - trimmed.len() + 1;
                return Some(Tag::Close(name, len));
            }
        }
    }
    None
}

fn push_text(nodes: &mut Vec<Node>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Node::Text(prev)) = nodes.last_mut() {
        prev.push_str(text);
    } else {
        nodes.push(Node::Text(text.to_string()));
    }
}

fn unescape(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Node {
        Node::Text(s.to_string())
    }

    #[test]
    fn test_plain_text() {
        let t = Template::parse("SELECT *\n  FROM t\tWHERE a <> 1 AND b <= 2 ").unwrap();
        assert!(t.is_static());
        assert_eq!(
            t.nodes(),
            &[text("SELECT * FROM t WHERE a <> 1 AND b <= 2")]
        );
    }

    #[test]
    fn test_nested_directives() {
        let t = Template::parse(
            r#"a <if test="x != null">b <foreach item="v" collection="ids" open="(" separator="," close=")">#{v}</foreach></if> c"#,
        )
        .unwrap();
        let Node::Directive(Directive::Conditional { test, body }) = &t.nodes()[1] else {
            panic!("expected <if>");
        };
        assert_eq!(
            test,
            &Condition::Compare {
                op: Operator::Ne,
                left: Operand::Ident("x".into()),
                right: Operand::Literal(Value::Null),
            }
        );
        let Node::Directive(Directive::Repeat(r)) = &body[1] else {
            panic!("expected <foreach>");
        };
        assert_eq!(r.collection, "ids");
        assert_eq!(r.separator, ",");
        assert_eq!(r.body, vec![text("#{v}")]);
        assert_eq!(t.nodes()[2], text(" c"));
    }

    #[test]
    fn test_conditions() {
        assert_eq!(Condition::parse(" true ").unwrap(), Condition::Literal(true));
        assert_eq!(
            Condition::parse("age &gt; 18").unwrap(),
            Condition::Compare {
                op: Operator::Gt,
                left: Operand::Ident("age".into()),
                right: Operand::Literal(Value::Text("18".into())),
            }
        );
        assert_eq!(
            Condition::parse("name == 'a<b'").unwrap(),
            Condition::Compare {
                op: Operator::Eq,
                left: Operand::Ident("name".into()),
                right: Operand::Literal(Value::Text("a<b".into())),
            }
        );
    }

    #[test]
    fn test_escaped_attribute_operator() {
        let t = Template::parse(r#"<if test="a &lt;= 3">x</if>"#).unwrap();
        let Node::Directive(Directive::Conditional { test, .. }) = &t.nodes()[0] else {
            panic!("expected <if>");
        };
        assert!(matches!(test, Condition::Compare { op: Operator::Le, .. }));
    }

    #[test]
    fn test_operator_count_errors() {
        assert!(Condition::parse("flag").unwrap_err().is_configuration());
        assert!(Condition::parse("a < b < c").unwrap_err().is_configuration());
        assert!(Condition::parse("== 1").unwrap_err().is_configuration());
    }

    #[test]
    fn test_malformed_operands() {
        for test in ["a => b", "a =< b", "a b == c", "x == a!"] {
            let err = Condition::parse(test).unwrap_err();
            assert!(err.is_configuration(), "{test}: {err}");
        }
        assert_eq!(
            Condition::parse("n >= -1.5").unwrap(),
            Condition::Compare {
                op: Operator::Ge,
                left: Operand::Ident("n".into()),
                right: Operand::Literal(Value::Text("-1.5".into())),
            }
        );
    }

    #[test]
    fn test_quoted_literal_whitespace_collapses() {
        let t = Template::parse("<if test=\"s == 'x   y'\">z</if>").unwrap();
        let Node::Directive(Directive::Conditional { test, .. }) = &t.nodes()[0] else {
            panic!("expected <if>");
        };
        assert_eq!(
            test,
            &Condition::Compare {
                op: Operator::Eq,
                left: Operand::Ident("s".into()),
                right: Operand::Literal(Value::Text("x y".into())),
            }
        );
    }

    #[test]
    fn test_malformed_markup() {
        for src in [
            r#"<if test="true">x"#,
            r#"x</if>"#,
            r#"<if test="true"><foreach collection="c">x</if></foreach>"#,
            r#"<if>x</if>"#,
            r#"<if test=true>x</if>"#,
            r#"<if test="true" test="false">x</if>"#,
            r#"<foreach item="v">x</foreach>"#,
            r#"<foreach collection="c" index="i">x</foreach>"#,
        ] {
            let err = Template::parse(src).unwrap_err();
            assert!(err.is_configuration(), "{src}: {err}");
        }
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \r\n\t b  "), "a b");
        assert_eq!(collapse_whitespace(""), "");
    }
}
