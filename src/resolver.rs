use std::{fmt, rc::Rc};

use crate::{
    Environment, Error, Value,
    binder::Binding,
    directive::{Condition, Directive, Node, Operand, Template},
    evaluate,
};

/// Name lookup chain: the innermost `<foreach>` element first, the root environment last.
pub(crate) struct Scope<'e> {
    env: &'e Environment,
    item: Option<String>,
    parent: Option<Rc<Scope<'e>>>,
}

pub(crate) enum Bound<'e> {
    Value(&'e Value),
    Collection(&'e [Environment]),
}

impl<'e> Scope<'e> {
    fn root(env: &'e Environment) -> Self {
        Self {
            env,
            item: None,
            parent: None,
        }
    }

    fn lookup(&self, name: &str) -> Option<Bound<'e>> {
        let mut scope = self;
        loop {
            let env: &'e Environment = scope.env;
            if scope.item.as_deref() == Some(name)
                && let Some(item) = env.item()
            {
                return Some(Bound::Value(item));
            }
            match env.get(name) {
                Some(Binding::Value(v)) => return Some(Bound::Value(v)),
                Some(Binding::Collection(elements)) => return Some(Bound::Collection(elements)),
                None => {}
            }
            scope = scope.parent.as_deref()?;
        }
    }

    /// Value of a placeholder; unbound names and collections are null.
    pub(crate) fn value(&self, name: &str) -> Value {
        match self.lookup(name) {
            Some(Bound::Value(v)) => v.clone(),
            _ => Value::Null,
        }
    }

    fn operand(&self, operand: &Operand) -> Value {
        match operand {
            Operand::Literal(v) => v.clone(),
            Operand::Ident(name) => match self.lookup(name) {
                Some(Bound::Value(v)) => v.clone(),
                // a collection compares as its element count
                Some(Bound::Collection(elements)) => Value::Int(elements.len() as i64),
                None => Value::Null,
            },
        }
    }

    fn test(&self, condition: &Condition) -> bool {
        match condition {
            Condition::Literal(b) => *b,
            Condition::Compare { op, left, right } => {
                evaluate(*op, &self.operand(left), &self.operand(right))
            }
        }
    }
}

/// A run of resolved text produced under a single scope.
pub(crate) struct Chunk<'e> {
    pub(crate) text: String,
    pub(crate) scope: Rc<Scope<'e>>,
}

/// Directive-free text, remembering which `<foreach>` element produced each part.
pub struct Resolved<'e> {
    chunks: Vec<Chunk<'e>>,
}

impl<'e> Resolved<'e> {
    pub(crate) fn chunks(&self) -> &[Chunk<'e>] {
        &self.chunks
    }

    pub fn text(&self) -> String {
        self.chunks.iter().map(|c| c.text.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Collapses whitespace across chunk boundaries and trims both ends.
    fn normalize(chunks: Vec<Chunk<'e>>) -> Self {
        let mut out: Vec<Chunk<'e>> = Vec::with_capacity(chunks.len());
        let mut pending_space = false;
        for chunk in chunks {
            let mut text = String::with_capacity(chunk.text.len());
            for c in chunk.text.chars() {
                if c.is_whitespace() {
                    pending_space = true;
                    continue;
                }
                if pending_space && (!text.is_empty() || !out.is_empty()) {
                    text.push(' ');
                }
                pending_space = false;
                text.push(c);
            }
            if !text.is_empty() {
                out.push(Chunk {
                    text,
                    scope: chunk.scope,
                });
            }
        }
        Self { chunks: out }
    }
}

impl fmt::Display for Resolved<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for chunk in &self.chunks {
            f.write_str(&chunk.text)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Resolved<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Resolved").field(&self.text()).finish()
    }
}

/// Parses `template` and rewrites every directive using `env`.
pub fn resolve<'e>(template: &str, env: &'e Environment) -> Result<Resolved<'e>, Error> {
    resolve_template(&Template::parse(template)?, env)
}

/// Rewrites an already parsed template.
pub fn resolve_template<'e>(
    template: &Template,
    env: &'e Environment,
) -> Result<Resolved<'e>, Error> {
    let root = Rc::new(Scope::root(env));
    let mut chunks = Vec::new();
    render(template.nodes(), &root, &mut chunks)?;
    Ok(Resolved::normalize(chunks))
}

fn render<'e>(
    nodes: &[Node],
    scope: &Rc<Scope<'e>>,
    out: &mut Vec<Chunk<'e>>,
) -> Result<(), Error> {
    for node in nodes {
        match node {
            Node::Text(text) => push(out, text, scope),
            Node::Directive(Directive::Conditional { test, body }) => {
                if scope.test(test) {
                    render(body, scope, out)?;
                }
            }
            Node::Directive(Directive::Repeat(repeat)) => {
                let elements = match scope.lookup(&repeat.collection) {
                    Some(Bound::Collection(elements)) => elements,
                    _ => {
                        return Err(Error::configuration(format!(
                            "<foreach> collection `{}` is not a bound collection",
                            repeat.collection
                        )));
                    }
                };
                if elements.is_empty() {
                    continue;
                }
                push(out, &repeat.open, scope);
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        push(out, &repeat.separator, scope);
                    }
                    let element_scope = Rc::new(Scope {
                        env: element,
                        item: Some(repeat.item.clone()).filter(|item| !item.is_empty()),
                        parent: Some(Rc::clone(scope)),
                    });
                    render(&repeat.body, &element_scope, out)?;
                }
                push(out, &repeat.close, scope);
            }
        }
    }
    Ok(())
}

fn push<'e>(out: &mut Vec<Chunk<'e>>, text: &str, scope: &Rc<Scope<'e>>) {
    if text.is_empty() {
        return;
    }
    match out.last_mut() {
        Some(last) if Rc::ptr_eq(&last.scope, scope) => last.text.push_str(text),
        _ => out.push(Chunk {
            text: text.to_string(),
            scope: Rc::clone(scope),
        }),
    }
}
