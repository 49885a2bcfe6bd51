use std::{collections::HashMap, fmt, fs, str::FromStr};

use quick_xml::{Reader, events::Event};

use crate::{Error, config::MapperConfig};

/// Kind of statement a mapper entry declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl StatementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatementKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "select" => Ok(Self::Select),
            "insert" => Ok(Self::Insert),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            _ => Err(Error::configuration(format!("unknown statement kind `{s}`"))),
        }
    }
}

/// Where raw statement templates come from.
pub trait TemplateSource: Send + Sync {
    fn lookup(&self, mapper: &str, kind: StatementKind, id: &str) -> Option<&str>;
}

/// One statement of a mapper document.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub id: String,
    pub kind: StatementKind,
    pub template: String,
    pub parameter_type: Option<String>,
    pub result_type: Option<String>,
}

/// A named group of statements, usually one mapper document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mapper {
    name: String,
    statements: HashMap<(StatementKind, String), Statement>,
}

impl Mapper {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            statements: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a statement; ids are unique per kind.
    pub fn add(&mut self, statement: Statement) -> Result<(), Error> {
        let key = (statement.kind, statement.id.clone());
        if self.statements.contains_key(&key) {
            return Err(Error::configuration(format!(
                "mapper `{}` declares {} `{}` twice",
                self.name, statement.kind, statement.id
            )));
        }
        self.statements.insert(key, statement);
        Ok(())
    }

    pub fn statement(&self, kind: StatementKind, id: &str) -> Option<&Statement> {
        self.statements.get(&(kind, id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Reads a mapper document:
    ///
    /// ```xml
    /// <mapper name="users">
    ///   <select id="byId"><![CDATA[ SELECT * FROM users WHERE id = #{id} ]]></select>
    /// </mapper>
    /// ```
    ///
    /// A statement body is the concatenation of its text and CDATA sections, so directive
    /// markup has to sit inside CDATA.
    pub fn parse(xml: &str) -> Result<Self, Error> {
        let mut reader = Reader::from_str(xml);
        let mut mapper: Option<Mapper> = None;
        let mut current: Option<Statement> = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    let mut attrs = HashMap::new();
                    for attr in e.attributes() {
                        let attr = attr.map_err(|e| Error::configuration(e.to_string()))?;
                        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                        let value = attr
                            .unescape_value()
                            .map_err(|e| Error::configuration(e.to_string()))?
                            .into_owned();
                        attrs.insert(key, value);
                    }

                    if let Some(statement) = &current {
                        return Err(Error::configuration(format!(
                            "<{tag}> inside {} `{}` must be wrapped in CDATA",
                            statement.kind, statement.id
                        )));
                    }
                    if mapper.is_none() {
                        if tag != "mapper" {
                            return Err(Error::configuration(format!(
                                "expected <mapper> root, found <{tag}>"
                            )));
                        }
                        let name = attrs.remove("name").ok_or_else(|| {
                            Error::configuration("<mapper> requires a `name` attribute")
                        })?;
                        mapper = Some(Mapper::new(name));
                        continue;
                    }

                    let kind = tag.parse::<StatementKind>()?;
                    let id = attrs.remove("id").ok_or_else(|| {
                        Error::configuration(format!("<{kind}> requires an `id` attribute"))
                    })?;
                    current = Some(Statement {
                        id,
                        kind,
                        template: String::new(),
                        parameter_type: attrs.remove("parameterType"),
                        result_type: attrs.remove("resultType"),
                    });
                }
                Event::Text(t) => {
                    if let Some(statement) = current.as_mut() {
                        let text = t
                            .unescape()
                            .map_err(|e| Error::configuration(e.to_string()))?;
                        statement.template.push_str(&text);
                    }
                }
                Event::CData(c) => {
                    if let Some(statement) = current.as_mut() {
                        let text = String::from_utf8(c.into_inner().into_owned())
                            .map_err(|e| Error::configuration(e.to_string()))?;
                        statement.template.push_str(&text);
                    }
                }
                Event::End(_) => {
                    if let Some(statement) = current.take() {
                        let Some(mapper) = mapper.as_mut() else {
                            return Err(Error::configuration("statement outside <mapper>"));
                        };
                        mapper.add(statement)?;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        mapper.ok_or_else(|| Error::configuration("document has no <mapper> root"))
    }
}

/// All loaded mappers, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MapperRegistry {
    mappers: HashMap<String, Mapper>,
}

impl MapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every mapper document named by `config`.
    pub fn load(config: &MapperConfig) -> Result<Self, Error> {
        let mut registry = Self::new();
        for path in config.paths() {
            let xml = fs::read_to_string(&path)?;
            let mapper = Mapper::parse(&xml).map_err(|e| match e {
                Error::Configuration(msg) => {
                    Error::Configuration(format!("{}: {msg}", path.display()))
                }
                other => other,
            })?;
            registry.register(mapper)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, mapper: Mapper) -> Result<(), Error> {
        if self.mappers.contains_key(mapper.name()) {
            return Err(Error::configuration(format!(
                "mapper `{}` is registered twice",
                mapper.name()
            )));
        }
        self.mappers.insert(mapper.name().to_string(), mapper);
        Ok(())
    }

    pub fn mapper(&self, name: &str) -> Option<&Mapper> {
        self.mappers.get(name)
    }

    pub fn len(&self) -> usize {
        self.mappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappers.is_empty()
    }
}

impl TemplateSource for MapperRegistry {
    fn lookup(&self, mapper: &str, kind: StatementKind, id: &str) -> Option<&str> {
        self.mappers
            .get(mapper)?
            .statement(kind, id)
            .map(|s| s.template.as_str())
    }
}
