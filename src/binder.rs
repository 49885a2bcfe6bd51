use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, TimeZone};

use crate::{
    Error, Project, Projection, Value,
    value::{format_timestamp, format_zoned_timestamp},
};

/// Name under which a top-level collection parameter is registered.
pub const COLLECTION_KEY: &str = "slice";

/// What a name is bound to inside an [`Environment`].
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Value(Value),
    /// One environment per element, in order.
    Collection(Vec<Environment>),
}

impl From<Value> for Binding {
    fn from(v: Value) -> Self {
        Binding::Value(v)
    }
}

impl From<Vec<Environment>> for Binding {
    fn from(v: Vec<Environment>) -> Self {
        Binding::Collection(v)
    }
}

/// Per-call mapping from parameter names to bound values.
///
/// Element environments of a collection of scalars carry the element itself as their
/// `item`, reachable through the `item` name of the `<foreach>` iterating them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    entries: HashMap<String, Binding>,
    item: Option<Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment of a single scalar collection element.
    pub fn scalar(value: Value) -> Self {
        Self {
            entries: HashMap::new(),
            item: Some(value),
        }
    }

    /// Binds a scalar, replacing any previous binding of `name`.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries
            .insert(name.into(), Binding::Value(value.into()));
        self
    }

    /// Registers a collection, replacing any previous binding of `name`.
    pub fn with_collection(mut self, name: impl Into<String>, elements: Vec<Environment>) -> Self {
        self.entries
            .insert(name.into(), Binding::Collection(elements));
        self
    }

    /// Binds `name`, failing if it is already bound.
    pub fn bind(&mut self, name: impl Into<String>, binding: Binding) -> Result<(), Error> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(Error::binding(format!("parameter `{name}` is bound twice")));
        }
        self.entries.insert(name, binding);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.entries.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.entries.get(name) {
            Some(Binding::Value(v)) => Some(v),
            _ => None,
        }
    }

    pub fn collection(&self, name: &str) -> Option<&[Environment]> {
        match self.entries.get(name) {
            Some(Binding::Collection(elements)) => Some(elements),
            _ => None,
        }
    }

    pub fn item(&self) -> Option<&Value> {
        self.item.as_ref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.item.is_none()
    }
}

/// A value that can be bound to a single parameter name.
pub trait Param {
    fn to_binding(&self) -> Result<Binding, Error>;
}

/// A value that can be one element of a bound collection.
pub trait Element {
    fn to_element(&self) -> Result<Environment, Error>;
}

/// A struct whose fields are bound by name.
///
/// Usually derived with `#[derive(Record)]`, which lists the fields in declaration order.
pub trait Record {
    fn fields(&self) -> Result<Vec<(&'static str, Binding)>, Error>;
}

/// Shape of the parameter handed to a statement.
pub enum Input<'a> {
    Null,
    Record(&'a (dyn Record + Sync)),
    /// Ordered collection, registered under [`COLLECTION_KEY`].
    Elements(Vec<&'a (dyn Element + Sync)>),
    /// A prepared environment, used as is.
    Environment(Environment),
}

impl<'a> Input<'a> {
    pub fn record<R: Record + Sync>(record: &'a R) -> Self {
        Input::Record(record)
    }

    pub fn records<E: Element + Sync>(elements: &'a [E]) -> Self {
        Input::Elements(
            elements
                .iter()
                .map(|e| e as &(dyn Element + Sync))
                .collect(),
        )
    }
}

/// Builds the environment of one call.
pub fn bind(input: Input<'_>) -> Result<Environment, Error> {
    match input {
        Input::Null => Ok(Environment::new()),
        Input::Record(record) => bind_record(record),
        Input::Elements(elements) => {
            let elements = elements
                .into_iter()
                .map(|e| e.to_element())
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Environment::new().with_collection(COLLECTION_KEY, elements))
        }
        Input::Environment(env) => Ok(env),
    }
}

/// One entry per field of `record`.
pub fn bind_record(record: &dyn Record) -> Result<Environment, Error> {
    let mut env = Environment::new();
    for (name, binding) in record.fields()? {
        env.bind(name, binding)?;
    }
    Ok(env)
}

fn out_of_range(v: impl std::fmt::Display) -> Error {
    Error::binding(format!("{v} does not fit a signed 64-bit argument"))
}

macro_rules! impl_scalar {
    ($($ty:ty => $to_value:expr),* $(,)?) => {$(
        impl Param for $ty {
            fn to_binding(&self) -> Result<Binding, Error> {
                let to_value: fn(&$ty) -> Result<Value, Error> = $to_value;
                to_value(self).map(Binding::Value)
            }
        }

        impl Element for $ty {
            fn to_element(&self) -> Result<Environment, Error> {
                let to_value: fn(&$ty) -> Result<Value, Error> = $to_value;
                to_value(self).map(Environment::scalar)
            }
        }

        impl Project for $ty {
            fn project(&self) -> Projection {
                let to_value: fn(&$ty) -> Result<Value, Error> = $to_value;
                to_value(self).map_or(Projection::Null, Projection::from)
            }
        }
    )*};
}

impl_scalar! {
    bool => |v| Ok(Value::Bool(*v)),
    i8 => |v| Ok(Value::Int((*v).into())),
    i16 => |v| Ok(Value::Int((*v).into())),
    i32 => |v| Ok(Value::Int((*v).into())),
    i64 => |v| Ok(Value::Int(*v)),
    isize => |v| i64::try_from(*v).map(Value::Int).map_err(|_| out_of_range(v)),
    u8 => |v| Ok(Value::Int((*v).into())),
    u16 => |v| Ok(Value::Int((*v).into())),
    u32 => |v| Ok(Value::Int((*v).into())),
    u64 => |v| i64::try_from(*v).map(Value::Int).map_err(|_| out_of_range(v)),
    usize => |v| i64::try_from(*v).map(Value::Int).map_err(|_| out_of_range(v)),
    f32 => |v| Ok(Value::Float((*v).into())),
    f64 => |v| Ok(Value::Float(*v)),
    char => |v| Ok(Value::Text(v.to_string())),
    str => |v| Ok(Value::Text(v.to_string())),
    String => |v| Ok(Value::Text(v.clone())),
    NaiveDateTime => |v| Ok(Value::Text(format_timestamp(v))),
    Value => |v| Ok(v.clone()),
}

impl<Tz: TimeZone> Param for DateTime<Tz> {
    fn to_binding(&self) -> Result<Binding, Error> {
        Ok(Binding::Value(Value::Text(format_zoned_timestamp(self))))
    }
}

impl<Tz: TimeZone> Element for DateTime<Tz> {
    fn to_element(&self) -> Result<Environment, Error> {
        Ok(Environment::scalar(Value::Text(format_zoned_timestamp(self))))
    }
}

impl<T: Param + ?Sized> Param for &T {
    fn to_binding(&self) -> Result<Binding, Error> {
        (**self).to_binding()
    }
}

impl<T: Param + ?Sized> Param for Box<T> {
    fn to_binding(&self) -> Result<Binding, Error> {
        (**self).to_binding()
    }
}

impl<T: Param> Param for Option<T> {
    fn to_binding(&self) -> Result<Binding, Error> {
        match self {
            Some(v) => v.to_binding(),
            None => Ok(Binding::Value(Value::Null)),
        }
    }
}

impl<T: Element> Param for [T] {
    fn to_binding(&self) -> Result<Binding, Error> {
        self.iter()
            .map(Element::to_element)
            .collect::<Result<Vec<_>, _>>()
            .map(Binding::Collection)
    }
}

impl<T: Element> Param for Vec<T> {
    fn to_binding(&self) -> Result<Binding, Error> {
        self.as_slice().to_binding()
    }
}

impl<T: Element + ?Sized> Element for &T {
    fn to_element(&self) -> Result<Environment, Error> {
        (**self).to_element()
    }
}

impl<T: Element> Element for Option<T> {
    fn to_element(&self) -> Result<Environment, Error> {
        match self {
            Some(v) => v.to_element(),
            None => Ok(Environment::scalar(Value::Null)),
        }
    }
}
