use std::fmt;

use chrono::{DateTime, TimeZone};

use crate::{Value, value::format_zoned_timestamp};

/// Plain, loggable view of a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Null,
    Scalar(Value),
    /// Field values of a record, in declaration order.
    Row(Vec<Projection>),
    List(Vec<Projection>),
}

impl Projection {
    pub fn len(&self) -> usize {
        match self {
            Projection::Null => 0,
            Projection::Scalar(_) => 1,
            Projection::Row(items) | Projection::List(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Value> for Projection {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => Projection::Null,
            v => Projection::Scalar(v),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Projection]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Projection::Null => f.write_str("null"),
            Projection::Scalar(v) => write!(f, "{v}"),
            Projection::Row(items) => {
                f.write_str("{")?;
                write_joined(f, items)?;
                f.write_str("}")
            }
            Projection::List(items) => {
                f.write_str("[")?;
                write_joined(f, items)?;
                f.write_str("]")
            }
        }
    }
}

/// Best-effort unwrapping into a [`Projection`]; never fails.
pub trait Project {
    fn project(&self) -> Projection;
}

/// Projects any value for trace output.
pub fn project<T: Project + ?Sized>(value: &T) -> Projection {
    value.project()
}

impl<Tz: TimeZone> Project for DateTime<Tz> {
    fn project(&self) -> Projection {
        Projection::Scalar(Value::Text(format_zoned_timestamp(self)))
    }
}

impl<T: Project + ?Sized> Project for &T {
    fn project(&self) -> Projection {
        (**self).project()
    }
}

impl<T: Project + ?Sized> Project for Box<T> {
    fn project(&self) -> Projection {
        (**self).project()
    }
}

impl<T: Project> Project for Option<T> {
    fn project(&self) -> Projection {
        self.as_ref().map_or(Projection::Null, Project::project)
    }
}

impl<T: Project> Project for [T] {
    fn project(&self) -> Projection {
        Projection::List(self.iter().map(Project::project).collect())
    }
}

impl<T: Project> Project for Vec<T> {
    fn project(&self) -> Projection {
        self.as_slice().project()
    }
}

macro_rules! impl_tuple {
    ($($name:ident),+) => {
        impl<$($name: Project),+> Project for ($($name,)+) {
            #[allow(non_snake_case)]
            fn project(&self) -> Projection {
                let ($($name,)+) = self;
                Projection::Row(vec![$($name.project()),+])
            }
        }
    };
}

impl_tuple!(A);
impl_tuple!(A, B);
impl_tuple!(A, B, C);
impl_tuple!(A, B, C, D);
