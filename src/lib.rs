#![doc = include_str!("../README.md")]

extern crate self as sqlx_mapper;

pub use sqlx_mapper_macro::*;

mod binder;
mod config;
mod directive;
mod error;
mod evaluator;
mod extractor;
mod logger;
mod mapper;
mod projector;
mod resolver;
mod session;
mod sql_template_execute;
mod value;

pub use binder::*;
pub use config::*;
pub use directive::*;
pub use error::*;
pub use evaluator::*;
pub use extractor::*;
pub use logger::*;
pub use mapper::*;
pub use projector::*;
pub use resolver::*;
pub use session::*;
pub use sql_template_execute::*;
pub use value::*;
