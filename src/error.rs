use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Template markup, comparison tests or statement lookups that can never succeed.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Parameter values the binder cannot turn into query arguments.
    #[error("binding error: {0}")]
    Binding(String),
    #[error("data base error: {0}")]
    SqlxError(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("mapper document error: {0}")]
    Xml(#[from] quick_xml::Error),
}

impl Error {
    pub(crate) fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub(crate) fn binding(msg: impl Into<String>) -> Self {
        Error::Binding(msg.into())
    }

    /// `true` for markup and lookup mistakes, which are never worth retrying.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_) | Error::Xml(_))
    }
}
