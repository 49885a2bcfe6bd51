use std::path::{Path, PathBuf};

/// Which mapper documents a session loads.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MapperConfig {
    mappers_dir: PathBuf,
    mapper_names: Vec<String>,
}

impl MapperConfig {
    /// # Arguments
    /// * `mappers_dir` - Directory holding the documents
    /// * `mapper_names` - File names inside `mappers_dir`, loaded in order
    pub fn new<I, S>(mappers_dir: impl Into<PathBuf>, mapper_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mappers_dir: mappers_dir.into(),
            mapper_names: mapper_names.into_iter().map(Into::into).collect(),
        }
    }

    /// Appends one more document.
    pub fn add_mapper(mut self, name: impl Into<String>) -> Self {
        self.mapper_names.push(name.into());
        self
    }

    pub fn mappers_dir(&self) -> &Path {
        &self.mappers_dir
    }

    pub fn mapper_names(&self) -> &[String] {
        &self.mapper_names
    }

    /// Full paths of every configured document.
    pub fn paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.mapper_names
            .iter()
            .map(|name| self.mappers_dir.join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let config = MapperConfig::new("mappers", ["users.xml"]).add_mapper("orders.xml");
        let paths: Vec<_> = config.paths().collect();
        assert_eq!(
            paths,
            vec![
                Path::new("mappers").join("users.xml"),
                Path::new("mappers").join("orders.xml")
            ]
        );
    }
}
