use std::path::PathBuf;

/// Engine configuration. Constructed directly — this is an embedded
/// library, not a service with its own config-file/env-var layer.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Advisory fanout used to size the underflow threshold
    /// (`min_cells = floor(order * 0.25)`); the page format itself has
    /// no fixed fanout.
    pub order: usize,
    pub cache_size: usize,
}

impl Config {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Config {
            data_dir: data_dir.into(),
            ..Config::default()
        }
    }

    pub fn data_file(&self) -> PathBuf {
        self.data_dir.join("btree.db")
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("."),
            order: 128,
            cache_size: 50_000,
        }
    }
}
