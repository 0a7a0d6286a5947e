// CLI command implementations

pub mod build;
pub mod delete;
pub mod load;
pub mod query;
pub mod stats;

use std::path::{Path, PathBuf};

use tagstore::config::{load_config, Config};

/// Project directory, its configuration and the resolved locations.
pub struct Workspace {
    pub root: PathBuf,
    pub dbpath: PathBuf,
    pub config: Config,
}

impl Workspace {
    /// Resolve the source root and database directory for `project`.
    /// `dbpath` overrides the configured database directory.
    pub fn locate(project: &Path, dbpath: Option<&Path>) -> Self {
        let config = load_config(project);
        let root = config.root(project);
        let dbpath = match dbpath {
            Some(path) => path.to_path_buf(),
            None => config.dbpath(project),
        };
        Self { root, dbpath, config }
    }
}
