use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use directories::ProjectDirs;

pub const KEYS_DIRECTORY_NAME: &str = "keys";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDirectory {
    data_dir: PathBuf,
}

impl DataDirectory {
    ///////////////////////////////////////////////////////////////////////////
    ///
    /// The data directory that holds the local key store.
    ///
    /// The default varies by operating system, e.g.
    ///
    /// - Linux:   /home/alice/.local/share/thorchainspam
    /// - Windows: C:\Users\Alice\AppData\Roaming\thorchain\thorchainspam\data
    /// - macOS:   /Users/Alice/Library/Application Support/org.thorchain.thorchainspam
    pub fn get(root_dir: Option<PathBuf>) -> Result<Self> {
        let project_dirs = root_dir
            .map(ProjectDirs::from_path)
            .unwrap_or_else(|| ProjectDirs::from("org", "thorchain", "thorchainspam"))
            .context("Could not determine data directory")?;

        let data_dir = project_dirs.data_dir().to_path_buf();

        Ok(DataDirectory { data_dir })
    }

    /// One JSON file per key lives here.
    pub fn keys_dir_path(&self) -> PathBuf {
        self.data_dir.join(Path::new(KEYS_DIRECTORY_NAME))
    }
}
