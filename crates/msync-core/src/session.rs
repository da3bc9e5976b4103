use anyhow::Context;
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

/// Holds the single bearer credential. The token lives in memory for the
/// lifetime of a session and in one fixed file on disk so a restart does
/// not force a fresh login. No other client state is persisted.
#[derive(Debug)]
pub struct TokenStore {
    path: PathBuf,
    token: Option<String>,
}

impl TokenStore {
    /// Load whatever credential is on disk. A missing file means logged
    /// out; that is not an error.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let token = if path.exists() {
            let data = fs::read_to_string(path).context("read token file")?;
            let trimmed = data.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        } else {
            None
        };
        Ok(Self {
            path: path.to_path_buf(),
            token,
        })
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Persist a freshly issued credential.
    pub fn store(&mut self, token: String) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("create token directory")?;
        }
        fs::write(&self.path, &token).context("write token file")?;
        self.token = Some(token);
        Ok(())
    }

    /// Forget the credential locally. The server-side token is left to
    /// expire on its own.
    pub fn clear(&mut self) -> anyhow::Result<()> {
        self.token = None;
        if self.path.exists() {
            fs::remove_file(&self.path).context("remove token file")?;
        }
        Ok(())
    }
}

pub fn default_token_path() -> anyhow::Result<PathBuf> {
    let project =
        ProjectDirs::from("com", "msync", "msync").context("resolve project dirs")?;
    Ok(project.config_dir().join("token"))
}
