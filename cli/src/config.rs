use anyhow::{Context, Result};
use directories::ProjectDirs;
use log::warn;
use std::path::PathBuf;

use crema_core::session::Identity;

pub struct Config {
    pub data_dir: PathBuf,
    /// This device's local storage.
    pub device_db_path: PathBuf,
    /// User documents, used when no remote server is configured.
    pub cloud_db_path: PathBuf,
    pub session_path: PathBuf,
}

impl Config {
    /// Resolve paths under `data_dir`, or the platform data directory if not given.
    pub fn load(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => ProjectDirs::from("", "", "crema")
                .context("Could not determine home directory")?
                .data_dir()
                .to_path_buf(),
        };
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Ok(Config {
            device_db_path: data_dir.join("device.db"),
            cloud_db_path: data_dir.join("cloud.db"),
            session_path: data_dir.join("session.json"),
            data_dir,
        })
    }

    /// The identity persisted by the last `login`, if any.
    ///
    /// An unparsable session file counts as signed out; the next `logout`
    /// or `login` replaces it.
    pub fn load_session(&self) -> Result<Option<Identity>> {
        if !self.session_path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.session_path)
            .context("Failed to read session file")?;
        match serde_json::from_str(&raw) {
            Ok(identity) => Ok(Some(identity)),
            Err(e) => {
                warn!(
                    "Ignoring corrupt session file {}: {e}",
                    self.session_path.display()
                );
                Ok(None)
            }
        }
    }

    pub fn save_session(&self, identity: &Identity) -> Result<()> {
        let json = serde_json::to_string_pretty(identity)?;
        std::fs::write(&self.session_path, json).context("Failed to write session file")
    }

    /// Returns false if there was no session to clear.
    pub fn clear_session(&self) -> Result<bool> {
        match std::fs::remove_file(&self.session_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).context("Failed to remove session file"),
        }
    }

    /// Load the API key from disk, or generate a new one.
    ///
    /// Returns `(key, newly_created)`.
    pub fn load_or_create_api_key(&self) -> Result<(String, bool)> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");

        if path.exists() {
            let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Ok((key, false));
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let key = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &key).context("Failed to write API key file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set API key file permissions")?;
        }
        eprintln!("Generated new API key: {key}");
        eprintln!("Clients connect with: crema --remote <URL> --api-key {key}");
        Ok((key, true))
    }
}
