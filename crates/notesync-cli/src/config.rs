use std::path::PathBuf;

/// Simperium application id for the note service.
const DEFAULT_APP_ID: &str = "chalk-bump-f49";

/// CLI configuration loaded from environment variables and arguments.
#[derive(Debug, Clone)]
pub struct Config {
    /// Simperium access token
    pub token: String,
    /// Simperium application id
    pub app_id: String,
    /// Corpus root directory
    pub root: PathBuf,
}

impl Config {
    /// Load configuration.
    ///
    /// Required environment variables:
    /// - `NOTESYNC_TOKEN`: Simperium access token
    ///
    /// Optional:
    /// - `NOTESYNC_APP_ID`: application id override
    /// - `NOTESYNC_DIR`: corpus root when no directory argument is
    ///   given (supports ~ for home directory); defaults to
    ///   `~/NoteBackups`
    pub fn load(root_arg: Option<&str>) -> Result<Self, ConfigError> {
        let token = std::env::var("NOTESYNC_TOKEN").map_err(|_| ConfigError::MissingToken)?;
        let app_id =
            std::env::var("NOTESYNC_APP_ID").unwrap_or_else(|_| DEFAULT_APP_ID.to_string());

        let root = resolve_root(root_arg)?;

        Ok(Self {
            token,
            app_id,
            root,
        })
    }
}

/// Resolve the corpus root without touching credentials. Local-only
/// commands use this directly.
pub fn resolve_root(root_arg: Option<&str>) -> Result<PathBuf, ConfigError> {
    match root_arg {
        Some(path) => Ok(expand_tilde(path)),
        None => match std::env::var("NOTESYNC_DIR") {
            Ok(path) => Ok(expand_tilde(&path)),
            Err(_) => dirs::home_dir()
                .map(|home| home.join("NoteBackups"))
                .ok_or(ConfigError::NoHomeDirectory),
        },
    }
}

/// Expand ~ or ~/ prefix to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"))
    } else if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("NOTESYNC_TOKEN environment variable not set")]
    MissingToken,
    #[error("could not determine a home directory; pass a directory argument")]
    NoHomeDirectory,
}
