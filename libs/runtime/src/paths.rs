pub mod home_dir {
    use std::path::{Path, PathBuf};
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum HomeDirError {
        #[error("cannot determine the user home directory ({0} is not set)")]
        MissingEnv(&'static str),
        #[error("cannot determine the current directory: {0}")]
        CurrentDir(#[source] std::io::Error),
        #[error("failed to create '{path}': {source}")]
        Create {
            path: PathBuf,
            #[source]
            source: std::io::Error,
        },
    }

    #[cfg(target_os = "windows")]
    const HOME_ENV: &str = "APPDATA";
    #[cfg(not(target_os = "windows"))]
    const HOME_ENV: &str = "HOME";

    fn user_home() -> Result<PathBuf, HomeDirError> {
        std::env::var_os(HOME_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .ok_or(HomeDirError::MissingEnv(HOME_ENV))
    }

    fn expand_tilde(raw: &str) -> Result<PathBuf, HomeDirError> {
        if raw == "~" {
            return user_home();
        }
        match raw.strip_prefix("~/").or_else(|| raw.strip_prefix("~\\")) {
            Some(rest) => Ok(user_home()?.join(rest)),
            None => Ok(PathBuf::from(raw)),
        }
    }

    /// Resolves the application home directory to an absolute path.
    ///
    /// `configured` may start with `~`; relative paths are taken against the
    /// current directory. Without a configured value the directory is
    /// `<user home>/<default_subdir>`.
    pub fn resolve_home_dir(
        configured: Option<String>,
        default_subdir: &str,
        create: bool,
    ) -> Result<PathBuf, HomeDirError> {
        let path = match configured {
            Some(raw) => expand_tilde(raw.trim())?,
            None => user_home()?.join(default_subdir),
        };
        let path = if path.is_absolute() {
            path
        } else {
            std::env::current_dir()
                .map_err(HomeDirError::CurrentDir)?
                .join(path)
        };

        if create {
            ensure_dir(&path)?;
        }
        Ok(path)
    }

    fn ensure_dir(path: &Path) -> Result<(), HomeDirError> {
        std::fs::create_dir_all(path).map_err(|source| HomeDirError::Create {
            path: path.to_path_buf(),
            source,
        })
    }

}
