//! Where a scenario loads the page from

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{E2eError, E2eResult};

/// How the page under test is reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum NavigationMode {
    /// Over HTTP from the content host
    #[default]
    Served,
    /// Straight from disk with a `file://` URL
    LocalFile,
}

/// A resolved navigation target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationTarget {
    Served { base_url: String },
    LocalFile { path: PathBuf },
}

impl NavigationTarget {
    pub fn served(base_url: impl Into<String>) -> Self {
        NavigationTarget::Served {
            base_url: base_url.into(),
        }
    }

    pub fn local_file(path: impl Into<PathBuf>) -> Self {
        NavigationTarget::LocalFile { path: path.into() }
    }

    pub fn mode(&self) -> NavigationMode {
        match self {
            NavigationTarget::Served { .. } => NavigationMode::Served,
            NavigationTarget::LocalFile { .. } => NavigationMode::LocalFile,
        }
    }

    /// URL handed to the browser
    pub fn url(&self) -> E2eResult<Url> {
        match self {
            NavigationTarget::Served { base_url } => {
                let base = Url::parse(base_url)?;
                Ok(base.join("/")?)
            }
            NavigationTarget::LocalFile { path } => file_url(path),
        }
    }
}

fn file_url(path: &Path) -> E2eResult<Url> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Url::from_file_path(&absolute)
        .map_err(|()| E2eError::Config(format!("cannot express {} as a file URL", absolute.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_served_url_has_single_trailing_slash() {
        let bare = NavigationTarget::served("http://localhost:3000").url().unwrap();
        let slashed = NavigationTarget::served("http://localhost:3000/").url().unwrap();
        assert_eq!(bare.as_str(), "http://localhost:3000/");
        assert_eq!(slashed, bare);
    }

    #[test]
    fn test_bad_base_url_is_an_error() {
        let err = NavigationTarget::served("not a url").url().unwrap_err();
        assert!(matches!(err, E2eError::Url(_)), "{err}");
    }

    #[test]
    fn test_local_file_url() {
        let target = NavigationTarget::local_file("/srv/pages/transfer-page.html");
        assert_eq!(target.url().unwrap().as_str(), "file:///srv/pages/transfer-page.html");
        assert_eq!(target.mode(), NavigationMode::LocalFile);
    }

    #[test]
    fn test_reserved_characters_in_path_are_encoded() {
        let path = Path::new("/tmp/run #2/transfer page.html");
        let url = NavigationTarget::local_file(path).url().unwrap();

        assert_eq!(url.as_str(), "file:///tmp/run%20%232/transfer%20page.html");
        assert_eq!(url.fragment(), None);
        assert_eq!(url.to_file_path().unwrap(), path);
    }

    #[test]
    fn test_relative_local_file_is_made_absolute() {
        let url = NavigationTarget::local_file("transfer-page.html").url().unwrap();
        assert_eq!(url.scheme(), "file");
        assert!(url.path().ends_with("/transfer-page.html"), "{url}");
        assert!(url.to_file_path().unwrap().is_absolute());
    }
}
