use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::{Result, UisError};

/// Access/refresh token pair.
///
/// Both fields are empty strings when the user has never authenticated.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// True when an access token is present and can be sent.
    pub fn is_authenticated(&self) -> bool {
        !self.access_token.trim().is_empty()
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.trim().is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .finish()
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

/// Durable storage for the token pair.
///
/// `save` must be atomic with respect to concurrent `load` calls: a reader
/// sees either the old pair or the new one, never a mix.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Credentials>;

    fn save(&self, credentials: &Credentials) -> Result<()>;

    fn clear(&self) -> Result<()> {
        self.save(&Credentials::default())
    }

    /// Current access token, `None` when empty.
    fn access_token(&self) -> Result<Option<String>> {
        let credentials = self.load()?;
        Ok(credentials
            .is_authenticated()
            .then_some(credentials.access_token))
    }

    /// Replaces only the access token, keeping the stored refresh token.
    ///
    /// The default implementation is a separate `load` and `save`, so a
    /// concurrent `save` between the two can be overwritten. Stores with an
    /// internal lock should override it and do both under that lock.
    fn save_access_token(&self, token: &str) -> Result<()> {
        let mut credentials = self.load()?;
        credentials.access_token = token.to_owned();
        self.save(&credentials)
    }
}

/// Process-local token store.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    inner: RwLock<Credentials>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            inner: RwLock::new(credentials),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Credentials> {
        Ok(self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = credentials.clone();
        Ok(())
    }

    fn save_access_token(&self, token: &str) -> Result<()> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .access_token = token.to_owned();
        Ok(())
    }
}

/// Token store persisted as a JSON file.
///
/// Reads are served from memory; writes go to a temporary sibling file that
/// is then renamed over the target.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    cache: RwLock<Credentials>,
}

impl FileTokenStore {
    /// Opens the store, loading the file if it exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let credentials = read_credentials(&path)?;
        Ok(Self {
            path,
            cache: RwLock::new(credentials),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_file(&self, credentials: &Credentials) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| store_error("create directory", parent, err))?;
        }
        let contents = serde_json::to_vec_pretty(credentials)
            .map_err(|err| UisError::Store(format!("could not encode credentials: {err}")))?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, contents).map_err(|err| store_error("write", &tmp, err))?;
        fs::rename(&tmp, &self.path).map_err(|err| store_error("rename", &self.path, err))
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Credentials> {
        Ok(self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        // Hold the write lock across the file write so writers are serialized.
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        self.write_file(credentials)?;
        *cache = credentials.clone();
        Ok(())
    }

    fn save_access_token(&self, token: &str) -> Result<()> {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let updated = Credentials {
            access_token: token.to_owned(),
            refresh_token: cache.refresh_token.clone(),
        };
        self.write_file(&updated)?;
        *cache = updated;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(store_error("remove", &self.path, err)),
        }
        *cache = Credentials::default();
        Ok(())
    }
}

fn read_credentials(path: &Path) -> Result<Credentials> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
            UisError::Store(format!("could not parse {}: {err}", path.display()))
        }),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(Credentials::default()),
        Err(err) => Err(store_error("read", path, err)),
    }
}

fn store_error(action: &str, path: &Path, err: std::io::Error) -> UisError {
    UisError::Store(format!("could not {action} {}: {err}", path.display()))
}
