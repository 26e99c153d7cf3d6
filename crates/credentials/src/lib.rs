use anyhow::Result;
use log::warn;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const SETTINGS_KEY: &str = "credentials";

pub fn app_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);
    base.join("reelforge")
}

pub fn default_store_path() -> PathBuf {
    app_data_dir().join("reelforge.sqlite3")
}

/// Which third-party image-generation API to call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Fal,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Fal => "fal",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "fal" => Ok(ProviderKind::Fal),
            other => anyhow::bail!("unknown image provider: {other} (expected openai or fal)"),
        }
    }
}

/// Third-party API keys plus the preferred image provider. Persisted locally
/// under a single settings key; nothing here ever leaves the machine except
/// as request auth headers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(default)]
    pub openai_key: String,
    #[serde(default)]
    pub fal_key: String,
    #[serde(default)]
    pub preferred_provider: ProviderKind,
}

impl Credentials {
    pub fn key_for(&self, provider: ProviderKind) -> &str {
        match provider {
            ProviderKind::OpenAi => &self.openai_key,
            ProviderKind::Fal => &self.fal_key,
        }
    }

    /// Whether the key matching the preferred provider is usable.
    pub fn has_preferred_key(&self) -> bool {
        !self.key_for(self.preferred_provider).trim().is_empty()
    }
}

/// Durable local store for [`Credentials`], backed by a small SQLite
/// database in the per-user app data directory.
pub struct CredentialStore {
    conn: Connection,
    path: PathBuf,
}

impl CredentialStore {
    pub fn open_or_create(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", &"WAL")?;
        conn.pragma_update(None, "synchronous", &"NORMAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS settings(
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn open_default() -> Result<Self> {
        Self::open_or_create(&default_store_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored credentials. A missing row is `None`; an unparseable
    /// row is logged and also treated as absent rather than failing.
    pub fn load(&self) -> Result<Option<Credentials>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM settings WHERE key = ?1 LIMIT 1")?;
        let mut rows = stmt.query(params![SETTINGS_KEY])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let raw: String = row.get(0)?;
        match serde_json::from_str::<Credentials>(&raw) {
            Ok(credentials) => Ok(Some(credentials)),
            Err(err) => {
                warn!("stored credentials are unreadable, treating as absent: {err}");
                Ok(None)
            }
        }
    }

    /// Overwrites the stored credentials synchronously.
    pub fn save(&self, credentials: &Credentials) -> Result<()> {
        let json = serde_json::to_string(credentials)?;
        let now = chrono::Utc::now().timestamp();
        self.conn.execute(
            "INSERT INTO settings(key, value, updated_at) VALUES(?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![SETTINGS_KEY, json, now],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, CredentialStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::open_or_create(&dir.path().join("keys.sqlite3")).unwrap();
        (dir, store)
    }

    #[test]
    fn load_is_absent_on_fresh_store() {
        let (_dir, store) = temp_store();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let (_dir, store) = temp_store();
        let credentials = Credentials {
            openai_key: "sk-test".to_string(),
            fal_key: String::new(),
            preferred_provider: ProviderKind::OpenAi,
        };
        store.save(&credentials).unwrap();
        assert_eq!(store.load().unwrap(), Some(credentials));
    }

    #[test]
    fn save_overwrites_previous_value() {
        let (_dir, store) = temp_store();
        store.save(&Credentials::default()).unwrap();
        let updated = Credentials {
            fal_key: "key-abc".to_string(),
            preferred_provider: ProviderKind::Fal,
            ..Default::default()
        };
        store.save(&updated).unwrap();
        assert_eq!(store.load().unwrap(), Some(updated));
    }

    #[test]
    fn corrupt_row_is_treated_as_absent() {
        let (_dir, store) = temp_store();
        store
            .conn
            .execute(
                "INSERT INTO settings(key, value, updated_at) VALUES(?1, 'not json', 0)",
                params![SETTINGS_KEY],
            )
            .unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn preferred_key_gate() {
        let mut credentials = Credentials {
            preferred_provider: ProviderKind::Fal,
            ..Default::default()
        };
        assert!(!credentials.has_preferred_key());
        credentials.fal_key = "key-abc".to_string();
        assert!(credentials.has_preferred_key());
        credentials.preferred_provider = ProviderKind::OpenAi;
        assert!(!credentials.has_preferred_key());
    }

    #[test]
    fn wire_names_are_camel_case() {
        let value = serde_json::to_value(Credentials::default()).unwrap();
        assert!(value.get("openaiKey").is_some());
        assert!(value.get("falKey").is_some());
        assert_eq!(value["preferredProvider"], "openai");
    }
}
