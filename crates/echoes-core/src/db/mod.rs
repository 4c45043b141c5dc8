// ============================================================================
// PersonaDb — Local Persona Cache (redb)
// ============================================================================
// Keeps created Echoes and their attached voice models on device.
// Default path: ~/.echoes/echoes.redb (override via ECHOES_DB_PATH env var)
// Conversation logs are session-scoped and are never stored here.
// ============================================================================

use anyhow::{anyhow, Result};
use redb::{Database, TableDefinition};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::Persona;

const PERSONAS: TableDefinition<&str, &[u8]> = TableDefinition::new("personas");

/// Cache statistics for display
#[derive(Debug, Clone)]
pub struct DbStats {
    pub total_personas: usize,
    pub with_voice_model: usize,
}

/// Embedded persona cache for the Echoes client
pub struct PersonaDb {
    db: Database,
    path: PathBuf,
}

impl PersonaDb {
    /// Open (or create) the cache at the given path.
    /// If `path` is None, uses ECHOES_DB_PATH env var or ~/.echoes/echoes.redb
    pub fn open(path: Option<&str>) -> Result<Self> {
        let db_path = if let Some(p) = path {
            PathBuf::from(p)
        } else if let Ok(env_path) = std::env::var("ECHOES_DB_PATH") {
            PathBuf::from(env_path)
        } else {
            let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
            let echoes_dir = home.join(".echoes");
            std::fs::create_dir_all(&echoes_dir)
                .map_err(|e| anyhow!("Failed to create .echoes directory: {}", e))?;
            echoes_dir.join("echoes.redb")
        };

        info!("Opening persona cache at: {}", db_path.display());

        let db = Database::create(&db_path)
            .map_err(|e| anyhow!("Failed to open persona cache: {}", e))?;

        // Ensure the table exists by doing a write transaction
        let write_txn = db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let _ = write_txn
                .open_table(PERSONAS)
                .map_err(|e| anyhow!("Failed to create personas table: {}", e))?;
        }
        write_txn
            .commit()
            .map_err(|e| anyhow!("Failed to commit init: {}", e))?;

        Ok(Self { db, path: db_path })
    }

    /// Get the cache file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store_persona(&self, persona: &Persona) -> Result<()> {
        let key = format!("personas:{}", persona.id);
        let value = bincode::serialize(persona)
            .map_err(|e| anyhow!("Failed to serialize persona: {}", e))?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let mut table = write_txn
                .open_table(PERSONAS)
                .map_err(|e| anyhow!("Failed to open personas table: {}", e))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(|e| anyhow!("Failed to insert persona: {}", e))?;
        }
        write_txn
            .commit()
            .map_err(|e| anyhow!("Failed to commit: {}", e))?;

        debug!("Stored persona: {}", persona.id);
        Ok(())
    }

    pub fn get_persona(&self, id: &str) -> Result<Option<Persona>> {
        let key = format!("personas:{}", id);

        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn
            .open_table(PERSONAS)
            .map_err(|e| anyhow!("Failed to open personas table: {}", e))?;

        match table
            .get(key.as_str())
            .map_err(|e| anyhow!("Failed to get persona: {}", e))?
        {
            Some(value) => {
                let persona: Persona = bincode::deserialize(value.value())
                    .map_err(|e| anyhow!("Failed to deserialize persona: {}", e))?;
                Ok(Some(persona))
            }
            None => Ok(None),
        }
    }

    pub fn list_personas(&self) -> Result<Vec<Persona>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn
            .open_table(PERSONAS)
            .map_err(|e| anyhow!("Failed to open personas table: {}", e))?;

        let mut results = Vec::new();
        let iter = table
            .range::<&str>(..)
            .map_err(|e| anyhow!("Failed to iterate personas: {}", e))?;
        for entry in iter {
            let (_key, value) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
            let persona: Persona = bincode::deserialize(value.value())
                .map_err(|e| anyhow!("Failed to deserialize persona: {}", e))?;
            results.push(persona);
        }
        Ok(results)
    }

    pub fn delete_persona(&self, id: &str) -> Result<bool> {
        let key = format!("personas:{}", id);

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        let removed;
        {
            let mut table = write_txn
                .open_table(PERSONAS)
                .map_err(|e| anyhow!("Failed to open personas table: {}", e))?;
            removed = table
                .remove(key.as_str())
                .map_err(|e| anyhow!("Failed to remove persona: {}", e))?
                .is_some();
        }
        write_txn
            .commit()
            .map_err(|e| anyhow!("Failed to commit delete: {}", e))?;

        if removed {
            debug!("Deleted persona: {}", id);
        }
        Ok(removed)
    }

    /// Record a newly attached voice model for a cached persona.
    pub fn attach_voice_model(&self, id: &str, model_id: &str) -> Result<()> {
        let mut persona = self
            .get_persona(id)?
            .ok_or_else(|| anyhow!("Persona not found: {}", id))?;

        persona.voice_model_id = Some(model_id.to_string());
        self.store_persona(&persona)?;
        debug!("Updated persona {} voice model", id);
        Ok(())
    }

    pub fn stats(&self) -> Result<DbStats> {
        let personas = self.list_personas()?;
        let with_voice_model = personas
            .iter()
            .filter(|p| p.voice_model_id.is_some())
            .count();

        Ok(DbStats {
            total_personas: personas.len(),
            with_voice_model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> (PersonaDb, PathBuf) {
        let path = std::env::temp_dir().join(format!("echoes-test-{}.redb", uuid::Uuid::new_v4()));
        let db = PersonaDb::open(Some(path.to_str().unwrap())).unwrap();
        (db, path)
    }

    #[test]
    fn test_store_and_get_roundtrip() {
        let (db, path) = temp_db();

        let persona = Persona::new("Nana", "a kind grandmother");
        db.store_persona(&persona).unwrap();

        let loaded = db.get_persona(&persona.id).unwrap().unwrap();
        assert_eq!(loaded, persona);
        assert!(db.get_persona("missing").unwrap().is_none());

        drop(db);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_attach_voice_model_persists() {
        let (db, path) = temp_db();

        let persona = Persona::new("Grandpa Joe", "a retired carpenter");
        db.store_persona(&persona).unwrap();
        db.attach_voice_model(&persona.id, "vm-7").unwrap();

        let loaded = db.get_persona(&persona.id).unwrap().unwrap();
        assert_eq!(loaded.voice_model_id.as_deref(), Some("vm-7"));

        let stats = db.stats().unwrap();
        assert_eq!(stats.total_personas, 1);
        assert_eq!(stats.with_voice_model, 1);

        drop(db);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_delete_persona() {
        let (db, path) = temp_db();

        let persona = Persona::new("Aunt May", "a cheerful traveler");
        db.store_persona(&persona).unwrap();

        assert!(db.delete_persona(&persona.id).unwrap());
        assert!(!db.delete_persona(&persona.id).unwrap());
        assert!(db.list_personas().unwrap().is_empty());

        drop(db);
        let _ = std::fs::remove_file(path);
    }
}
