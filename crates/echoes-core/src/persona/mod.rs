//! ============================================================================
//! Persona Store - Echo persona registry
//! ============================================================================
//! Sole writer of persona records. Personas are immutable after creation
//! except `voice_model_id`, which only the voice pipeline sets after a
//! successful reference upload. Construction performs no network I/O;
//! persisting a created Echo on the backend goes through the gateway.
//! ============================================================================

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{AudioSample, EchoError, Persona};

/// Starter personas shipped with the client.
const BUNDLED_PERSONAS: &str = include_str!("personas.json");

/// Input collected by the persona creation flow.
#[derive(Debug, Clone, Default)]
pub struct CreatePersonaInput {
    pub name: String,
    pub description_prompt: String,
    pub audio_samples: Vec<AudioSample>,
}

/// In-memory persona registry
pub struct PersonaStore {
    personas: RwLock<HashMap<String, Persona>>,
}

impl PersonaStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            personas: RwLock::new(HashMap::new()),
        }
    }

    /// Store seeded with the bundled starter dataset.
    pub fn bundled() -> Result<Self, EchoError> {
        let personas: Vec<Persona> = serde_json::from_str(BUNDLED_PERSONAS)
            .map_err(|e| EchoError::PersonaData(e.to_string()))?;
        debug!("Loaded {} bundled personas", personas.len());
        Ok(Self::from_personas(personas))
    }

    /// Store seeded from an explicit set (e.g. the local cache).
    pub fn from_personas(personas: Vec<Persona>) -> Self {
        let store = Self::new();
        for persona in personas {
            store.insert(persona);
        }
        store
    }

    /// Look up a persona by id.
    pub fn get_by_id(&self, id: &str) -> Result<Persona, EchoError> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| EchoError::PersonaNotFound(id.to_string()))
    }

    /// All personas, sorted by name for stable display.
    pub fn list(&self) -> Vec<Persona> {
        let mut personas: Vec<Persona> = self.read().values().cloned().collect();
        personas.sort_by(|a, b| a.name.cmp(&b.name));
        personas
    }

    /// Construct a new persona from creation-flow input. The persona starts
    /// without a cloned voice; no network I/O happens here.
    pub fn create(&self, input: CreatePersonaInput) -> Persona {
        let persona = Persona {
            id: Uuid::new_v4().to_string(),
            name: input.name,
            description_prompt: input.description_prompt,
            audio_samples: input.audio_samples,
            voice_model_id: None,
            initial_conversation: Vec::new(),
        };

        info!("Created persona '{}' ({})", persona.name, persona.id);
        self.insert(persona.clone());
        persona
    }

    /// Register an existing persona record.
    pub fn insert(&self, persona: Persona) {
        self.write().insert(persona.id.clone(), persona);
    }

    /// Bind a cloned voice to a persona. Idempotent for the same model,
    /// overwrites on explicit re-upload.
    pub fn attach_voice_model(&self, id: &str, model_id: &str) -> Result<Persona, EchoError> {
        let mut personas = self.write();
        let persona = personas
            .get_mut(id)
            .ok_or_else(|| EchoError::PersonaNotFound(id.to_string()))?;

        match persona.voice_model_id.as_deref() {
            Some(existing) if existing == model_id => {
                debug!("Voice model {} already attached to {}", model_id, id);
            }
            Some(existing) => {
                info!("Replacing voice model {} with {} on {}", existing, model_id, id);
                persona.voice_model_id = Some(model_id.to_string());
            }
            None => {
                info!("Attached voice model {} to {}", model_id, id);
                persona.voice_model_id = Some(model_id.to_string());
            }
        }

        Ok(persona.clone())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Persona>> {
        self.personas.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Persona>> {
        self.personas.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for PersonaStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_dataset_parses() {
        let store = PersonaStore::bundled().unwrap();
        assert!(!store.is_empty());

        // Every bundled persona has a usable prompt.
        for persona in store.list() {
            assert!(!persona.id.is_empty());
            assert!(!persona.description_prompt.is_empty());
        }
    }

    #[test]
    fn test_get_by_id_unknown() {
        let store = PersonaStore::new();
        let err = store.get_by_id("missing").unwrap_err();
        assert!(matches!(err, EchoError::PersonaNotFound(_)));
    }

    #[test]
    fn test_create_starts_without_voice() {
        let store = PersonaStore::new();
        let persona = store.create(CreatePersonaInput {
            name: "Nana".to_string(),
            description_prompt: "a kind grandmother".to_string(),
            audio_samples: vec![],
        });

        assert!(persona.voice_model_id.is_none());
        assert_eq!(store.get_by_id(&persona.id).unwrap(), persona);
    }

    #[test]
    fn test_attach_voice_model_idempotent() {
        let store = PersonaStore::new();
        let persona = store.create(CreatePersonaInput {
            name: "Nana".to_string(),
            description_prompt: "a kind grandmother".to_string(),
            audio_samples: vec![],
        });

        let once = store.attach_voice_model(&persona.id, "vm-1").unwrap();
        let twice = store.attach_voice_model(&persona.id, "vm-1").unwrap();
        assert_eq!(once, twice);
        assert_eq!(twice.voice_model_id.as_deref(), Some("vm-1"));
    }

    #[test]
    fn test_attach_voice_model_overwrites() {
        let store = PersonaStore::new();
        let persona = store.create(CreatePersonaInput {
            name: "Nana".to_string(),
            description_prompt: "a kind grandmother".to_string(),
            audio_samples: vec![],
        });

        store.attach_voice_model(&persona.id, "vm-1").unwrap();
        let replaced = store.attach_voice_model(&persona.id, "vm-2").unwrap();
        assert_eq!(replaced.voice_model_id.as_deref(), Some("vm-2"));
    }

    #[test]
    fn test_attach_voice_model_unknown_persona() {
        let store = PersonaStore::new();
        let err = store.attach_voice_model("missing", "vm-1").unwrap_err();
        assert!(matches!(err, EchoError::PersonaNotFound(_)));
    }
}
