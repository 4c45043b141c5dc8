//! ============================================================================
//! Voice Asset Pipeline - reference-audio upload lifecycle
//! ============================================================================
//! Drives one upload job at a time through:
//!   picked -> validating -> uploading -> { succeeded | failed }
//! A new pick replaces any job that has not succeeded and the replaced
//! job's eventual result is discarded. Successful completion is the only
//! path that attaches a voice model to a persona.
//! ============================================================================

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::persona::PersonaStore;
use crate::types::{EchoError, SourceFile};

/// Largest accepted reference-audio file.
pub const MAX_REFERENCE_AUDIO_BYTES: u64 = 10 * 1024 * 1024;

/// External file-selection collaborator. Suspends until the user selects a
/// file or cancels; `None` means cancelled.
#[async_trait]
pub trait FilePicker: Send + Sync {
    async fn pick(&self) -> Result<Option<SourceFile>, EchoError>;
}

/// Upload seam implemented by the backend gateway (and test doubles).
#[async_trait]
pub trait ReferenceUploader: Send + Sync {
    async fn upload_reference(
        &self,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
        name: &str,
    ) -> Result<String, EchoError>;
}

/// Lifecycle of the current upload job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
    Picked(SourceFile),
    Validating,
    Uploading,
    Succeeded { model_id: String },
    Failed { reason: String },
}

/// Terminal outcome reported to the caller of `run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// User backed out of the picker; job state untouched.
    Cancelled,
    /// Upload finished and the voice model was attached to the persona.
    Succeeded { model_id: String },
    /// A newer pick replaced this job; its result was discarded.
    Superseded,
}

struct JobSlot {
    state: Option<UploadState>,
    generation: u64,
}

/// Pipeline owning the upload-job state for one creation session
pub struct VoiceUploadPipeline {
    uploader: Arc<dyn ReferenceUploader>,
    store: Arc<PersonaStore>,
    job: Mutex<JobSlot>,
    max_bytes: u64,
}

impl VoiceUploadPipeline {
    pub fn new(uploader: Arc<dyn ReferenceUploader>, store: Arc<PersonaStore>) -> Self {
        Self {
            uploader,
            store,
            job: Mutex::new(JobSlot {
                state: None,
                generation: 0,
            }),
            max_bytes: MAX_REFERENCE_AUDIO_BYTES,
        }
    }

    /// Override the size limit (tests, product experiments).
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Pure size check; files over the limit never reach the uploader.
    pub fn validate(&self, file: &SourceFile) -> Result<(), EchoError> {
        if file.size_bytes > self.max_bytes {
            return Err(EchoError::ReferenceTooLarge {
                actual_bytes: file.size_bytes,
                max_bytes: self.max_bytes,
            });
        }
        Ok(())
    }

    /// Drive one upload job: pick, validate, upload, attach.
    ///
    /// On success the persona's voice model is attached through the store.
    /// On failure the job lands in `Failed` with the backend's message and
    /// the persona keeps its previous voice model (usually none). There is
    /// no automatic retry.
    pub async fn run(
        &self,
        picker: &dyn FilePicker,
        persona_id: &str,
    ) -> Result<UploadOutcome, EchoError> {
        let Some(file) = picker.pick().await? else {
            debug!("File pick cancelled; upload job untouched");
            return Ok(UploadOutcome::Cancelled);
        };

        info!(
            "Picked reference audio {} ({} bytes)",
            file.display_name, file.size_bytes
        );
        let generation = self.begin_job(file.clone());

        self.set_state(generation, UploadState::Validating);
        if let Err(err) = self.validate(&file) {
            warn!("Reference audio rejected: {}", err);
            self.set_state(
                generation,
                UploadState::Failed {
                    reason: err.message(),
                },
            );
            return Err(err);
        }

        self.set_state(generation, UploadState::Uploading);
        let bytes = match tokio::fs::read(&file.uri).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let err = EchoError::Upload {
                    message: format!("Failed to read {}: {}", file.uri, e),
                    http_status: None,
                };
                self.set_state(
                    generation,
                    UploadState::Failed {
                        reason: err.message(),
                    },
                );
                return Err(err);
            }
        };

        match self
            .uploader
            .upload_reference(
                &file.display_name,
                &file.mime_type,
                bytes,
                &file.display_name,
            )
            .await
        {
            Ok(model_id) => {
                if !self.is_current(generation) {
                    debug!("Upload finished for a superseded job; result discarded");
                    return Ok(UploadOutcome::Superseded);
                }
                self.set_state(
                    generation,
                    UploadState::Succeeded {
                        model_id: model_id.clone(),
                    },
                );
                self.store.attach_voice_model(persona_id, &model_id)?;
                info!("Voice model {} attached to persona {}", model_id, persona_id);
                Ok(UploadOutcome::Succeeded { model_id })
            }
            Err(err) => {
                warn!("Reference upload failed: {}", err);
                self.set_state(
                    generation,
                    UploadState::Failed {
                        reason: err.message(),
                    },
                );
                Err(err)
            }
        }
    }

    /// Current job state, if a job has been started.
    pub fn state(&self) -> Option<UploadState> {
        self.lock_job().state.clone()
    }

    /// Start a new job; replaces whatever job came before it.
    fn begin_job(&self, file: SourceFile) -> u64 {
        let mut job = self.lock_job();
        job.generation += 1;
        job.state = Some(UploadState::Picked(file));
        job.generation
    }

    /// Record a state transition unless the job has been superseded.
    fn set_state(&self, generation: u64, state: UploadState) {
        let mut job = self.lock_job();
        if job.generation == generation {
            job.state = Some(state);
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock_job().generation == generation
    }

    fn lock_job(&self) -> std::sync::MutexGuard<'_, JobSlot> {
        self.job.lock().unwrap_or_else(|e| e.into_inner())
    }
}
