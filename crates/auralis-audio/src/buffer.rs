//! Audio Buffer Cache
//!
//! Buffers are immutable audio payloads held by the rendering engine and
//! identified by a string key: the client-supplied file name for decoded
//! files, or a synthesised key for procedural waveforms. The cache maps keys
//! to engine handles so repeated requests share one engine buffer.
//!
//! Entries whose engine buffer has become invalid are evicted lazily, on the
//! next lookup of the same key.

use std::path::{Path, PathBuf};

use ahash::AHashMap;
use auralis_common::Handle;
use thiserror::Error;
use tracing::{debug, warn};

use crate::engine::RenderEngine;
use crate::waveform::{decode_file, WaveformSpec};

/// Errors raised while constructing a buffer.
#[derive(Debug, Error)]
pub enum BufferError {
    /// The file could not be opened or decoded.
    #[error("Failed to load audio file '{path}': {message}")]
    LoadFailed {
        /// Path to the file that failed to load.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Waveform parameters are out of range.
    #[error("Invalid waveform: {0}")]
    InvalidWaveform(String),

    /// A file buffer was requested with an empty name.
    #[error("Empty buffer key")]
    EmptyKey,

    /// The rendering engine refused to create the buffer.
    #[error("Rendering engine rejected buffer '{0}'")]
    EngineRejected(String),
}

/// Result type for buffer operations.
pub type BufferResult<T> = Result<T, BufferError>;

/// Where a buffer's samples come from.
#[derive(Debug, Clone, PartialEq)]
pub enum BufferSource {
    /// A decodable audio file.
    File {
        /// Cache key, the name the client used.
        key: String,
        /// Resolved location on disk.
        path: PathBuf,
    },
    /// A synthesised waveform.
    Waveform(WaveformSpec),
}

impl BufferSource {
    /// File buffer keyed by its own path.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::File {
            key: path.to_string_lossy().into_owned(),
            path,
        }
    }

    /// File buffer keyed by `name`, resolved against `search_path` when the
    /// name is relative.
    #[must_use]
    pub fn file_in(name: &str, search_path: Option<&Path>) -> Self {
        let candidate = Path::new(name);
        let path = match search_path {
            Some(dir) if candidate.is_relative() => dir.join(candidate),
            _ => candidate.to_path_buf(),
        };
        Self::File {
            key: name.to_string(),
            path,
        }
    }

    /// Cache key for this source.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::File { key, .. } => key.clone(),
            Self::Waveform(spec) => spec.key(),
        }
    }
}

/// A buffer registered in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBuffer {
    key: String,
    handle: Handle,
}

impl AudioBuffer {
    /// Identity key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Engine handle.
    #[must_use]
    pub const fn handle(&self) -> Handle {
        self.handle
    }

    /// Whether the engine still backs this buffer.
    #[must_use]
    pub fn is_valid(&self, engine: &dyn RenderEngine) -> bool {
        engine.is_buffer_valid(self.handle)
    }
}

/// Key to buffer mapping with lazy invalidation.
#[derive(Debug, Default)]
pub struct BufferCache {
    buffers: AHashMap<String, AudioBuffer>,
}

impl BufferCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        debug!("Created audio buffer cache");
        Self::default()
    }

    /// Return the handle for `source`, constructing and caching a buffer if
    /// none is cached or the cached one is no longer valid.
    ///
    /// The boolean is `true` when a new engine buffer was created by this
    /// call. On failure nothing is inserted.
    pub fn acquire(
        &mut self,
        engine: &mut dyn RenderEngine,
        source: &BufferSource,
    ) -> BufferResult<(Handle, bool)> {
        let key = source.key();
        if key.is_empty() {
            return Err(BufferError::EmptyKey);
        }

        if let Some(buffer) = self.buffers.get(&key) {
            if buffer.is_valid(engine) {
                return Ok((buffer.handle, false));
            }
            warn!("Cached buffer '{}' is no longer valid, rebuilding", key);
            self.evict(engine, &key);
        }

        let data = match source {
            BufferSource::File { path, .. } => decode_file(path)?,
            BufferSource::Waveform(spec) => spec.synthesize()?,
        };

        let handle = engine
            .create_buffer(&data)
            .filter(|h| engine.is_buffer_valid(*h))
            .ok_or_else(|| BufferError::EngineRejected(key.clone()))?;

        debug!("Cached buffer '{}' -> {}", key, handle);
        self.buffers.insert(key.clone(), AudioBuffer { key, handle });
        Ok((handle, true))
    }

    /// Remove the entry for `key` and release its engine buffer.
    pub fn evict(&mut self, engine: &mut dyn RenderEngine, key: &str) -> bool {
        match self.buffers.remove(key) {
            Some(buffer) => {
                engine.delete_buffer(buffer.handle);
                true
            },
            None => false,
        }
    }

    /// Release every cached buffer.
    pub fn release_all(&mut self, engine: &mut dyn RenderEngine) {
        for (_, buffer) in self.buffers.drain() {
            engine.delete_buffer(buffer.handle);
        }
    }

    /// Look up a cached buffer by key without validating it.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&AudioBuffer> {
        self.buffers.get(key)
    }

    /// Whether `key` has a cache entry.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.buffers.contains_key(key)
    }

    /// Number of cached buffers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
