//! Audio Handler
//!
//! The resource manager that owns every source, the buffer cache and the
//! listener, and multiplexes client commands onto engine handles.
//!
//! # Architecture
//!
//! ```text
//! command path ──┐                       ┌── tick path
//!                ▼                       ▼
//!        ┌─────────────────────────────────────────┐
//!        │ Mutex<HandlerState>                     │
//!        │  engine   sources   buffers   listener  │
//!        │  retained (deleted, bounded)   mailbox  │
//!        └─────────────────────────────────────────┘
//! ```
//!
//! All state sits behind one lock, so the clear/resolve/mutate/nominate
//! sequence of a command is atomic with respect to mailbox readers and to
//! the fade sweep.
//!
//! Deleted sources are moved out of the live map into a small FIFO of
//! retained objects. Physical reclamation happens only when the FIFO grows
//! past [`LAZY_DELETION_CAPACITY`], so the number of retained objects stays
//! bounded.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use ahash::AHashMap;
use auralis_common::{Clock, Handle, MonotonicClock, Time};
use glam::Vec3;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::buffer::{BufferCache, BufferSource};
use crate::engine::RenderEngine;
use crate::listener::AudioListener;
use crate::source::{AudioSource, SourceParameter, SourceState};
use crate::unit::{AudioUnit, UnitSnapshot};
use crate::waveform::WaveformSpec;

/// Number of deleted sources retained before the oldest is reclaimed.
pub const LAZY_DELETION_CAPACITY: usize = 5;

/// Default rolloff factor applied to new sources.
pub const DEFAULT_ROLLOFF_FACTOR: f32 = 1.0;

/// Default reference distance applied to new sources.
pub const DEFAULT_REFERENCE_DISTANCE: f32 = 1.0;

/// Process-wide rendering parameter codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum GlobalParameter {
    /// Speed of sound, positive.
    SpeedOfSound = 1,
    /// Doppler factor, non-negative.
    DopplerFactor = 2,
    /// Rolloff factor given to sources created afterwards.
    DefaultRolloffFactor = 3,
    /// Reference distance given to sources created afterwards.
    DefaultReferenceDistance = 4,
}

impl GlobalParameter {
    /// Parse from the numeric wire code.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::SpeedOfSound),
            2 => Some(Self::DopplerFactor),
            3 => Some(Self::DefaultRolloffFactor),
            4 => Some(Self::DefaultReferenceDistance),
            _ => None,
        }
    }
}

/// Mailbox entry naming the most recently modified unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecentUnit {
    Source(Handle),
    Listener,
}

/// Slot storage for live sources with a one-entry lookup cache.
#[derive(Debug, Default)]
struct SourceArena {
    slots: Vec<Option<AudioSource>>,
    free: Vec<usize>,
    index: AHashMap<Handle, usize>,
    recent: Option<(Handle, usize)>,
}

impl SourceArena {
    fn insert(&mut self, source: AudioSource) {
        let handle = source.source_handle();
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(source);
                slot
            },
            None => {
                self.slots.push(Some(source));
                self.slots.len() - 1
            },
        };
        self.index.insert(handle, slot);
        self.recent = Some((handle, slot));
    }

    fn slot_of(&mut self, handle: Handle) -> Option<usize> {
        if let Some((cached, slot)) = self.recent {
            if cached == handle {
                return Some(slot);
            }
        }
        let slot = *self.index.get(&handle)?;
        self.recent = Some((handle, slot));
        Some(slot)
    }

    fn get(&self, handle: Handle) -> Option<&AudioSource> {
        let slot = match self.recent {
            Some((cached, slot)) if cached == handle => slot,
            _ => *self.index.get(&handle)?,
        };
        self.slots.get(slot)?.as_ref()
    }

    fn get_mut(&mut self, handle: Handle) -> Option<&mut AudioSource> {
        let slot = self.slot_of(handle)?;
        self.slots.get_mut(slot)?.as_mut()
    }

    fn remove(&mut self, handle: Handle) -> Option<AudioSource> {
        let slot = self.index.remove(&handle)?;
        if matches!(self.recent, Some((cached, _)) if cached == handle) {
            self.recent = None;
        }
        self.free.push(slot);
        self.slots.get_mut(slot)?.take()
    }

    fn iter(&self) -> impl Iterator<Item = &AudioSource> {
        self.slots.iter().flatten()
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut AudioSource> {
        self.slots.iter_mut().flatten()
    }

    fn drain(&mut self) -> Vec<AudioSource> {
        self.index.clear();
        self.free.clear();
        self.recent = None;
        self.slots.drain(..).flatten().collect()
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

struct HandlerState {
    engine: Box<dyn RenderEngine>,
    sources: SourceArena,
    buffers: BufferCache,
    listener: AudioListener,
    retained: VecDeque<AudioSource>,
    mailbox: Option<RecentUnit>,
    default_rolloff: f32,
    default_reference: f32,
    search_path: Option<PathBuf>,
}

impl HandlerState {
    fn spawn_source(&mut self, buffer: Handle) -> Option<Handle> {
        let source = AudioSource::create(
            self.engine.as_mut(),
            buffer,
            self.default_rolloff,
            self.default_reference,
        )?;
        let handle = source.source_handle();
        self.sources.insert(source);
        self.mailbox = Some(RecentUnit::Source(handle));
        Some(handle)
    }

    fn retain(&mut self, source: AudioSource) {
        self.retained.push_back(source);
        while self.retained.len() > LAZY_DELETION_CAPACITY {
            if let Some(reclaimed) = self.retained.pop_front() {
                debug!("Reclaimed deleted source {}", reclaimed.source_handle());
            }
        }
    }
}

fn find_retained(retained: &VecDeque<AudioSource>, handle: Handle) -> Option<&AudioSource> {
    retained.iter().rev().find(|s| s.source_handle() == handle)
}

/// The audio-unit resource manager.
///
/// Every operation takes `&self`; share it across tasks with an `Arc`.
/// Mutators never fail loudly: they return `false` (or `None` for
/// creation) and leave state unchanged.
pub struct AudioHandler {
    state: Mutex<HandlerState>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AudioHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AudioHandler")
            .field("engine", &state.engine.name())
            .field("sources", &state.sources.len())
            .field("buffers", &state.buffers.len())
            .field("retained", &state.retained.len())
            .finish_non_exhaustive()
    }
}

impl AudioHandler {
    /// Create a handler driving `engine`, timed by the monotonic clock.
    pub fn new(engine: impl RenderEngine + 'static) -> Self {
        Self::with_clock(engine, Arc::new(MonotonicClock))
    }

    /// Create a handler driving `engine`, timed by `clock`.
    pub fn with_clock(engine: impl RenderEngine + 'static, clock: Arc<dyn Clock>) -> Self {
        let mut engine: Box<dyn RenderEngine> = Box::new(engine);
        let mut listener = AudioListener::new();
        listener.reset(engine.as_mut());
        info!("Initialized audio handler on {} engine", engine.name());

        Self {
            state: Mutex::new(HandlerState {
                engine,
                sources: SourceArena::default(),
                buffers: BufferCache::new(),
                listener,
                retained: VecDeque::with_capacity(LAZY_DELETION_CAPACITY + 1),
                mailbox: Some(RecentUnit::Listener),
                default_rolloff: DEFAULT_ROLLOFF_FACTOR,
                default_reference: DEFAULT_REFERENCE_DISTANCE,
                search_path: None,
            }),
            clock,
        }
    }

    /// Resolve relative file names against `path`.
    #[must_use]
    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state.get_mut().search_path = Some(path.into());
        self
    }

    /// Directory relative file names are resolved against.
    #[must_use]
    pub fn search_path(&self) -> Option<PathBuf> {
        self.state.lock().search_path.clone()
    }

    /// Name of the rendering engine.
    #[must_use]
    pub fn engine_name(&self) -> &'static str {
        self.state.lock().engine.name()
    }

    fn now(&self) -> Time {
        self.clock.now()
    }

    // ============================================
    // Source Creation and Deletion
    // ============================================

    /// Create a source playing an existing engine buffer.
    pub fn create_source_from_buffer(&self, buffer: Handle) -> Option<Handle> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.mailbox = None;
        if !state.engine.is_buffer_valid(buffer) {
            debug!("Refusing source for invalid buffer {}", buffer);
            return None;
        }
        state.spawn_source(buffer)
    }

    /// Create a source playing a decoded file. Relative names are resolved
    /// against the search path; the cache key is the name as given.
    pub fn create_source_from_file(&self, name: &str) -> Option<Handle> {
        let source = {
            let state = self.state.lock();
            BufferSource::file_in(name, state.search_path.as_deref())
        };
        self.create_source_from(&source)
    }

    /// Create a source playing a synthesised waveform.
    pub fn create_source_from_waveform(&self, spec: WaveformSpec) -> Option<Handle> {
        self.create_source_from(&BufferSource::Waveform(spec))
    }

    fn create_source_from(&self, source: &BufferSource) -> Option<Handle> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.mailbox = None;

        let key = source.key();
        let (buffer, created) = match state.buffers.acquire(state.engine.as_mut(), source) {
            Ok(acquired) => acquired,
            Err(e) => {
                warn!("Failed to create source: {}", e);
                return None;
            },
        };

        let handle = state.spawn_source(buffer);
        if handle.is_none() {
            warn!("Rendering engine refused a source for buffer '{}'", key);
            if created {
                state.buffers.evict(state.engine.as_mut(), &key);
            }
        }
        handle
    }

    /// Delete a source. The source enters the pending-delete state, is
    /// nominated as recently modified and moves to the retained queue.
    /// Unknown handles are a no-op.
    pub fn delete_source(&self, handle: Handle) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.mailbox = None;

        let Some(mut source) = state.sources.remove(handle) else {
            return false;
        };
        source.delete(state.engine.as_mut());
        debug!("Deleted source {}", handle);
        state.retain(source);
        state.mailbox = Some(RecentUnit::Source(handle));
        true
    }

    // ============================================
    // Source Mutators
    // ============================================

    fn with_source(
        &self,
        handle: Handle,
        mutate: impl FnOnce(&mut AudioSource, &mut dyn RenderEngine, Time) -> bool,
    ) -> bool {
        let now = self.now();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.mailbox = None;

        let Some(source) = state.sources.get_mut(handle) else {
            return false;
        };
        let applied = mutate(source, state.engine.as_mut(), now);
        if applied {
            state.mailbox = Some(RecentUnit::Source(handle));
        }
        applied
    }

    /// Start or resume playback.
    pub fn play_source(&self, handle: Handle) -> bool {
        self.with_source(handle, |s, e, _| s.play(e))
    }

    /// Stop playback.
    pub fn stop_source(&self, handle: Handle) -> bool {
        self.with_source(handle, |s, e, _| s.stop(e))
    }

    /// Pause playback.
    pub fn pause_source(&self, handle: Handle) -> bool {
        self.with_source(handle, |s, e, _| s.pause(e))
    }

    /// Set source gain. Cancels any fade in progress.
    pub fn set_source_gain(&self, handle: Handle, gain: f32) -> bool {
        self.with_source(handle, |s, e, _| s.set_gain(e, gain))
    }

    /// Set source position.
    pub fn set_source_position(&self, handle: Handle, position: Vec3) -> bool {
        self.with_source(handle, |s, e, _| s.set_position(e, position))
    }

    /// Set source velocity.
    pub fn set_source_velocity(&self, handle: Handle, velocity: Vec3) -> bool {
        self.with_source(handle, |s, e, _| s.set_velocity(e, velocity))
    }

    /// Set source velocity to `speed` along its direction.
    pub fn set_source_speed(&self, handle: Handle, speed: f32) -> bool {
        self.with_source(handle, |s, e, _| s.set_speed(e, speed))
    }

    /// Set source facing direction.
    pub fn set_source_direction(&self, handle: Handle, direction: Vec3) -> bool {
        self.with_source(handle, |s, e, _| s.set_direction(e, direction))
    }

    /// Set source facing direction from an angle in the XZ plane, in radians.
    pub fn set_source_direction_angle(&self, handle: Handle, angle: f32) -> bool {
        self.with_source(handle, |s, e, _| s.set_direction_angle(e, angle))
    }

    /// Set source pitch. Pitch must be positive.
    pub fn set_source_pitch(&self, handle: Handle, pitch: f32) -> bool {
        self.with_source(handle, |s, e, _| s.set_pitch(e, pitch))
    }

    /// Enable or disable looping.
    pub fn set_source_loop(&self, handle: Handle, looping: bool) -> bool {
        self.with_source(handle, |s, e, _| s.set_loop(e, looping))
    }

    /// Seek a source to `seconds` into its buffer.
    pub fn set_source_playback_position(&self, handle: Handle, seconds: f32) -> bool {
        self.with_source(handle, |s, e, _| s.set_playback_position(e, seconds))
    }

    /// Fade a source's gain to `target` over `duration` seconds.
    pub fn fade_source(&self, handle: Handle, target: f32, duration: f64) -> bool {
        self.with_source(handle, |s, e, now| s.fade(e, target, duration, now))
    }

    /// Set a per-source distance or cone parameter by numeric code.
    pub fn set_sound_rendering_parameter(&self, handle: Handle, code: u32, value: f32) -> bool {
        let Some(parameter) = SourceParameter::from_code(code) else {
            warn!("Ignoring unknown source parameter code {}", code);
            self.state.lock().mailbox = None;
            return false;
        };
        self.with_source(handle, |s, e, _| s.set_parameter(e, parameter, value))
    }

    /// Playback state of a source after reconciling with the engine.
    ///
    /// Deleted sources still held in the retained queue report
    /// [`SourceState::PendingDelete`]. The source is nominated as recently
    /// modified only when reconciliation changed its state or gain.
    pub fn source_state(&self, handle: Handle) -> Option<SourceState> {
        let now = self.now();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(source) = state.sources.get_mut(handle) else {
            return find_retained(&state.retained, handle).map(AudioSource::state);
        };
        let before = (source.state(), source.gain());
        source.update(state.engine.as_mut(), now, true);
        let after = (source.state(), source.gain());
        if before != after {
            state.mailbox = Some(RecentUnit::Source(handle));
        }
        Some(after.0)
    }

    // ============================================
    // Listener and Global Parameters
    // ============================================

    fn with_listener(
        &self,
        mutate: impl FnOnce(&mut AudioListener, &mut dyn RenderEngine) -> bool,
    ) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.mailbox = None;

        let applied = mutate(&mut state.listener, state.engine.as_mut());
        if applied {
            state.mailbox = Some(RecentUnit::Listener);
        }
        applied
    }

    /// Set listener gain.
    pub fn set_listener_gain(&self, gain: f32) -> bool {
        self.with_listener(|l, e| l.set_gain(e, gain))
    }

    /// Set listener position.
    pub fn set_listener_position(&self, position: Vec3) -> bool {
        self.with_listener(|l, e| l.set_position(e, position))
    }

    /// Set listener velocity.
    pub fn set_listener_velocity(&self, velocity: Vec3) -> bool {
        self.with_listener(|l, e| l.set_velocity(e, velocity))
    }

    /// Set listener orientation.
    pub fn set_listener_orientation(&self, at: Vec3, up: Vec3) -> bool {
        self.with_listener(|l, e| l.set_orientation(e, at, up))
    }

    /// Set a process-wide rendering parameter by numeric code.
    ///
    /// Speed of sound and doppler factor change the listener and nominate it.
    /// The default rolloff and reference distance only affect sources
    /// created afterwards and leave the mailbox alone. Unknown codes are
    /// logged and ignored.
    pub fn set_rendering_parameter(&self, code: u32, value: f32) -> bool {
        match GlobalParameter::from_code(code) {
            Some(GlobalParameter::SpeedOfSound) => {
                self.with_listener(|l, e| l.set_speed_of_sound(e, value))
            },
            Some(GlobalParameter::DopplerFactor) => {
                self.with_listener(|l, e| l.set_doppler_factor(e, value))
            },
            Some(GlobalParameter::DefaultRolloffFactor) => self.set_default_rolloff_factor(value),
            Some(GlobalParameter::DefaultReferenceDistance) => {
                self.set_default_reference_distance(value)
            },
            None => {
                warn!("Ignoring unknown rendering parameter code {}", code);
                false
            },
        }
    }

    /// Rolloff factor for sources created from now on.
    pub fn set_default_rolloff_factor(&self, value: f32) -> bool {
        if !value.is_finite() || value < 0.0 {
            return false;
        }
        self.state.lock().default_rolloff = value;
        true
    }

    /// Reference distance for sources created from now on.
    pub fn set_default_reference_distance(&self, value: f32) -> bool {
        if !value.is_finite() || value < 0.0 {
            return false;
        }
        self.state.lock().default_reference = value;
        true
    }

    /// Current default rolloff factor.
    #[must_use]
    pub fn default_rolloff_factor(&self) -> f32 {
        self.state.lock().default_rolloff
    }

    /// Current default reference distance.
    #[must_use]
    pub fn default_reference_distance(&self) -> f32 {
        self.state.lock().default_reference
    }

    // ============================================
    // Sweep and Observation
    // ============================================

    /// Advance every live source and append an invalidated copy of each one
    /// that changed. Returns the number appended.
    pub fn populate_updated_sources(&self, out: &mut Vec<UnitSnapshot>) -> usize {
        let now = self.now();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let before = out.len();
        for source in state.sources.iter_mut() {
            if source.update(state.engine.as_mut(), now, false) {
                out.push(UnitSnapshot::Source(source.snapshot()));
            }
        }
        out.len() - before
    }

    /// Advance every live source without collecting copies. Returns the
    /// number of sources that changed.
    pub fn update_sources(&self) -> usize {
        let now = self.now();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let mut changed = 0;
        for source in state.sources.iter_mut() {
            if source.update(state.engine.as_mut(), now, false) {
                changed += 1;
            }
        }
        changed
    }

    /// Take the most recently modified unit, as an invalidated copy.
    /// Returns `None` if nothing changed since the last call.
    pub fn recently_modified_unit(&self) -> Option<UnitSnapshot> {
        let mut state = self.state.lock();
        match state.mailbox.take()? {
            RecentUnit::Listener => Some(UnitSnapshot::Listener(state.listener.snapshot())),
            RecentUnit::Source(handle) => state
                .sources
                .get(handle)
                .or_else(|| find_retained(&state.retained, handle))
                .map(|source| UnitSnapshot::Source(source.snapshot())),
        }
    }

    /// Invalidated copy of the listener.
    #[must_use]
    pub fn listener_snapshot(&self) -> AudioListener {
        self.state.lock().listener.snapshot()
    }

    /// Invalidated copy of a live source.
    #[must_use]
    pub fn source_snapshot(&self, handle: Handle) -> Option<AudioSource> {
        self.state.lock().sources.get(handle).map(AudioSource::snapshot)
    }

    /// Handles of every live source.
    #[must_use]
    pub fn source_handles(&self) -> Vec<Handle> {
        self.state
            .lock()
            .sources
            .iter()
            .map(AudioSource::source_handle)
            .collect()
    }

    /// Number of live sources.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.state.lock().sources.len()
    }

    /// Number of cached buffers.
    #[must_use]
    pub fn buffer_count(&self) -> usize {
        self.state.lock().buffers.len()
    }

    /// Number of deleted sources awaiting reclamation.
    #[must_use]
    pub fn retained_count(&self) -> usize {
        self.state.lock().retained.len()
    }

    /// Whether the buffer cache has an entry for `key`.
    #[must_use]
    pub fn has_buffer(&self, key: &str) -> bool {
        self.state.lock().buffers.contains(key)
    }

    // ============================================
    // Teardown
    // ============================================

    /// Free every source and buffer, drain the retained queue and reset the
    /// listener. The listener is nominated as recently modified.
    pub fn release(&self) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let sources = state.sources.drain();
        let count = sources.len();
        for mut source in sources {
            source.delete(state.engine.as_mut());
        }
        state.retained.clear();
        state.buffers.release_all(state.engine.as_mut());
        state.listener.reset(state.engine.as_mut());
        state.mailbox = Some(RecentUnit::Listener);
        info!("Released audio handler ({} sources)", count);
    }
}
