//! Deciding when a freshly sampled view state is worth applying

use instant::{Duration, Instant};

use super::types::ViewState;
use crate::core::config::TileLayerOptions;

/// Outcome of offering a candidate view state to the throttle.
#[derive(Debug, Clone, PartialEq)]
pub enum ThrottleDecision {
    /// The state was applied; the desired set must be rebuilt.
    Apply(ViewState),
    /// Same state key as the applied state.
    Unchanged,
    /// Held back as the pending state until its interval elapses.
    Deferred,
}

/// Gates re-application of view states.
///
/// Large jumps (a center shift of at least `immediate_tile_shift` tiles, or two
/// or more zoom levels) apply at once. Smaller changes wait for the zoom
/// throttle when zoom or radius changed, the update throttle otherwise. Only
/// the latest deferred state is kept.
#[derive(Debug, Default)]
pub struct UpdateThrottle {
    applied: Option<ViewState>,
    pending: Option<ViewState>,
    last_applied_at: Option<Instant>,
}

impl UpdateThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applied(&self) -> Option<&ViewState> {
        self.applied.as_ref()
    }

    pub fn pending(&self) -> Option<&ViewState> {
        self.pending.as_ref()
    }

    pub fn reset(&mut self) {
        self.applied = None;
        self.pending = None;
        self.last_applied_at = None;
    }

    /// Offers this frame's candidate.
    pub fn offer(
        &mut self,
        candidate: ViewState,
        now: Instant,
        options: &TileLayerOptions,
    ) -> ThrottleDecision {
        let Some(applied) = &self.applied else {
            return self.apply(candidate, now);
        };

        if is_immediate(applied, &candidate, options.immediate_tile_shift) {
            log::trace!("view jump to {} applies immediately", candidate.state_key);
            return self.apply(candidate, now);
        }

        if applied.state_key == candidate.state_key {
            self.pending = None;
            return ThrottleDecision::Unchanged;
        }

        if self.interval_elapsed(applied, &candidate, now, options) {
            self.apply(candidate, now)
        } else {
            self.pending = Some(candidate);
            ThrottleDecision::Deferred
        }
    }

    /// Applies the pending state once its interval has passed. Used on frames
    /// without a usable candidate, so a deferred view never stalls.
    pub fn poll(&mut self, now: Instant, options: &TileLayerOptions) -> ThrottleDecision {
        let (Some(applied), Some(pending)) = (&self.applied, &self.pending) else {
            return ThrottleDecision::Unchanged;
        };
        if !self.interval_elapsed(applied, pending, now, options) {
            return ThrottleDecision::Deferred;
        }
        match self.pending.take() {
            Some(state) => self.apply(state, now),
            None => ThrottleDecision::Unchanged,
        }
    }

    fn interval_elapsed(
        &self,
        applied: &ViewState,
        candidate: &ViewState,
        now: Instant,
        options: &TileLayerOptions,
    ) -> bool {
        let interval_ms = if applied.zoom != candidate.zoom
            || applied.tile_radius != candidate.tile_radius
        {
            options.zoom_throttle_for(candidate.zoom)
        } else {
            options.update_throttle_for(candidate.zoom)
        };

        let elapsed = self
            .last_applied_at
            .map(|at| now.duration_since(at))
            .unwrap_or(Duration::MAX);
        elapsed >= Duration::from_millis(interval_ms)
    }

    fn apply(&mut self, state: ViewState, now: Instant) -> ThrottleDecision {
        self.pending = None;
        self.applied = Some(state.clone());
        self.last_applied_at = Some(now);
        ThrottleDecision::Apply(state)
    }
}

/// Shift in tiles between two centers, measured at the candidate's zoom and
/// wrap-aware in x.
fn center_shift(applied: &ViewState, candidate: &ViewState) -> u32 {
    let (mut ax, mut ay) = (applied.center_x as i64, applied.center_y as i64);
    if candidate.zoom > applied.zoom {
        let dz = (candidate.zoom - applied.zoom) as u32;
        ax <<= dz;
        ay <<= dz;
    } else if candidate.zoom < applied.zoom {
        let dz = (applied.zoom - candidate.zoom) as u32;
        ax >>= dz;
        ay >>= dz;
    }

    let n = 1i64 << candidate.zoom;
    let raw_dx = (candidate.center_x as i64 - ax).rem_euclid(n);
    let dx = raw_dx.min(n - raw_dx);
    let dy = (candidate.center_y as i64 - ay).abs();
    dx.max(dy) as u32
}

fn is_immediate(applied: &ViewState, candidate: &ViewState, immediate_tile_shift: u32) -> bool {
    let dz = (applied.zoom as i32 - candidate.zoom as i32).abs();
    dz >= 2 || center_shift(applied, candidate) >= immediate_tile_shift
}
