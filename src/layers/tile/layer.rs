//! Core TileLayer implementation

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use instant::Instant;

use super::{
    cache::TileCache,
    fallback,
    loader::{FetchCompletion, TileFetcher, TileRequest},
    queue::LoadQueue,
    sampler::{self, FrameInput},
    source::{TileSource, UrlTemplateSource},
    surface::TileSurface,
    telemetry::{DebugOverlay, FetchCounters, TileTelemetry},
    throttle::{ThrottleDecision, UpdateThrottle},
    types::{DesiredTile, Tile, TileKey, TileState, ViewState},
};
use crate::{
    core::{config::TileLayerOptions, geo::LocalFrame},
    ConfigError, Result,
};

/// Streams tiles for one raster source onto the ground plane.
///
/// Call [`TileLayer::update`] once per frame with the camera state. The layer
/// owns every tile and its surface; hosts read [`TileLayer::visible_surfaces`]
/// and [`TileLayer::telemetry`] afterwards.
///
/// Per frame, in order: completions are applied, the camera is sampled and
/// offered to the throttle, an applied view rebuilds the desired set, the
/// queue is drained, fallbacks and fades are updated, and an applied view
/// finally triggers eviction.
pub struct TileLayer {
    options: TileLayerOptions,
    local: LocalFrame,
    source: Box<dyn TileSource>,
    fetcher: Box<dyn TileFetcher>,
    completions_tx: Sender<FetchCompletion>,
    completions_rx: Receiver<FetchCompletion>,
    cache: TileCache,
    queue: LoadQueue,
    throttle: UpdateThrottle,
    desired: Vec<DesiredTile>,
    frame: u64,
    /// Stamped on every dispatch; never reused.
    generation: u64,
    in_flight: usize,
    counters: FetchCounters,
    last_update: Option<Instant>,
    overlay: Option<DebugOverlay>,
    telemetry: TileTelemetry,
}

impl TileLayer {
    /// Builds a layer fetching through `fetcher`. Fails on invalid options.
    pub fn new(options: TileLayerOptions, fetcher: Box<dyn TileFetcher>) -> Result<Self> {
        options.validate()?;
        let (completions_tx, completions_rx) = unbounded();
        Ok(Self {
            local: LocalFrame::new(options.origin, options.meters_per_render_unit),
            source: Box::new(UrlTemplateSource::from_options(&options)),
            fetcher,
            completions_tx,
            completions_rx,
            cache: TileCache::new(),
            queue: LoadQueue::new(),
            throttle: UpdateThrottle::new(),
            desired: Vec::new(),
            frame: 0,
            generation: 0,
            in_flight: 0,
            counters: FetchCounters::default(),
            last_update: None,
            overlay: None,
            telemetry: TileTelemetry::default(),
            options,
        })
    }

    /// Builds a layer that fetches over HTTP on the crate runtime.
    #[cfg(feature = "render")]
    pub fn http(options: TileLayerOptions) -> Result<Self> {
        let source = super::loader::HttpImageSource::from_options(&options)?;
        Self::new(
            options,
            Box::new(super::loader::AsyncTileFetcher::new(source)),
        )
    }

    /// Replaces the URL builder derived from the options.
    pub fn with_tile_source(mut self, source: Box<dyn TileSource>) -> Self {
        self.source = source;
        self
    }

    pub fn options(&self) -> &TileLayerOptions {
        &self.options
    }

    pub fn local_frame(&self) -> &LocalFrame {
        &self.local
    }

    /// Frames processed so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn is_enabled(&self) -> bool {
        self.options.enabled
    }

    /// Advances one frame.
    pub fn update(&mut self, input: &FrameInput, now: Instant) {
        self.frame += 1;
        let dt_ms = self
            .last_update
            .map(|last| now.duration_since(last).as_secs_f64() * 1000.0)
            .unwrap_or(0.0);
        self.last_update = Some(now);

        self.drain_completions();

        if !self.options.enabled {
            fallback::hide_all(&mut self.cache);
            self.refresh_telemetry();
            return;
        }

        self.drain_queue();

        let decision = match sampler::sample_view(input, &self.options, &self.local) {
            Some(candidate) => self.throttle.offer(candidate, now, &self.options),
            None => self.throttle.poll(now, &self.options),
        };
        let mut applied = false;
        match decision {
            ThrottleDecision::Apply(view) => {
                self.apply_view(&view, input);
                applied = true;
            }
            ThrottleDecision::Deferred => {
                log::trace!("view change deferred at frame {}", self.frame);
            }
            ThrottleDecision::Unchanged => {}
        }

        self.drain_queue();

        let selected = fallback::select_tiles(
            &mut self.cache,
            &mut self.queue,
            &self.desired,
            self.frame,
            &self.options,
            &self.local,
        );
        fallback::update_opacity(&mut self.cache, &selected, self.frame, dt_ms, &self.options);

        if applied {
            self.evict();
        }

        self.refresh_telemetry();
    }

    fn apply_view(&mut self, view: &ViewState, input: &FrameInput) {
        self.desired = sampler::desired_tiles(view, &self.options, &self.local);

        let mut enqueued = 0;
        for wanted in &self.desired {
            let local = &self.local;
            let tile = self.cache.get_or_create(wanted.coord, self.frame, || {
                wanted.rect.unwrap_or_else(|| local.tile_rect(&wanted.coord))
            });
            tile.priority = wanted.priority;
            tile.mark_wanted(self.frame);
            if tile.needs_fetch(self.options.retry_limit) {
                tile.mark_queued();
                self.queue.push(wanted.coord);
                enqueued += 1;
            }
        }

        self.overlay = self.options.debug_overlay.then(|| DebugOverlay {
            desired: self
                .desired
                .iter()
                .map(|d| d.rect.unwrap_or_else(|| self.local.tile_rect(&d.coord)))
                .collect(),
            viewport: view.viewport_bounds,
            focus: if input.focus.is_finite() {
                input.focus
            } else {
                self.local.tile_rect(&view.center()).center
            },
        });

        log::debug!(
            "applied view {} ({} desired, {} newly queued)",
            view.state_key,
            self.desired.len(),
            enqueued
        );
    }

    fn drain_completions(&mut self) {
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            self.apply_completion(completion);
        }
    }

    fn apply_completion(&mut self, completion: FetchCompletion) {
        let key = completion.coord;
        let Some(tile) = self.cache.get_mut(&key) else {
            self.counters.stale += 1;
            log::trace!("dropping response for evicted tile {}", key);
            return;
        };
        if !tile.is_current_attempt(completion.generation) {
            self.counters.stale += 1;
            log::trace!(
                "dropping stale response for tile {} (generation {})",
                key,
                completion.generation
            );
            return;
        }

        match completion.outcome {
            Ok(image) => {
                tile.mark_ready(Arc::new(image));
                log::debug!("tile {} ready after {} attempt(s)", key, tile.attempts);
            }
            Err(e) => {
                self.counters.failed += 1;
                tile.mark_error();
                if tile.can_retry(self.options.retry_limit) {
                    log::debug!("tile {} failed ({}), retrying", key, e);
                    tile.mark_queued();
                    self.queue.push(key);
                } else {
                    log::warn!(
                        "tile {} failed after {} attempts: {}",
                        key,
                        tile.attempts,
                        e
                    );
                }
            }
        }
    }

    /// Dispatches queued tiles, closest first, while slots are free.
    fn drain_queue(&mut self) {
        while self.in_flight < self.options.max_concurrent_requests {
            let cache = &self.cache;
            let next = self.queue.pop_next(|key| {
                cache
                    .get(key)
                    .filter(|tile| tile.state == TileState::Queued)
                    .map(|tile| tile.priority)
            });
            let Some(key) = next else {
                break;
            };
            self.dispatch(key);
        }
    }

    fn dispatch(&mut self, key: TileKey) {
        let Some(tile) = self.cache.get_mut(&key) else {
            return;
        };
        self.generation += 1;
        tile.begin_load(self.generation);

        let request = TileRequest {
            coord: key,
            url: self.source.url(key),
            generation: self.generation,
        };
        log::trace!("fetching {} from {}", key, request.url);

        self.in_flight += 1;
        self.counters.dispatched += 1;
        self.fetcher.fetch(request, self.completions_tx.clone());
    }

    fn evict(&mut self) {
        let stale = self.cache.evict_stale(self.frame, self.options.retain_frames);
        let over = self
            .cache
            .evict_over_capacity(self.frame, self.options.max_cached_tiles);
        if stale + over > 0 {
            log::debug!(
                "evicted {} stale and {} over-capacity tiles, {} cached",
                stale,
                over,
                self.cache.len()
            );
        }
    }

    fn refresh_telemetry(&mut self) {
        self.telemetry = TileTelemetry::collect(
            &self.cache,
            self.throttle.applied(),
            self.desired.len(),
            self.counters,
        );
    }

    /// Snapshot taken at the end of the last update.
    pub fn telemetry(&self) -> &TileTelemetry {
        &self.telemetry
    }

    /// `None` unless `debug_overlay` is on and a view has been applied.
    pub fn debug_overlay(&self) -> Option<&DebugOverlay> {
        self.overlay.as_ref()
    }

    pub fn view_state(&self) -> Option<&ViewState> {
        self.throttle.applied()
    }

    /// View state waiting for its throttle interval.
    pub fn pending_view(&self) -> Option<&ViewState> {
        self.throttle.pending()
    }

    pub fn desired(&self) -> &[DesiredTile] {
        &self.desired
    }

    pub fn tile(&self, coord: TileKey) -> Option<&Tile> {
        self.cache.get(&coord)
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.cache.iter()
    }

    pub fn tile_count(&self) -> usize {
        self.cache.len()
    }

    /// Fetches dispatched and not yet answered.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Every cached surface, visible or not.
    pub fn surfaces(&self) -> impl Iterator<Item = &TileSurface> {
        self.cache.iter().map(Tile::surface)
    }

    /// Visible surfaces in draw order: coarser zooms first.
    pub fn visible_surfaces(&self) -> Vec<&TileSurface> {
        let mut surfaces: Vec<_> = self.surfaces().filter(|s| s.is_visible()).collect();
        surfaces.sort_by_key(|s| (s.render_order(), s.coord()));
        surfaces
    }

    /// Drops every tile and forgets the applied view. Responses still in
    /// flight find no tile and are discarded.
    pub fn clear(&mut self) {
        log::debug!("clearing {} tiles", self.cache.len());
        self.cache.clear();
        self.queue.clear();
        self.throttle.reset();
        self.desired.clear();
        self.overlay = None;
        self.refresh_telemetry();
    }

    /// Disabling hides every surface and suspends scheduling.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.options.enabled == enabled {
            return;
        }
        self.options.enabled = enabled;
        if enabled {
            self.throttle.reset();
        } else {
            fallback::hide_all(&mut self.cache);
            self.refresh_telemetry();
        }
    }

    /// Merges a JSON object of options into the current ones.
    pub fn set_options(&mut self, patch: serde_json::Value) -> Result<()> {
        let serde_json::Value::Object(patch) = patch else {
            return Err(ConfigError::InvalidValue {
                field: "options",
                reason: "expected a JSON object".to_string(),
            }
            .into());
        };
        let mut merged = serde_json::to_value(&self.options).map_err(ConfigError::from)?;
        if let Some(current) = merged.as_object_mut() {
            current.extend(patch);
        }
        let options: TileLayerOptions =
            serde_json::from_value(merged).map_err(ConfigError::from)?;
        self.set_tile_options(options)
    }

    /// Replaces the options. Changes to geometry or the tile source drop the
    /// cache; anything else keeps it and re-applies the view.
    pub fn set_tile_options(&mut self, options: TileLayerOptions) -> Result<()> {
        options.validate()?;

        let invalidates_tiles = options.origin != self.options.origin
            || options.meters_per_render_unit != self.options.meters_per_render_unit
            || options.url_template != self.options.url_template
            || options.row_convention != self.options.row_convention
            || options.subdomains != self.options.subdomains;
        let enabled_changed = options.enabled != self.options.enabled;

        self.local = LocalFrame::new(options.origin, options.meters_per_render_unit);
        self.source = Box::new(UrlTemplateSource::from_options(&options));
        self.options = options;

        if invalidates_tiles {
            self.clear();
        } else {
            self.throttle.reset();
        }
        if enabled_changed && !self.options.enabled {
            fallback::hide_all(&mut self.cache);
            self.refresh_telemetry();
        }
        Ok(())
    }
}

impl std::fmt::Debug for TileLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileLayer")
            .field("frame", &self.frame)
            .field("tiles", &self.cache.len())
            .field("queued", &self.queue.len())
            .field("in_flight", &self.in_flight)
            .field("view", &self.throttle.applied().map(|v| &v.state_key))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::{Point, TileCoord};
    use crate::layers::tile::{loader::ManualFetcher, surface::TileImage};

    fn layer() -> (TileLayer, ManualFetcher) {
        let fetcher = ManualFetcher::new();
        let layer =
            TileLayer::new(TileLayerOptions::for_testing(), Box::new(fetcher.clone())).unwrap();
        (layer, fetcher)
    }

    fn image() -> TileImage {
        TileImage::new(1, 1, vec![255; 4])
    }

    #[test]
    fn test_invalid_options_fail_construction() {
        let options = TileLayerOptions {
            min_zoom: 10,
            max_zoom: 3,
            ..TileLayerOptions::for_testing()
        };
        let result = TileLayer::new(options, Box::new(ManualFetcher::new()));
        assert!(matches!(
            result,
            Err(crate::Error::Config(ConfigError::InvalidZoomRange { .. }))
        ));
    }

    #[test]
    fn test_first_frame_dispatches_up_to_the_cap() {
        let (mut layer, fetcher) = layer();
        layer.update(&FrameInput::new(Point::new(0.0, 0.0), 100_000.0), Instant::now());

        assert_eq!(layer.desired().len(), 25);
        assert_eq!(fetcher.pending_count(), 4);
        assert_eq!(layer.in_flight(), 4);
        assert_eq!(layer.telemetry().loading_count, 4);
        assert_eq!(layer.telemetry().requested_count, 25);
        // The closest tile goes first.
        assert_eq!(fetcher.history()[0].coord, TileCoord::new(512, 512, 10));
        assert_eq!(fetcher.history()[0].url, "test://10/512/512.png");
    }

    #[test]
    fn test_clear_drops_tiles_and_makes_responses_stale() {
        let (mut layer, fetcher) = layer();
        let input = FrameInput::new(Point::new(0.0, 0.0), 100_000.0);
        let t0 = Instant::now();
        layer.update(&input, t0);
        layer.clear();
        assert_eq!(layer.tile_count(), 0);
        assert!(layer.view_state().is_none());

        fetcher.complete_all(&image());
        layer.update(&input, t0);
        assert_eq!(layer.telemetry().stale_responses, 4);
        // The view was re-applied and fetches resumed.
        assert_eq!(layer.telemetry().requested_count, 25);
        assert_eq!(layer.in_flight(), 4);
    }

    #[test]
    fn test_disabled_layer_suspends_scheduling() {
        let (mut layer, fetcher) = layer();
        layer.set_enabled(false);
        layer.update(&FrameInput::new(Point::new(0.0, 0.0), 100_000.0), Instant::now());
        assert_eq!(fetcher.pending_count(), 0);
        assert_eq!(layer.tile_count(), 0);
    }

    #[test]
    fn test_deferred_view_applies_on_a_frame_without_camera_input() {
        let options = TileLayerOptions {
            tile_radius: 0,
            max_dynamic_tile_radius: 0,
            ..TileLayerOptions::for_testing()
        };
        let mut layer = TileLayer::new(options, Box::new(ManualFetcher::new())).unwrap();
        let start = TileCoord::new(512, 341, 10);
        let east = TileCoord::new(513, 341, 10);
        let at = |coord: TileCoord, layer: &TileLayer| {
            FrameInput::new(layer.local_frame().tile_rect(&coord).center, 100_000.0)
        };
        let t0 = Instant::now();

        layer.update(&at(start, &layer), t0);
        layer.update(&at(east, &layer), t0 + std::time::Duration::from_millis(30));
        assert_eq!(layer.pending_view().map(|v| v.center_x), Some(513));

        let lost = FrameInput::new(Point::new(f64::NAN, 0.0), 100_000.0);
        layer.update(&lost, t0 + std::time::Duration::from_millis(50));
        assert_eq!(layer.view_state().map(|v| v.center_x), Some(512));

        layer.update(&lost, t0 + std::time::Duration::from_millis(80));
        assert_eq!(layer.view_state().map(|v| v.center_x), Some(513));
        assert!(layer.pending_view().is_none());
        assert_eq!(layer.desired().len(), 1);
        assert_eq!(layer.desired()[0].coord, east);
    }

    #[test]
    fn test_set_options_merges_and_validates() {
        let (mut layer, _fetcher) = layer();
        layer
            .set_options(serde_json::json!({ "max_concurrent_requests": 2 }))
            .unwrap();
        assert_eq!(layer.options().max_concurrent_requests, 2);
        assert_eq!(layer.options().url_template, "test://{z}/{x}/{y}.png");

        let bad = layer.set_options(serde_json::json!({ "min_zoom": 20, "max_zoom": 3 }));
        assert!(bad.is_err());
        assert_eq!(layer.options().max_concurrent_requests, 2);

        assert!(layer.set_options(serde_json::json!([1, 2])).is_err());
    }

    #[test]
    fn test_debug_overlay_follows_applied_view() {
        let fetcher = ManualFetcher::new();
        let options = TileLayerOptions {
            debug_overlay: true,
            ..TileLayerOptions::for_testing()
        };
        let mut layer = TileLayer::new(options, Box::new(fetcher)).unwrap();
        assert!(layer.debug_overlay().is_none());
        layer.update(&FrameInput::new(Point::new(5.0, 5.0), 100_000.0), Instant::now());
        let overlay = layer.debug_overlay().unwrap();
        assert_eq!(overlay.desired.len(), 25);
        assert_eq!(overlay.focus, Point::new(5.0, 5.0));
        assert!(overlay.viewport.is_none());
    }
}
