//! Fetch layer
//!
//! The scheduler hands a [`TileFetcher`] an opaque request and a completion
//! sender. Whatever the fetcher does in the background, its only way back into
//! the scheduler is a [`FetchCompletion`] message, drained at the start of the
//! next update.

use async_trait::async_trait;
use crossbeam_channel::Sender;

use super::surface::TileImage;
use crate::core::geo::TileCoord;
use crate::prelude::Arc;
use crate::runtime::{self, AsyncHandle};
use crate::{Error, Result};

#[cfg(feature = "render")]
use crate::{core::constants::DEFAULT_USER_AGENT, prelude::Duration};
#[cfg(feature = "render")]
use once_cell::sync::Lazy;

/// Shared async HTTP client for tile fetching
#[cfg(feature = "render")]
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    build_client(DEFAULT_USER_AGENT, Duration::from_secs(30)).unwrap_or_else(|e| {
        log::warn!("falling back to a default HTTP client: {}", e);
        reqwest::Client::new()
    })
});

#[cfg(feature = "render")]
fn build_client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .tcp_keepalive(Duration::from_secs(30))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(16)
        .build()?)
}

/// One dispatched load attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRequest {
    pub coord: TileCoord,
    pub url: String,
    /// Generation of the attempt; echoed back in the completion.
    pub generation: u64,
}

/// Result of a load attempt, delivered as a message.
#[derive(Debug)]
pub struct FetchCompletion {
    pub coord: TileCoord,
    pub generation: u64,
    pub outcome: Result<TileImage>,
}

impl FetchCompletion {
    pub fn success(request: &TileRequest, image: TileImage) -> Self {
        Self {
            coord: request.coord,
            generation: request.generation,
            outcome: Ok(image),
        }
    }

    pub fn failure(request: &TileRequest, error: Error) -> Self {
        Self {
            coord: request.coord,
            generation: request.generation,
            outcome: Err(error),
        }
    }
}

pub type CompletionSender = Sender<FetchCompletion>;

/// Starts tile fetches on behalf of the scheduler.
///
/// Implementations must not block and must report exactly one completion per
/// request through `completions`, from any thread.
pub trait TileFetcher: Send + Sync {
    fn fetch(&self, request: TileRequest, completions: CompletionSender);
}

/// Async capability that turns a URL into a decoded image.
#[async_trait]
pub trait ImageSource: Send + Sync + 'static {
    async fn fetch_image(&self, url: &str) -> Result<TileImage>;
}

/// Fetches over HTTP and decodes PNG/JPEG responses to RGBA8.
#[cfg(feature = "render")]
#[derive(Debug, Clone)]
pub struct HttpImageSource {
    client: reqwest::Client,
}

#[cfg(feature = "render")]
impl HttpImageSource {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(user_agent, timeout)?,
        })
    }

    pub fn from_options(options: &crate::core::config::TileLayerOptions) -> Result<Self> {
        Self::new(
            &options.user_agent,
            Duration::from_millis(options.request_timeout_ms),
        )
    }

    /// Uses the process-wide client.
    pub fn shared() -> Self {
        Self {
            client: HTTP_CLIENT.clone(),
        }
    }
}

#[cfg(feature = "render")]
#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch_image(&self, url: &str) -> Result<TileImage> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let bytes = response.bytes().await?;
        decode_image(&bytes)
    }
}

/// Decodes an encoded raster tile into RGBA8 pixels.
#[cfg(feature = "render")]
pub fn decode_image(bytes: &[u8]) -> Result<TileImage> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| Error::Decode(e.to_string()))?
        .to_rgba8();
    let (width, height) = decoded.dimensions();
    Ok(TileImage::new(width, height, decoded.into_raw()))
}

/// Runs an [`ImageSource`] on the crate runtime, one task per request.
pub struct AsyncTileFetcher<S: ImageSource> {
    source: Arc<S>,
    handles: std::sync::Mutex<Vec<Box<dyn AsyncHandle>>>,
}

impl<S: ImageSource> AsyncTileFetcher<S> {
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(source),
            handles: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Tasks spawned and not yet finished.
    pub fn in_flight(&self) -> usize {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.retain(|handle| !handle.is_finished());
        handles.len()
    }
}

impl<S: ImageSource> TileFetcher for AsyncTileFetcher<S> {
    fn fetch(&self, request: TileRequest, completions: CompletionSender) {
        let source = Arc::clone(&self.source);
        let task_request = request.clone();
        let task_completions = completions.clone();
        let spawned = runtime::spawn(async move {
            let outcome = source.fetch_image(&task_request.url).await;
            if let Err(e) = &outcome {
                log::debug!("fetch {} failed: {}", task_request.url, e);
            }
            let _ = task_completions.send(FetchCompletion {
                coord: task_request.coord,
                generation: task_request.generation,
                outcome,
            });
        });

        match spawned {
            Ok(handle) => {
                let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
                handles.retain(|handle| !handle.is_finished());
                handles.push(handle);
            }
            Err(e) => {
                log::warn!("could not spawn fetch for {}: {}", request.coord, e);
                let _ = completions.send(FetchCompletion::failure(&request, e));
            }
        }
    }
}

#[derive(Debug, Default)]
struct ManualState {
    pending: Vec<(TileRequest, CompletionSender)>,
    history: Vec<TileRequest>,
}

/// Fetcher that only records requests. The host (or a test) resolves them
/// explicitly, which makes the scheduler fully deterministic.
///
/// Clones share the same request list, so a clone can be kept after the
/// original is handed to a layer.
#[derive(Debug, Clone, Default)]
pub struct ManualFetcher {
    state: Arc<std::sync::Mutex<ManualState>>,
}

impl ManualFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Requests not yet resolved, oldest first.
    pub fn pending(&self) -> Vec<TileRequest> {
        self.lock().pending.iter().map(|(r, _)| r.clone()).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Every request ever received, including resolved ones.
    pub fn history(&self) -> Vec<TileRequest> {
        self.lock().history.clone()
    }

    /// Number of requests ever received for `coord`.
    pub fn request_count(&self, coord: TileCoord) -> usize {
        self.lock()
            .history
            .iter()
            .filter(|r| r.coord == coord)
            .count()
    }

    /// Resolves the oldest pending request for `coord`. Returns `false` if
    /// there was none.
    pub fn resolve(&self, coord: TileCoord, outcome: Result<TileImage>) -> bool {
        let mut state = self.lock();
        let Some(index) = state.pending.iter().position(|(r, _)| r.coord == coord) else {
            return false;
        };
        let (request, sender) = state.pending.remove(index);
        let _ = sender.send(FetchCompletion {
            coord: request.coord,
            generation: request.generation,
            outcome,
        });
        true
    }

    pub fn complete(&self, coord: TileCoord, image: TileImage) -> bool {
        self.resolve(coord, Ok(image))
    }

    pub fn fail(&self, coord: TileCoord, reason: &str) -> bool {
        self.resolve(coord, Err(Error::Runtime(reason.to_string())))
    }

    /// Resolves every pending request with a clone of `image`; returns how many.
    pub fn complete_all(&self, image: &TileImage) -> usize {
        let drained: Vec<_> = self.lock().pending.drain(..).collect();
        let count = drained.len();
        for (request, sender) in drained {
            let _ = sender.send(FetchCompletion::success(&request, image.clone()));
        }
        count
    }

    pub fn fail_all(&self, reason: &str) -> usize {
        let drained: Vec<_> = self.lock().pending.drain(..).collect();
        let count = drained.len();
        for (request, sender) in drained {
            let error = Error::Runtime(reason.to_string());
            let _ = sender.send(FetchCompletion::failure(&request, error));
        }
        count
    }
}

impl TileFetcher for ManualFetcher {
    fn fetch(&self, request: TileRequest, completions: CompletionSender) {
        let mut state = self.lock();
        state.history.push(request.clone());
        state.pending.push((request, completions));
    }
}
