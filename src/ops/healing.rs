// ============================================================================
// HEALING ORCHESTRATOR: strokes -> hole -> (remote provider | local fill)
// ============================================================================
//
// One invocation walks  Idle -> Preparing -> (Remote | Local) -> Done | Failed.
// Only the absence of a configured provider routes to the local diffusion
// fill; a provider that fails, rejects or times out fails the invocation.

use std::fmt;
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use crate::canvas::{PixelBuffer, Region};
use crate::error::{EditError, EditResult};
use crate::ops::inpaint::fill_region_diffusion;
use crate::ops::mask::{Stroke, rasterize_strokes};
use crate::viewport::DisplayRect;
use crate::{log_err, log_info, log_warn};

/// Recommended default deadline for one provider call.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(20);

// -- Provider seam ------------------------------------------------------------

/// Failure reported by a [`HealingProvider`].
#[derive(Clone, Debug, PartialEq)]
pub enum ProviderError {
    Unavailable(String),
    Rejected { code: i64, message: String },
    Timeout,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Unavailable(e) => write!(f, "unavailable: {}", e),
            ProviderError::Rejected { code, message } => write!(f, "rejected ({}): {}", code, message),
            ProviderError::Timeout => write!(f, "timed out"),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<ProviderError> for EditError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Unavailable(msg) => EditError::ProviderUnavailable(msg),
            ProviderError::Rejected { code, message } => EditError::ProviderRejected { code, message },
            ProviderError::Timeout => EditError::Timeout,
        }
    }
}

/// Endpoint and credentials for a remote provider. Built by the outer layer
/// (settings file, CLI) and handed to the orchestrator; nothing in here reads
/// the process environment.
#[derive(Clone, Debug, PartialEq)]
pub struct HealingProviderConfig {
    pub endpoint: String,
    pub api_key: String,
    pub secret_key: String,
    pub timeout: Duration,
}

impl HealingProviderConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: String::new(),
            secret_key: String::new(),
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    pub fn with_credentials(mut self, api_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self.secret_key = secret_key.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A content-aware fill service: `heal(image, region) -> image`.
///
/// Implementations are called from a worker thread and may block; the
/// orchestrator enforces the deadline from [`HealingProviderConfig::timeout`].
pub trait HealingProvider: Send + Sync {
    fn name(&self) -> &str;

    fn heal(
        &self,
        image: &PixelBuffer,
        region: Region,
        config: &HealingProviderConfig,
    ) -> Result<PixelBuffer, ProviderError>;
}

// -- Phases -------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum HealPhase {
    #[default]
    Idle,
    Preparing,
    Remote,
    Local,
    Done,
    Failed,
}

impl fmt::Display for HealPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HealPhase::Idle => "idle",
            HealPhase::Preparing => "preparing",
            HealPhase::Remote => "remote",
            HealPhase::Local => "local",
            HealPhase::Done => "done",
            HealPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Which path produced a healed image.
#[derive(Clone, Debug, PartialEq)]
pub enum HealPath {
    Remote { provider: String },
    Local { passes: usize, unresolved: usize },
}

#[derive(Clone, Debug)]
pub struct HealOutcome {
    pub image: PixelBuffer,
    pub region: Region,
    pub path: HealPath,
}

// -- Orchestrator -------------------------------------------------------------

pub struct HealingOrchestrator {
    remote: Option<(Arc<dyn HealingProvider>, HealingProviderConfig)>,
    phase: HealPhase,
}

impl HealingOrchestrator {
    /// No provider configured: every heal runs the local diffusion fill.
    pub fn local() -> Self {
        Self { remote: None, phase: HealPhase::Idle }
    }

    pub fn with_provider(provider: Arc<dyn HealingProvider>, config: HealingProviderConfig) -> Self {
        Self { remote: Some((provider, config)), phase: HealPhase::Idle }
    }

    pub fn has_provider(&self) -> bool {
        self.remote.is_some()
    }

    /// Phase reached by the most recent invocation.
    pub fn phase(&self) -> HealPhase {
        self.phase
    }

    fn enter(&mut self, next: HealPhase) {
        log_info!("Heal phase: {} -> {}", self.phase, next);
        self.phase = next;
    }

    fn fail<T>(&mut self, err: EditError) -> EditResult<T> {
        log_err!("Heal failed during {}: {}", self.phase, err);
        self.enter(HealPhase::Failed);
        Err(err)
    }

    /// Heal `image` under `strokes`. The input is never modified; the caller
    /// swaps in [`HealOutcome::image`] on success.
    pub fn heal(
        &mut self,
        image: &Arc<PixelBuffer>,
        strokes: &[Stroke],
        rect: &DisplayRect,
    ) -> EditResult<HealOutcome> {
        self.phase = HealPhase::Idle;
        self.enter(HealPhase::Preparing);

        let (w, h) = image.dimensions();
        let hole = match rasterize_strokes(strokes, rect, w, h) {
            Ok(hole) => hole,
            Err(e) => return self.fail(e),
        };
        log_info!(
            "Heal region {}x{} at ({}, {}), {} hole pixels",
            hole.region.width,
            hole.region.height,
            hole.region.left,
            hole.region.top,
            hole.mask.hole_count()
        );

        let result = match self.remote.clone() {
            Some((provider, config)) => {
                self.enter(HealPhase::Remote);
                let name = provider.name().to_string();
                call_provider(provider, &config, image, hole.region).map(|healed| HealOutcome {
                    image: healed,
                    region: hole.region,
                    path: HealPath::Remote { provider: name },
                })
            }
            None => {
                self.enter(HealPhase::Local);
                fill_region_diffusion(image, &hole.mask).map(|(healed, report)| {
                    if report.unresolved > 0 {
                        log_warn!(
                            "Local fill stopped after {} passes with {} pixels unresolved",
                            report.passes,
                            report.unresolved
                        );
                    }
                    HealOutcome {
                        image: healed,
                        region: hole.region,
                        path: HealPath::Local { passes: report.passes, unresolved: report.unresolved },
                    }
                })
            }
        };

        match result {
            Ok(outcome) => {
                self.enter(HealPhase::Done);
                Ok(outcome)
            }
            Err(e) => self.fail(e),
        }
    }
}

/// Run the provider on a worker thread and wait at most `config.timeout`.
/// A call that misses the deadline is abandoned; its result is dropped.
fn call_provider(
    provider: Arc<dyn HealingProvider>,
    config: &HealingProviderConfig,
    image: &Arc<PixelBuffer>,
    region: Region,
) -> EditResult<PixelBuffer> {
    let name = provider.name().to_string();
    log_info!("Calling healing provider '{}' (timeout {:.1}s)", name, config.timeout.as_secs_f32());

    let (tx, rx) = mpsc::channel();
    let worker_image = Arc::clone(image);
    let worker_config = config.clone();
    std::thread::spawn(move || {
        let _ = tx.send(provider.heal(&worker_image, region, &worker_config));
    });

    let healed = match rx.recv_timeout(config.timeout) {
        Ok(result) => result?,
        Err(mpsc::RecvTimeoutError::Timeout) => return Err(ProviderError::Timeout.into()),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            return Err(ProviderError::Unavailable(format!("provider '{}' worker exited", name)).into());
        }
    };

    if healed.dimensions() != image.dimensions() {
        return Err(EditError::ProviderRejected {
            code: -1,
            message: format!(
                "returned {}x{} for a {}x{} image",
                healed.width(),
                healed.height(),
                image.width(),
                image.height()
            ),
        });
    }
    Ok(healed)
}

// -- Working image slot ----------------------------------------------------------

/// The single-writer slot holding the current working image.
///
/// Readers take a cheap [`ImageSnapshot`]; writers replace the whole buffer at
/// once. A heal started from an older snapshot cannot overwrite a newer image.
#[derive(Debug)]
pub struct WorkingImage {
    slot: Mutex<ImageSnapshot>,
}

#[derive(Clone, Debug)]
pub struct ImageSnapshot {
    pub image: Arc<PixelBuffer>,
    pub generation: u64,
}

impl WorkingImage {
    pub fn new(image: PixelBuffer) -> Self {
        Self {
            slot: Mutex::new(ImageSnapshot { image: Arc::new(image), generation: 0 }),
        }
    }

    pub fn snapshot(&self) -> ImageSnapshot {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn generation(&self) -> u64 {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).generation
    }

    /// Unconditional replacement (new base image). Returns the new generation.
    pub fn replace(&self, image: PixelBuffer) -> u64 {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.generation += 1;
        slot.image = Arc::new(image);
        slot.generation
    }

    /// Swap in `image` only if nothing replaced the buffer since `generation`.
    pub fn replace_if_current(&self, generation: u64, image: PixelBuffer) -> EditResult<u64> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if slot.generation != generation {
            return Err(EditError::Superseded);
        }
        slot.generation += 1;
        slot.image = Arc::new(image);
        Ok(slot.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewport::Point;

    fn blue_image() -> Arc<PixelBuffer> {
        Arc::new(PixelBuffer::filled(100, 100, [0, 0, 255, 255]))
    }

    fn rect() -> DisplayRect {
        DisplayRect { x: 0.0, y: 0.0, width: 100.0, height: 100.0 }
    }

    fn scribble() -> Vec<Stroke> {
        vec![Stroke {
            points: vec![Point::new(48.0, 50.0), Point::new(52.0, 50.0)],
            stroke_width: 8.0,
        }]
    }

    struct Fixed(Result<PixelBuffer, ProviderError>);

    impl HealingProvider for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn heal(&self, _: &PixelBuffer, _: Region, _: &HealingProviderConfig) -> Result<PixelBuffer, ProviderError> {
            self.0.clone()
        }
    }

    struct Sleepy;

    impl HealingProvider for Sleepy {
        fn name(&self) -> &str {
            "sleepy"
        }

        fn heal(&self, image: &PixelBuffer, _: Region, _: &HealingProviderConfig) -> Result<PixelBuffer, ProviderError> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(image.clone())
        }
    }

    fn remote(provider: impl HealingProvider + 'static, timeout: Duration) -> HealingOrchestrator {
        let config = HealingProviderConfig::new("https://heal.invalid/v1").with_timeout(timeout);
        HealingOrchestrator::with_provider(Arc::new(provider), config)
    }

    #[test]
    fn zero_strokes_is_empty_region_and_leaves_image_alone() {
        let working = WorkingImage::new(PixelBuffer::filled(100, 100, [0, 0, 255, 255]));
        let snap = working.snapshot();
        let mut orch = HealingOrchestrator::local();

        let err = orch.heal(&snap.image, &[], &rect()).unwrap_err();

        assert_eq!(err, EditError::EmptyRegion);
        assert_eq!(orch.phase(), HealPhase::Failed);
        assert_eq!(working.generation(), snap.generation);
        assert_eq!(*working.snapshot().image, PixelBuffer::filled(100, 100, [0, 0, 255, 255]));
    }

    #[test]
    fn unconfigured_provider_routes_to_local() {
        let mut orch = HealingOrchestrator::local();
        let mut img = PixelBuffer::filled(100, 100, [0, 0, 255, 255]);
        img.set_pixel(50, 50, [255, 255, 0, 255]); // blemish
        let out = orch.heal(&Arc::new(img), &scribble(), &rect()).unwrap();

        assert!(matches!(out.path, HealPath::Local { unresolved: 0, .. }));
        assert_eq!(out.image.pixel(50, 50), [0, 0, 255, 255]);
        assert_eq!(orch.phase(), HealPhase::Done);
    }

    #[test]
    fn provider_result_is_used() {
        let healed = PixelBuffer::filled(100, 100, [9, 9, 9, 255]);
        let mut orch = remote(Fixed(Ok(healed.clone())), Duration::from_secs(5));
        let out = orch.heal(&blue_image(), &scribble(), &rect()).unwrap();

        assert_eq!(out.image, healed);
        assert_eq!(out.path, HealPath::Remote { provider: "fixed".into() });
    }

    #[test]
    fn rejected_call_does_not_fall_back() {
        let rejection = ProviderError::Rejected { code: 110, message: "Access token invalid".into() };
        let mut orch = remote(Fixed(Err(rejection)), Duration::from_secs(5));

        let err = orch.heal(&blue_image(), &scribble(), &rect()).unwrap_err();

        assert_eq!(err, EditError::ProviderRejected { code: 110, message: "Access token invalid".into() });
        assert_eq!(orch.phase(), HealPhase::Failed);
    }

    #[test]
    fn slow_provider_times_out() {
        let mut orch = remote(Sleepy, Duration::from_millis(50));
        assert_eq!(orch.heal(&blue_image(), &scribble(), &rect()).unwrap_err(), EditError::Timeout);
    }

    #[test]
    fn resized_provider_output_is_rejected() {
        let mut orch = remote(Fixed(Ok(PixelBuffer::filled(50, 50, [0; 4]))), Duration::from_secs(5));
        let err = orch.heal(&blue_image(), &scribble(), &rect()).unwrap_err();
        assert!(matches!(err, EditError::ProviderRejected { code: -1, .. }));
    }

    #[test]
    fn stale_swap_is_refused() {
        let working = WorkingImage::new(PixelBuffer::filled(2, 2, [0; 4]));
        let snap = working.snapshot();
        working.replace(PixelBuffer::filled(3, 3, [1; 4]));

        let err = working.replace_if_current(snap.generation, PixelBuffer::filled(2, 2, [7; 4])).unwrap_err();
        assert_eq!(err, EditError::Superseded);
        assert_eq!(working.snapshot().image.dimensions(), (3, 3));

        let next = working.snapshot();
        assert!(working.replace_if_current(next.generation, PixelBuffer::filled(3, 3, [2; 4])).is_ok());
    }
}
