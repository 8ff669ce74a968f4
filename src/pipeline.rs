// ------------------------- Live Pipeline -------------------------

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::render::{
    create_renderer, Frame, FrameInputs, FrameRenderer, FrameSize, RenderBackend, RenderError,
    RendererFactory,
};

/// How long a pending pipeline waits before asking for a GPU context again.
pub const INIT_RETRY_INTERVAL: Duration = Duration::from_millis(250);

enum PipelineSlot {
    Pending,
    Ready(Box<dyn FrameRenderer>),
    Failed,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    Pending,
    Ready,
    Failed,
    Released,
}

impl PipelineStatus {
    pub fn label(&self) -> &'static str {
        match self {
            PipelineStatus::Pending => "starting",
            PipelineStatus::Ready => "ready",
            PipelineStatus::Failed => "failed",
            PipelineStatus::Released => "released",
        }
    }
}

/// The renderer behind the on-screen view.
///
/// Never fails its caller: a missing context turns the frame into a no-op
/// that is retried later, a program that does not compile disables this
/// instance for good, and a failed draw only costs that one frame.
pub struct LivePipeline {
    backend: RenderBackend,
    factory: RendererFactory,
    slot: PipelineSlot,
    next_attempt: Option<Instant>,
    reported_unavailable: bool,
    consecutive_frame_errors: u32,
}

impl LivePipeline {
    pub fn new(backend: RenderBackend) -> Self {
        Self::with_factory(backend, Box::new(create_renderer))
    }

    pub fn with_factory(backend: RenderBackend, factory: RendererFactory) -> Self {
        Self {
            backend,
            factory,
            slot: PipelineSlot::Pending,
            next_attempt: None,
            reported_unavailable: false,
            consecutive_frame_errors: 0,
        }
    }

    pub fn backend(&self) -> RenderBackend {
        self.backend
    }

    pub fn status(&self) -> PipelineStatus {
        match self.slot {
            PipelineSlot::Pending => PipelineStatus::Pending,
            PipelineSlot::Ready(_) => PipelineStatus::Ready,
            PipelineSlot::Failed => PipelineStatus::Failed,
            PipelineSlot::Released => PipelineStatus::Released,
        }
    }

    /// Draws one frame if a renderer is available; `None` means nothing new to show.
    pub fn render_frame(
        &mut self,
        inputs: &FrameInputs,
        size: FrameSize,
        now: Instant,
    ) -> Option<Frame> {
        if size.is_empty() {
            return None;
        }
        if matches!(self.slot, PipelineSlot::Pending) {
            self.try_initialize(now);
        }
        let PipelineSlot::Ready(renderer) = &mut self.slot else {
            return None;
        };

        match renderer.render(inputs, size) {
            Ok(frame) => {
                if self.consecutive_frame_errors > 0 {
                    info!(
                        skipped = self.consecutive_frame_errors,
                        "live rendering recovered"
                    );
                }
                self.consecutive_frame_errors = 0;
                Some(frame)
            }
            Err(err) => {
                if self.consecutive_frame_errors == 0 {
                    warn!(error = %err, "frame dropped");
                } else {
                    debug!(error = %err, "frame dropped");
                }
                self.consecutive_frame_errors += 1;
                None
            }
        }
    }

    fn try_initialize(&mut self, now: Instant) {
        if matches!(self.next_attempt, Some(at) if now < at) {
            return;
        }
        match (self.factory)(self.backend) {
            Ok(renderer) => {
                info!(backend = renderer.label(), "live pipeline ready");
                self.slot = PipelineSlot::Ready(renderer);
                self.next_attempt = None;
            }
            Err(RenderError::CompileOrLink(msg)) => {
                error!(error = %msg, "live pipeline disabled: program failed to build");
                self.slot = PipelineSlot::Failed;
            }
            Err(err) => {
                if !self.reported_unavailable {
                    warn!(error = %err, "live pipeline not ready, will keep retrying");
                    self.reported_unavailable = true;
                }
                self.next_attempt = Some(now + INIT_RETRY_INTERVAL);
            }
        }
    }

    /// Drops the renderer and its GPU resources. Later frames are no-ops.
    pub fn teardown(&mut self) {
        if matches!(self.slot, PipelineSlot::Ready(_)) {
            debug!("tearing down live pipeline");
        }
        self.slot = PipelineSlot::Released;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::CpuRenderer;
    use crate::viewport::ViewportState;
    use std::cell::Cell;
    use std::rc::Rc;

    struct FlakyRenderer {
        failures_left: u32,
    }

    impl FrameRenderer for FlakyRenderer {
        fn label(&self) -> &'static str {
            "flaky"
        }

        fn render(&mut self, inputs: &FrameInputs, size: FrameSize) -> Result<Frame, RenderError> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(RenderError::Frame("lost device".into()));
            }
            CpuRenderer.render(inputs, size)
        }
    }

    fn inputs() -> FrameInputs {
        FrameInputs::capture(&ViewportState::default(), 0.0)
    }

    #[test]
    fn unavailable_context_is_retried_after_interval() {
        let attempts = Rc::new(Cell::new(0u32));
        let counter = attempts.clone();
        let mut pipeline = LivePipeline::with_factory(
            RenderBackend::Gpu,
            Box::new(move |_| {
                counter.set(counter.get() + 1);
                if counter.get() < 3 {
                    Err(RenderError::ContextUnavailable("no adapter".into()))
                } else {
                    Ok(Box::new(CpuRenderer) as Box<dyn FrameRenderer>)
                }
            }),
        );
        let size = FrameSize::new(4, 4);
        let start = Instant::now();

        assert!(pipeline.render_frame(&inputs(), size, start).is_none());
        // still inside the retry window: no new attempt
        assert!(pipeline.render_frame(&inputs(), size, start).is_none());
        assert_eq!(attempts.get(), 1);
        assert_eq!(pipeline.status(), PipelineStatus::Pending);

        let later = start + INIT_RETRY_INTERVAL;
        assert!(pipeline.render_frame(&inputs(), size, later).is_none());
        let frame = pipeline
            .render_frame(&inputs(), size, later + INIT_RETRY_INTERVAL)
            .expect("frame after context appears");
        assert_eq!((frame.width, frame.height), (4, 4));
        assert_eq!(attempts.get(), 3);
        assert_eq!(pipeline.status(), PipelineStatus::Ready);
    }

    #[test]
    fn compile_failure_disables_instance() {
        let attempts = Rc::new(Cell::new(0u32));
        let counter = attempts.clone();
        let mut pipeline = LivePipeline::with_factory(
            RenderBackend::Gpu,
            Box::new(move |_| {
                counter.set(counter.get() + 1);
                Err(RenderError::CompileOrLink("bad shader".into()))
            }),
        );
        let now = Instant::now();
        for step in 0..5 {
            let at = now + INIT_RETRY_INTERVAL * step;
            assert!(pipeline.render_frame(&inputs(), FrameSize::new(2, 2), at).is_none());
        }
        assert_eq!(attempts.get(), 1);
        assert_eq!(pipeline.status(), PipelineStatus::Failed);
    }

    #[test]
    fn frame_errors_do_not_stop_the_loop() {
        let mut pipeline = LivePipeline::with_factory(
            RenderBackend::Cpu,
            Box::new(|_| Ok(Box::new(FlakyRenderer { failures_left: 2 }) as Box<dyn FrameRenderer>)),
        );
        let now = Instant::now();
        let size = FrameSize::new(3, 2);
        assert!(pipeline.render_frame(&inputs(), size, now).is_none());
        assert!(pipeline.render_frame(&inputs(), size, now).is_none());
        assert!(pipeline.render_frame(&inputs(), size, now).is_some());
        assert_eq!(pipeline.status(), PipelineStatus::Ready);
    }

    #[test]
    fn teardown_releases_renderer() {
        let mut pipeline = LivePipeline::new(RenderBackend::Cpu);
        let now = Instant::now();
        assert!(pipeline
            .render_frame(&inputs(), FrameSize::new(2, 2), now)
            .is_some());
        pipeline.teardown();
        assert_eq!(pipeline.status(), PipelineStatus::Released);
        assert!(pipeline
            .render_frame(&inputs(), FrameSize::new(2, 2), now)
            .is_none());
    }

    #[test]
    fn empty_surface_is_skipped() {
        let mut pipeline = LivePipeline::new(RenderBackend::Cpu);
        assert!(pipeline
            .render_frame(&inputs(), FrameSize::new(0, 10), Instant::now())
            .is_none());
        assert_eq!(pipeline.status(), PipelineStatus::Pending);
    }
}
