//! Mount lifecycle and frame loop of one shader canvas.
//!
//! External notifications never touch the render state directly: tracker and
//! scheduler callbacks only enqueue an event, and the host drains the
//! queue on its own thread with [`SurfaceController::pump`]. A frame callback
//! carries the sequence number it was requested with, so a callback that was
//! already in flight when its request got cancelled is recognised and dropped.

use std::rc::Rc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, trace, warn};

use crate::backend::RenderBackend;
use crate::runtime::{FrameHandle, FrameScheduler};
use crate::state::{InitState, RenderState};
use crate::tracking::{
    ResizeTracker, Subscription, TargetId, TextMutationTracker, VisibilityTracker,
};
use crate::types::{ContentBox, FrameSource, SurfaceSize};

/// Host-side view of the element a controller renders into.
pub trait SurfaceElement {
    fn target(&self) -> TargetId;
    /// Current shader text, already extracted and trimmed.
    fn source_text(&self) -> String;
    /// Whether the pause attribute is set.
    fn pause_requested(&self) -> bool;
    fn autoresize(&self) -> bool;
    /// Device-pixel size used when the render state is first created.
    fn client_size(&self) -> SurfaceSize;
    /// Surface sampled as `iChannel0`, if any.
    fn input(&self) -> Option<FrameSource<'_>>;
    /// Resizes the input surface to match the canvas.
    fn resize_input(&mut self, size: SurfaceSize);
}

/// External services a controller subscribes to while mounted.
pub struct Services {
    pub visibility: Box<dyn VisibilityTracker>,
    pub resize: Box<dyn ResizeTracker>,
    pub text: Box<dyn TextMutationTracker>,
    pub scheduler: Rc<dyn FrameScheduler>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SurfaceEvent {
    Visibility(bool),
    Resize(ContentBox),
    TextChanged,
    Frame { seq: u64, timestamp: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingFrame {
    handle: FrameHandle,
    seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfacePhase {
    Unmounted,
    /// Mounted, but the render state could not be created. Nothing happens
    /// until the next mount.
    Degraded,
    Running,
    /// Mounted with the loop stopped by the pause attribute or by visibility.
    Paused,
}

pub struct SurfaceController<E, B: RenderBackend> {
    element: E,
    services: Services,
    render: Option<RenderState<B>>,
    mounted: bool,
    paused: bool,
    visible: bool,
    subscriptions: Vec<Subscription>,
    pending: Option<PendingFrame>,
    frame_seq: u64,
    events_tx: Sender<SurfaceEvent>,
    events_rx: Receiver<SurfaceEvent>,
}

impl<E: SurfaceElement, B: RenderBackend> SurfaceController<E, B> {
    pub fn new(element: E, services: Services) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            element,
            services,
            render: None,
            mounted: false,
            paused: true,
            visible: true,
            subscriptions: Vec::new(),
            pending: None,
            frame_seq: 0,
            events_tx,
            events_rx,
        }
    }

    /// Builds the render state and starts the loop.
    ///
    /// `None` stands for a host that could not provide a rendering context;
    /// like an allocation failure it leaves the controller degraded.
    pub fn mount(&mut self, backend: Option<B>) {
        if self.mounted {
            debug!(surface = %self.element.target(), "mount ignored; already mounted");
            return;
        }
        let target = self.element.target();
        self.mounted = true;
        self.paused = self.element.pause_requested();
        self.visible = true;

        let Some(backend) = backend else {
            warn!(surface = %target, "no rendering context; canvas left inert");
            return;
        };
        let init = InitState {
            size: self.element.client_size(),
            frag_source: self.element.source_text(),
        };
        match RenderState::new(backend, init) {
            Ok(state) => self.render = Some(state),
            Err(error) => {
                warn!(surface = %target, %error, "canvas initialization failed");
                return;
            }
        }

        self.subscribe(&target);
        info!(
            surface = %target,
            paused = self.paused,
            "canvas mounted"
        );
        self.reschedule();
    }

    /// Stops the loop and releases every subscription. Safe to call twice.
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.paused = true;
        self.subscriptions.clear();
        if let Some(pending) = self.pending.take() {
            self.services.scheduler.cancel(pending.handle);
        }
        self.render = None;
        self.mounted = false;
        let dropped = self.events_rx.try_iter().count();
        debug!(
            surface = %self.element.target(),
            dropped_events = dropped,
            "canvas unmounted"
        );
    }

    /// Mirrors the pause attribute.
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused == paused || !self.mounted {
            self.paused = paused;
            return;
        }
        self.paused = paused;
        debug!(surface = %self.element.target(), paused, "pause toggled");
        self.reschedule();
    }

    /// Handles every queued notification. Returns the number of draws issued,
    /// scheduled and immediate alike.
    pub fn pump(&mut self) -> usize {
        let mut draws = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            draws += self.handle(event);
        }
        draws
    }

    pub fn phase(&self) -> SurfacePhase {
        match (self.mounted, self.render.is_some()) {
            (false, _) => SurfacePhase::Unmounted,
            (true, false) => SurfacePhase::Degraded,
            (true, true) if self.is_running() => SurfacePhase::Running,
            (true, true) => SurfacePhase::Paused,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn has_pending_frame(&self) -> bool {
        self.pending.is_some()
    }

    /// Rendered size while mounted, otherwise the element's client size.
    pub fn size(&self) -> SurfaceSize {
        self.render
            .as_ref()
            .map(RenderState::size)
            .unwrap_or_else(|| self.element.client_size())
    }

    pub fn element(&self) -> &E {
        &self.element
    }

    pub fn element_mut(&mut self) -> &mut E {
        &mut self.element
    }

    pub fn render_state(&self) -> Option<&RenderState<B>> {
        self.render.as_ref()
    }

    pub fn render_state_mut(&mut self) -> Option<&mut RenderState<B>> {
        self.render.as_mut()
    }

    fn subscribe(&mut self, target: &TargetId) {
        let tx = self.events_tx.clone();
        let resize = self.services.resize.track(
            target,
            Box::new(move |content| {
                let _ = tx.send(SurfaceEvent::Resize(content));
            }),
        );
        let tx = self.events_tx.clone();
        let text = self.services.text.track(
            target,
            Box::new(move || {
                let _ = tx.send(SurfaceEvent::TextChanged);
            }),
        );
        let tx = self.events_tx.clone();
        let visibility = self.services.visibility.track(
            target,
            Box::new(move |visible| {
                let _ = tx.send(SurfaceEvent::Visibility(visible));
            }),
        );
        self.subscriptions.extend([resize, text, visibility]);
    }

    fn is_running(&self) -> bool {
        self.mounted && self.render.is_some() && !self.paused && self.visible
    }

    /// Cancels the outstanding frame request and, if the loop should run,
    /// requests a fresh one.
    fn reschedule(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.services.scheduler.cancel(pending.handle);
        }
        if !self.is_running() {
            return;
        }
        self.frame_seq += 1;
        let seq = self.frame_seq;
        let tx = self.events_tx.clone();
        let handle = self.services.scheduler.request(Box::new(move |timestamp| {
            let _ = tx.send(SurfaceEvent::Frame { seq, timestamp });
        }));
        self.pending = Some(PendingFrame { handle, seq });
    }

    fn handle(&mut self, event: SurfaceEvent) -> usize {
        match event {
            SurfaceEvent::Frame { seq, timestamp } => self.on_frame(seq, timestamp),
            SurfaceEvent::Resize(content) => self.on_resize(content),
            SurfaceEvent::Visibility(visible) => {
                self.visible = visible;
                trace!(surface = %self.element.target(), visible, "visibility changed");
                self.reschedule();
                0
            }
            SurfaceEvent::TextChanged => {
                if let Some(render) = self.render.as_mut() {
                    render.update_frag_shader(&self.element.source_text());
                }
                0
            }
        }
    }

    fn on_frame(&mut self, seq: u64, timestamp: Duration) -> usize {
        match self.pending {
            Some(pending) if pending.seq == seq => self.pending = None,
            _ => {
                trace!(seq, "stale frame callback dropped");
                return 0;
            }
        }
        if !self.is_running() {
            return 0;
        }
        let Some(render) = self.render.as_mut() else {
            return 0;
        };
        render.draw(self.element.input(), timestamp);
        self.reschedule();
        1
    }

    fn on_resize(&mut self, content: ContentBox) -> usize {
        if !self.mounted {
            return 0;
        }
        let Some(render) = self.render.as_mut() else {
            return 0;
        };
        let size = SurfaceSize::from(content);
        if self.element.autoresize() {
            self.element.resize_input(size);
        }
        render.update_viewport(size.width, size.height);
        render.draw_immediate();
        self.reschedule();
        1
    }
}

impl<E, B: RenderBackend> Drop for SurfaceController<E, B> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.services.scheduler.cancel(pending.handle);
        }
    }
}
