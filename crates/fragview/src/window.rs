use std::cell::RefCell;
use std::fs;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use fragcanvas::runtime::FrameCallback;
use fragcanvas::{
    resize_registry, shader_source, visibility_registry, ContentBox, ContentNode, FrameHandle,
    FrameQueue, FrameScheduler, FrameSource, GlowBackend, Services, SurfaceController,
    SurfaceElement, SurfacePhase, SurfaceSize, TargetId,
};
use glutin::config::ConfigTemplateBuilder;
use glutin::context::{ContextApi, ContextAttributesBuilder, PossiblyCurrentContext, Version};
use glutin::display::GetGlDisplay;
use glutin::prelude::*;
use glutin::surface::{Surface, SurfaceAttributesBuilder, SwapInterval, WindowSurface};
use glutin_winit::DisplayBuilder;
use raw_window_handle::HasRawWindowHandle;
use tracing::{debug, info, warn};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder, EventLoopWindowTarget};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::input::ChannelImage;
use crate::run::{Settings, ShaderOrigin};
use crate::watch::FileWatchTracker;

/// Wake-ups sent to the event loop from other threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    SourceChanged,
}

struct GlHandles {
    surface: Surface<WindowSurface>,
    context: PossiblyCurrentContext,
}

impl GlHandles {
    fn resize(&self, width: u32, height: u32) {
        if let (Some(width), Some(height)) = (NonZeroU32::new(width), NonZeroU32::new(height)) {
            self.surface.resize(&self.context, width, height);
        }
    }

    fn present(&self) {
        if let Err(error) = self.surface.swap_buffers(&self.context) {
            warn!(%error, "swap_buffers failed");
        }
    }
}

/// Frame scheduler that turns pending frame requests into redraw requests.
struct RedrawScheduler {
    queue: Rc<FrameQueue>,
    window: Arc<Window>,
}

impl FrameScheduler for RedrawScheduler {
    fn request(&self, callback: FrameCallback) -> FrameHandle {
        let handle = self.queue.request(callback);
        self.window.request_redraw();
        handle
    }

    fn cancel(&self, handle: FrameHandle) {
        self.queue.cancel(handle);
    }
}

/// The window as seen by the canvas controller.
struct WindowElement {
    target: TargetId,
    origin: ShaderOrigin,
    last_source: RefCell<String>,
    paused: bool,
    autoresize: bool,
    client_size: SurfaceSize,
    input: Option<ChannelImage>,
}

impl WindowElement {
    fn content(&self) -> Option<Vec<ContentNode>> {
        match &self.origin {
            ShaderOrigin::Inline(text) => Some(vec![ContentNode::Script(text.clone())]),
            ShaderOrigin::File(path) => match fs::read_to_string(path) {
                Ok(text) => Some(vec![ContentNode::Text(text)]),
                Err(error) => {
                    warn!(%error, path = %path.display(), "failed to re-read shader; keeping previous text");
                    None
                }
            },
        }
    }
}

impl SurfaceElement for WindowElement {
    fn target(&self) -> TargetId {
        self.target.clone()
    }

    fn source_text(&self) -> String {
        if let Some(nodes) = self.content() {
            *self.last_source.borrow_mut() = shader_source(&nodes);
        }
        self.last_source.borrow().clone()
    }

    fn pause_requested(&self) -> bool {
        self.paused
    }

    fn autoresize(&self) -> bool {
        self.autoresize
    }

    fn client_size(&self) -> SurfaceSize {
        self.client_size
    }

    fn input(&self) -> Option<FrameSource<'_>> {
        self.input.as_ref().map(ChannelImage::frame_source)
    }

    fn resize_input(&mut self, size: SurfaceSize) {
        if let Some(input) = self.input.as_mut() {
            input.resize_to(size);
        }
    }
}

struct Host {
    window: Arc<Window>,
    gl: Rc<GlHandles>,
    queue: Rc<FrameQueue>,
    controller: SurfaceController<WindowElement, GlowBackend>,
    target: TargetId,
    started: Instant,
}

impl Host {
    /// Lets the controller handle queued notifications and presents whatever
    /// it drew.
    fn pump(&mut self) {
        if self.controller.pump() > 0 {
            self.gl.present();
        }
    }

    fn toggle_pause(&mut self) {
        let paused = !self.controller.is_paused();
        self.controller.set_paused(paused);
        info!(paused, "pause toggled");
    }

    fn shutdown(&mut self, elwt: &EventLoopWindowTarget<HostEvent>) {
        self.controller.unmount();
        elwt.exit();
    }

    fn timestamp(&self) -> Duration {
        self.started.elapsed()
    }
}

pub fn run(settings: Settings) -> Result<()> {
    let event_loop = EventLoopBuilder::<HostEvent>::with_user_event()
        .build()
        .map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let proxy = event_loop.create_proxy();

    let size = settings.size;
    let window_builder = WindowBuilder::new()
        .with_title(settings.title.clone())
        .with_inner_size(PhysicalSize::new(size.width, size.height));
    let template = ConfigTemplateBuilder::new().with_alpha_size(8);
    let display_builder = DisplayBuilder::new().with_window_builder(Some(window_builder));
    let (window, gl_config) = display_builder
        .build(&event_loop, template, |configs| {
            // find_configs errors out before the picker runs when nothing matches.
            configs
                .reduce(|a, b| if a.num_samples() > b.num_samples() { a } else { b })
                .expect("glutin reported no matching GL configs")
        })
        .map_err(|err| anyhow!("failed to build GL display: {err}"))?;
    let window = Arc::new(window.context("no window was created")?);

    let raw_window_handle = window.raw_window_handle();
    let gl_display = gl_config.display();
    let context_attributes = ContextAttributesBuilder::new()
        .with_context_api(ContextApi::Gles(Some(Version::new(3, 0))))
        .build(Some(raw_window_handle));
    let not_current = unsafe { gl_display.create_context(&gl_config, &context_attributes) }
        .context("failed to create an OpenGL ES 3.0 context")?;

    let inner = window.inner_size();
    let surface_attributes = SurfaceAttributesBuilder::<WindowSurface>::new().build(
        raw_window_handle,
        NonZeroU32::new(inner.width).unwrap_or(NonZeroU32::MIN),
        NonZeroU32::new(inner.height).unwrap_or(NonZeroU32::MIN),
    );
    let surface = unsafe { gl_display.create_window_surface(&gl_config, &surface_attributes) }
        .context("failed to create window surface")?;
    let context = not_current
        .make_current(&surface)
        .context("failed to make GL context current")?;
    if let Err(error) = surface.set_swap_interval(&context, SwapInterval::Wait(NonZeroU32::MIN)) {
        warn!(%error, "vsync unavailable; frames may tear");
    }
    let gl_handles = Rc::new(GlHandles { surface, context });

    let gl = unsafe {
        glow::Context::from_loader_function_cstr(|symbol| {
            gl_display.get_proc_address(symbol) as *const _
        })
    };
    let backend = {
        let hook_handles = Rc::clone(&gl_handles);
        match GlowBackend::new(Arc::new(gl)) {
            Ok(backend) => Some(
                backend.with_surface_resize(move |width, height| hook_handles.resize(width, height)),
            ),
            Err(error) => {
                warn!(%error, "GL backend unavailable");
                None
            }
        }
    };

    let input = settings
        .input
        .as_deref()
        .map(ChannelImage::load)
        .transpose()?;
    let watched_file: Option<PathBuf> = match &settings.shader {
        ShaderOrigin::File(path) => Some(path.clone()),
        ShaderOrigin::Inline(_) => None,
    };

    let target = TargetId::new(format!("window-{:?}", window.id()));
    let queue = Rc::new(FrameQueue::new());
    let services = Services {
        visibility: Box::new(visibility_registry()),
        resize: Box::new(resize_registry()),
        text: Box::new(FileWatchTracker::new(watched_file, proxy)),
        scheduler: Rc::new(RedrawScheduler {
            queue: Rc::clone(&queue),
            window: Arc::clone(&window),
        }),
    };
    let element = WindowElement {
        target: target.clone(),
        origin: settings.shader.clone(),
        last_source: RefCell::new(String::new()),
        paused: settings.paused,
        autoresize: settings.autoresize,
        client_size: SurfaceSize::new(inner.width, inner.height),
        input,
    };

    let mut controller = SurfaceController::new(element, services);
    controller.mount(backend);
    if controller.phase() == SurfacePhase::Degraded {
        warn!("canvas failed to initialise; the window will stay blank");
    }
    info!(
        title = %settings.title,
        width = inner.width,
        height = inner.height,
        "fragview running (Space pauses, Escape quits)"
    );

    let mut host = Host {
        window,
        gl: gl_handles,
        queue,
        controller,
        target,
        started: Instant::now(),
    };

    event_loop
        .run(move |event, elwt| {
            elwt.set_control_flow(ControlFlow::Wait);
            match event {
                Event::UserEvent(HostEvent::SourceChanged) => {
                    debug!("shader source changed on disk");
                    host.pump();
                }
                Event::WindowEvent { window_id, event } if window_id == host.window.id() => {
                    match event {
                        WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                            host.shutdown(elwt);
                        }
                        WindowEvent::KeyboardInput { event, .. } => {
                            if event.state != ElementState::Pressed || event.repeat {
                                return;
                            }
                            match event.logical_key {
                                Key::Named(NamedKey::Space) => host.toggle_pause(),
                                Key::Named(NamedKey::Escape) => host.shutdown(elwt),
                                _ => {}
                            }
                        }
                        WindowEvent::Resized(new_size) => {
                            resize_registry().notify(
                                &host.target,
                                ContentBox {
                                    inline_size: new_size.width,
                                    block_size: new_size.height,
                                },
                            );
                            host.pump();
                        }
                        WindowEvent::Occluded(occluded) => {
                            visibility_registry().notify(&host.target, !occluded);
                            host.pump();
                        }
                        WindowEvent::RedrawRequested => {
                            let timestamp = host.timestamp();
                            host.queue.fire(timestamp);
                            host.pump();
                        }
                        _ => {}
                    }
                }
                Event::AboutToWait => {
                    host.pump();
                }
                _ => {}
            }
        })
        .map_err(|err| anyhow!("window event loop error: {err}"))
}
