use std::fmt;
use std::ops::Index;
use std::time::Duration;

use tracing::{debug, warn};

use crate::backend::{RenderBackend, ShaderStage};
use crate::compile::{preprocess, vertex_shader_source, ShaderDialect, POSITION_ATTRIBUTE};
use crate::types::{FrameSource, SurfaceSize};
use crate::uniforms::{date_vector, FrameClock, UniformLocations};

/// Two triangles covering [-1, 1]² as a 4-vertex strip.
const QUAD_VERTICES: [f32; 8] = [-1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0];

/// GPU objects the render state cannot work without.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuObject {
    Program,
    VertexShader,
    FragmentShader,
    VertexBuffer,
    VertexArray,
    Texture,
}

impl fmt::Display for GpuObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuObject::Program => f.write_str("shader program"),
            GpuObject::VertexShader => f.write_str("vertex shader"),
            GpuObject::FragmentShader => f.write_str("fragment shader"),
            GpuObject::VertexBuffer => f.write_str("vertex buffer"),
            GpuObject::VertexArray => f.write_str("vertex array"),
            GpuObject::Texture => f.write_str("channel texture"),
        }
    }
}

/// Unrecoverable failure while building a [`RenderState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    #[error("failed to allocate {0}")]
    Allocation(GpuObject),
}

/// Initial surface size and shader text for [`RenderState::new`].
#[derive(Debug, Clone)]
pub struct InitState {
    pub size: SurfaceSize,
    pub frag_source: String,
}

/// Vertex shaders compiled up front, one per fragment dialect.
#[derive(Debug, Clone, Copy)]
struct VertexVariants<S> {
    legacy: S,
    modern: S,
}

impl<S> Index<ShaderDialect> for VertexVariants<S> {
    type Output = S;

    fn index(&self, dialect: ShaderDialect) -> &S {
        match dialect {
            ShaderDialect::Legacy => &self.legacy,
            ShaderDialect::Modern => &self.modern,
        }
    }
}

/// Owns the canvas GPU objects and issues one full-screen quad per frame.
///
/// The program and fragment shader are replaced in place by
/// [`update_frag_shader`](Self::update_frag_shader); the quad buffer and the
/// channel texture live as long as the state itself.
pub struct RenderState<B: RenderBackend> {
    backend: B,
    program: B::Program,
    vertex_shaders: VertexVariants<B::Shader>,
    fragment_shader: B::Shader,
    vertex_buffer: B::Buffer,
    texture: B::Texture,
    size: SurfaceSize,
    position: Option<u32>,
    locations: UniformLocations<B::UniformLocation>,
    attached_vertex: Option<ShaderDialect>,
    fragment_attached: bool,
    dialect: ShaderDialect,
    clock: FrameClock,
    last_still_key: Option<String>,
}

impl<B: RenderBackend> RenderState<B> {
    /// Allocates every GPU object, sizes the viewport, and compiles the first
    /// fragment shader.
    pub fn new(mut backend: B, init: InitState) -> Result<Self, InitError> {
        let program = backend
            .create_program()
            .ok_or(InitError::Allocation(GpuObject::Program))?;
        let vertex_shaders = VertexVariants {
            legacy: backend
                .create_shader(ShaderStage::Vertex)
                .ok_or(InitError::Allocation(GpuObject::VertexShader))?,
            modern: backend
                .create_shader(ShaderStage::Vertex)
                .ok_or(InitError::Allocation(GpuObject::VertexShader))?,
        };
        let fragment_shader = backend
            .create_shader(ShaderStage::Fragment)
            .ok_or(InitError::Allocation(GpuObject::FragmentShader))?;

        for dialect in [ShaderDialect::Legacy, ShaderDialect::Modern] {
            if let Err(error) =
                backend.compile_shader(vertex_shaders[dialect], vertex_shader_source(dialect))
            {
                warn!(%dialect, %error, "quad vertex shader failed to compile");
            }
        }

        let vertex_buffer = backend
            .create_buffer()
            .ok_or(InitError::Allocation(GpuObject::VertexBuffer))?;
        backend.upload_vertices(vertex_buffer, &QUAD_VERTICES);

        let texture = backend
            .create_texture()
            .ok_or(InitError::Allocation(GpuObject::Texture))?;
        backend.configure_texture(texture);

        let mut state = Self {
            backend,
            program,
            vertex_shaders,
            fragment_shader,
            vertex_buffer,
            texture,
            size: init.size,
            position: None,
            locations: UniformLocations::empty(),
            attached_vertex: None,
            fragment_attached: false,
            dialect: ShaderDialect::Legacy,
            clock: FrameClock::default(),
            last_still_key: None,
        };
        state.update_viewport(init.size.width, init.size.height);
        state.update_frag_shader(&init.frag_source);
        Ok(state)
    }

    /// Recompiles the fragment shader from raw snippet text and relinks.
    ///
    /// Compile and link failures are logged, not returned; the uniform table
    /// is rebuilt from the new link either way, so a failed link leaves every
    /// location empty rather than pointing into the previous program.
    pub fn update_frag_shader(&mut self, source: &str) {
        let shader = preprocess(source);
        if let Err(error) = self
            .backend
            .compile_shader(self.fragment_shader, &shader.source)
        {
            warn!(dialect = %shader.dialect, %error, "fragment shader rejected");
        }

        if self.attached_vertex != Some(shader.dialect) {
            if let Some(previous) = self.attached_vertex.take() {
                self.backend
                    .detach_shader(self.program, self.vertex_shaders[previous]);
            }
            self.backend
                .attach_shader(self.program, self.vertex_shaders[shader.dialect]);
            self.attached_vertex = Some(shader.dialect);
        }
        if !self.fragment_attached {
            self.backend
                .attach_shader(self.program, self.fragment_shader);
            self.fragment_attached = true;
        }

        if let Err(error) = self.backend.link_program(self.program) {
            warn!(dialect = %shader.dialect, %error, "shader program rejected");
        }

        let backend = &self.backend;
        let program = self.program;
        self.position = backend.attrib_location(program, POSITION_ATTRIBUTE);
        self.locations = UniformLocations::resolve(|name| backend.uniform_location(program, name));
        self.dialect = shader.dialect;
        debug!(
            dialect = %shader.dialect,
            bytes = shader.source.len(),
            "fragment shader updated"
        );
    }

    /// Resizes the backing surface and the viewport to exactly `width`×`height`.
    pub fn update_viewport(&mut self, width: u32, height: u32) {
        self.size = SurfaceSize::new(width, height);
        self.backend.resize_surface(width, height);
        self.backend.viewport(width, height);
    }

    /// Renders one frame sampling `source` at `timestamp`.
    pub fn draw(&mut self, source: Option<FrameSource<'_>>, timestamp: Duration) {
        let timing = self.clock.tick(timestamp);
        self.backend.use_program(self.program);

        match source {
            Some(FrameSource::Still(still)) => {
                if still.ready && self.last_still_key.as_deref() != Some(still.key) {
                    self.last_still_key = Some(still.key.to_owned());
                    self.backend.upload_texture(self.texture, &still.image);
                }
            }
            Some(FrameSource::Live(image)) => {
                self.last_still_key = None;
                self.backend.upload_texture(self.texture, &image);
                if let Some(location) = &self.locations.channel_resolution {
                    self.backend.uniform_3fv(
                        Some(location),
                        &[self.size.width as f32, self.size.height as f32, 0.0],
                    );
                }
            }
            None => {
                self.last_still_key = None;
                if let Some(location) = &self.locations.channel_resolution {
                    self.backend.uniform_3fv(Some(location), &[0.0; 3]);
                }
            }
        }

        let locations = &self.locations;
        if let Some(location) = &locations.resolution {
            self.backend.uniform_2f(
                Some(location),
                self.size.width as f32,
                self.size.height as f32,
            );
        }
        if let Some(location) = &locations.time {
            self.backend.uniform_1f(Some(location), timing.seconds);
        }
        if let (Some(_), Some(time)) = (&locations.time_delta, &locations.time) {
            // Historical behaviour: the delta lands in the iTime slot.
            self.backend.uniform_1f(Some(time), timing.delta_seconds);
        }
        if let Some(location) = &locations.frame {
            let frame = self.clock.next_frame();
            self.backend.uniform_1f(Some(location), frame as f32);
        }
        if let Some(location) = &locations.channel {
            self.backend.uniform_1i(Some(location), 0);
        }
        if let Some(location) = &locations.date {
            self.backend.uniform_4f(Some(location), date_vector());
        }

        self.backend.draw_quad(self.vertex_buffer, self.position);
    }

    /// Re-issues the quad draw without touching uniforms or the texture.
    pub fn draw_immediate(&mut self) {
        self.backend.use_program(self.program);
        self.backend.draw_quad(self.vertex_buffer, self.position);
    }

    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    /// Dialect of the most recently compiled fragment shader.
    pub fn dialect(&self) -> ShaderDialect {
        self.dialect
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, RecordingBackend, UniformValue};
    use crate::types::{StillImage, TexelImage};

    const ANIMATED: &str =
        "void mainImage(out vec4 c, in vec2 p) { c = vec4(p / iResolution, sin(iTime), 1.0); }";

    fn state_for(source: &str) -> (RenderState<RecordingBackend>, RecordingBackend) {
        let backend = RecordingBackend::new();
        let probe = backend.clone();
        let state = RenderState::new(
            backend,
            InitState {
                size: SurfaceSize::new(640, 480),
                frag_source: source.to_owned(),
            },
        )
        .expect("render state");
        (state, probe)
    }

    #[test]
    fn construction_sizes_viewport_and_links_program() {
        let (state, probe) = state_for(ANIMATED);
        assert_eq!(state.size(), SurfaceSize::new(640, 480));
        assert_eq!(state.dialect(), ShaderDialect::Legacy);
        let calls = probe.calls();
        assert!(calls.contains(&Call::Viewport(640, 480)));
        assert!(calls.contains(&Call::ResizeSurface(640, 480)));
        assert!(calls.iter().any(|call| matches!(call, Call::Link(_))));
        assert!(calls.contains(&Call::UploadVertices(QUAD_VERTICES.to_vec())));
    }

    #[test]
    fn allocation_failure_is_reported() {
        for object in [
            GpuObject::Program,
            GpuObject::VertexShader,
            GpuObject::FragmentShader,
            GpuObject::VertexBuffer,
            GpuObject::Texture,
        ] {
            let backend = RecordingBackend::failing(object);
            let result = RenderState::new(
                backend,
                InitState {
                    size: SurfaceSize::new(1, 1),
                    frag_source: ANIMATED.to_owned(),
                },
            );
            assert_eq!(result.err(), Some(InitError::Allocation(object)));
        }
    }

    #[test]
    fn draw_binds_present_uniforms_only() {
        let (mut state, probe) = state_for(ANIMATED);
        probe.clear();
        state.draw(None, Duration::from_millis(2500));

        assert_eq!(
            probe.uniform_writes("iResolution"),
            vec![UniformValue::F2(640.0, 480.0)]
        );
        assert_eq!(probe.uniform_writes("iTime"), vec![UniformValue::F1(2.5)]);
        assert!(probe.uniform_writes("iFrame").is_empty());
        assert!(probe.uniform_writes("iDate").is_empty());
        assert!(probe.uniform_writes("iChannelResolution").is_empty());
        assert_eq!(probe.draw_count(), 1);
    }

    #[test]
    fn frame_counter_post_increments() {
        let (mut state, probe) = state_for("void main() { gl_FragColor = vec4(iFrame); }");
        probe.clear();
        for step in 0..3u64 {
            state.draw(None, Duration::from_millis(16 * step));
        }
        assert_eq!(
            probe.uniform_writes("iFrame"),
            vec![
                UniformValue::F1(0.0),
                UniformValue::F1(1.0),
                UniformValue::F1(2.0)
            ]
        );
    }

    #[test]
    fn time_delta_is_written_to_time_slot() {
        let (mut state, probe) =
            state_for("void main() { gl_FragColor = vec4(iTime, iTimeDelta, 0.0, 1.0); }");
        state.draw(None, Duration::from_millis(1000));
        probe.clear();
        state.draw(None, Duration::from_millis(1250));

        assert_eq!(
            probe.uniform_writes("iTime"),
            vec![UniformValue::F1(1.25), UniformValue::F1(0.25)]
        );
        assert!(probe.uniform_writes("iTimeDelta").is_empty());
    }

    #[test]
    fn channel_and_date_uniforms_are_refreshed_each_frame() {
        let (mut state, probe) =
            state_for("void main() { gl_FragColor = texture2D(iChannel0, vec2(0.5)) + iDate; }");
        probe.clear();
        state.draw(None, Duration::ZERO);
        state.draw(None, Duration::from_millis(16));

        assert_eq!(
            probe.uniform_writes("iChannel"),
            vec![UniformValue::I1(0), UniformValue::I1(0)]
        );
        assert_eq!(probe.uniform_writes("iDate").len(), 2);
    }

    #[test]
    fn still_image_uploads_once_per_identity() {
        let (mut state, probe) = state_for(ANIMATED);
        probe.clear();
        let pixels = [255u8; 16];
        let still = |key, ready| {
            Some(FrameSource::Still(StillImage {
                key,
                ready,
                image: TexelImage {
                    width: 2,
                    height: 2,
                    pixels: &pixels,
                },
            }))
        };

        state.draw(still("a.png", false), Duration::ZERO);
        assert_eq!(probe.texture_uploads(), 0);
        state.draw(still("a.png", true), Duration::from_millis(16));
        state.draw(still("a.png", true), Duration::from_millis(32));
        assert_eq!(probe.texture_uploads(), 1);
        state.draw(still("b.png", true), Duration::from_millis(48));
        assert_eq!(probe.texture_uploads(), 2);
    }

    #[test]
    fn live_source_uploads_every_frame_and_reports_resolution() {
        let (mut state, probe) = state_for(
            "void main() { gl_FragColor = texture2D(iChannel0, gl_FragCoord.xy / iChannelResolution[0].xy); }",
        );
        probe.clear();
        let pixels = [0u8; 4 * 3 * 2];
        let live = || {
            Some(FrameSource::Live(TexelImage {
                width: 3,
                height: 2,
                pixels: &pixels,
            }))
        };
        state.draw(live(), Duration::ZERO);
        state.draw(live(), Duration::from_millis(16));
        assert_eq!(probe.texture_uploads(), 2);
        state.draw(None, Duration::from_millis(32));

        assert_eq!(
            probe.uniform_writes("iChannelResolution"),
            vec![
                UniformValue::F3(vec![640.0, 480.0, 0.0]),
                UniformValue::F3(vec![640.0, 480.0, 0.0]),
                UniformValue::F3(vec![0.0, 0.0, 0.0]),
            ]
        );
    }

    #[test]
    fn still_identity_resets_after_live_frame() {
        let (mut state, probe) = state_for(ANIMATED);
        let pixels = [0u8; 4];
        let image = TexelImage {
            width: 1,
            height: 1,
            pixels: &pixels,
        };
        let still = FrameSource::Still(StillImage {
            key: "same",
            ready: true,
            image,
        });
        state.draw(Some(still), Duration::ZERO);
        state.draw(Some(FrameSource::Live(image)), Duration::from_millis(16));
        state.draw(Some(still), Duration::from_millis(32));
        assert_eq!(probe.texture_uploads(), 3);
    }

    #[test]
    fn shader_swap_replaces_uniform_locations() {
        let (mut state, probe) = state_for(ANIMATED);
        state.update_frag_shader("void main() { gl_FragColor = vec4(iFrame); }");
        probe.clear();
        state.draw(None, Duration::from_millis(100));

        assert!(probe.uniform_writes("iTime").is_empty());
        assert!(probe.uniform_writes("iResolution").is_empty());
        assert_eq!(probe.uniform_writes("iFrame").len(), 1);
    }

    #[test]
    fn frame_counter_only_advances_while_bound() {
        let (mut state, probe) = state_for(ANIMATED);
        state.draw(None, Duration::from_millis(16));
        state.draw(None, Duration::from_millis(32));
        state.update_frag_shader("void main() { gl_FragColor = vec4(iFrame); }");
        probe.clear();
        state.draw(None, Duration::from_millis(48));
        state.draw(None, Duration::from_millis(64));

        assert_eq!(
            probe.uniform_writes("iFrame"),
            vec![UniformValue::F1(0.0), UniformValue::F1(1.0)]
        );
    }

    #[test]
    fn failed_link_clears_locations() {
        let (mut state, probe) = state_for(ANIMATED);
        probe.reject_links(true);
        state.update_frag_shader("void main() { gl_FragColor = vec4(iTime); }");
        probe.clear();
        state.draw(None, Duration::from_millis(100));
        assert!(probe.uniform_writes("iTime").is_empty());
        assert_eq!(probe.draw_count(), 1);
    }

    #[test]
    fn dialect_change_swaps_vertex_variant() {
        let (mut state, probe) = state_for(ANIMATED);
        probe.clear();
        state.update_frag_shader("#version 300 es\nout vec4 o;\nvoid main() { o = vec4(1.0); }");
        assert_eq!(state.dialect(), ShaderDialect::Modern);

        let calls = probe.calls();
        let detached = calls
            .iter()
            .filter(|call| matches!(call, Call::Detach { .. }))
            .count();
        let attached = calls
            .iter()
            .filter(|call| matches!(call, Call::Attach { .. }))
            .count();
        assert_eq!(detached, 1);
        assert_eq!(attached, 1);

        probe.clear();
        state.update_frag_shader("#version 300 es\nout vec4 o;\nvoid main() { o = vec4(0.5); }");
        assert!(!probe
            .calls()
            .iter()
            .any(|call| matches!(call, Call::Attach { .. } | Call::Detach { .. })));
    }

    #[test]
    fn viewport_update_tracks_latest_size() {
        let (mut state, probe) = state_for(ANIMATED);
        state.update_viewport(800, 600);
        state.update_viewport(1024, 768);
        assert_eq!(state.size(), SurfaceSize::new(1024, 768));
        assert_eq!(probe.last_viewport(), Some((1024, 768)));
    }

    #[test]
    fn immediate_draw_skips_uniforms() {
        let (mut state, probe) = state_for(ANIMATED);
        probe.clear();
        state.draw_immediate();
        assert_eq!(probe.draw_count(), 1);
        assert!(probe
            .calls()
            .iter()
            .all(|call| !matches!(call, Call::Uniform { .. } | Call::UploadTexture { .. })));
    }
}
