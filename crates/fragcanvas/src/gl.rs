//! [`RenderBackend`] over an OpenGL (ES) context loaded with `glow`.
//!
//! Every method issues raw GL calls and assumes the context is current on the
//! calling thread.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use glow::{HasContext, PixelUnpackData};
use tracing::{debug, warn};

use crate::backend::{BackendError, RenderBackend, ShaderStage};
use crate::state::{GpuObject, InitError};
use crate::types::TexelImage;

#[allow(clippy::cast_possible_wrap)]
const RGBA8_INTERNAL_FORMAT: i32 = glow::RGBA8 as i32;

type SurfaceResizeHook = Box<dyn FnMut(u32, u32)>;

pub struct GlowBackend {
    gl: Arc<glow::Context>,
    vertex_array: glow::VertexArray,
    stages: HashMap<glow::Shader, ShaderStage>,
    on_surface_resize: Option<SurfaceResizeHook>,
}

impl GlowBackend {
    /// Creates and binds the vertex array object the quad draw relies on.
    pub fn new(gl: Arc<glow::Context>) -> Result<Self, InitError> {
        let vertex_array = unsafe { gl.create_vertex_array() }.map_err(|error| {
            warn!(%error, "glCreateVertexArray failed");
            InitError::Allocation(GpuObject::VertexArray)
        })?;
        unsafe { gl.bind_vertex_array(Some(vertex_array)) };
        debug!(
            version = ?gl.version(),
            "glow backend ready"
        );
        Ok(Self {
            gl,
            vertex_array,
            stages: HashMap::new(),
            on_surface_resize: None,
        })
    }

    /// Forwards surface resizes to `hook`, e.g. to resize a window surface.
    pub fn with_surface_resize(mut self, hook: impl FnMut(u32, u32) + 'static) -> Self {
        self.on_surface_resize = Some(Box::new(hook));
        self
    }

    pub fn context(&self) -> &Arc<glow::Context> {
        &self.gl
    }
}

impl fmt::Debug for GlowBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlowBackend")
            .field("vertex_array", &self.vertex_array)
            .field("shaders", &self.stages.len())
            .finish_non_exhaustive()
    }
}

fn created<T>(object: &str, result: Result<T, String>) -> Option<T> {
    result
        .map_err(|error| warn!(%error, object, "GL object allocation failed"))
        .ok()
}

impl RenderBackend for GlowBackend {
    type Program = glow::Program;
    type Shader = glow::Shader;
    type Buffer = glow::Buffer;
    type Texture = glow::Texture;
    type UniformLocation = glow::UniformLocation;

    fn create_program(&mut self) -> Option<glow::Program> {
        created("program", unsafe { self.gl.create_program() })
    }

    fn create_shader(&mut self, stage: ShaderStage) -> Option<glow::Shader> {
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        let shader = created("shader", unsafe { self.gl.create_shader(kind) })?;
        self.stages.insert(shader, stage);
        Some(shader)
    }

    fn create_buffer(&mut self) -> Option<glow::Buffer> {
        created("buffer", unsafe { self.gl.create_buffer() })
    }

    fn create_texture(&mut self) -> Option<glow::Texture> {
        created("texture", unsafe { self.gl.create_texture() })
    }

    fn compile_shader(&mut self, shader: glow::Shader, source: &str) -> Result<(), BackendError> {
        let log = unsafe {
            self.gl.shader_source(shader, source);
            self.gl.compile_shader(shader);
            if self.gl.get_shader_compile_status(shader) {
                return Ok(());
            }
            self.gl.get_shader_info_log(shader)
        };
        let stage = self
            .stages
            .get(&shader)
            .copied()
            .unwrap_or(ShaderStage::Fragment);
        Err(BackendError::Compile { stage, log })
    }

    fn attach_shader(&mut self, program: glow::Program, shader: glow::Shader) {
        unsafe { self.gl.attach_shader(program, shader) };
    }

    fn detach_shader(&mut self, program: glow::Program, shader: glow::Shader) {
        unsafe { self.gl.detach_shader(program, shader) };
    }

    fn link_program(&mut self, program: glow::Program) -> Result<(), BackendError> {
        let log = unsafe {
            self.gl.link_program(program);
            if self.gl.get_program_link_status(program) {
                return Ok(());
            }
            self.gl.get_program_info_log(program)
        };
        Err(BackendError::Link { log })
    }

    fn use_program(&mut self, program: glow::Program) {
        unsafe { self.gl.use_program(Some(program)) };
    }

    fn attrib_location(&self, program: glow::Program, name: &str) -> Option<u32> {
        unsafe { self.gl.get_attrib_location(program, name) }
    }

    fn uniform_location(&self, program: glow::Program, name: &str) -> Option<glow::UniformLocation> {
        unsafe { self.gl.get_uniform_location(program, name) }
    }

    fn uniform_1f(&mut self, location: Option<&glow::UniformLocation>, x: f32) {
        unsafe { self.gl.uniform_1_f32(location, x) };
    }

    fn uniform_1i(&mut self, location: Option<&glow::UniformLocation>, x: i32) {
        unsafe { self.gl.uniform_1_i32(location, x) };
    }

    fn uniform_2f(&mut self, location: Option<&glow::UniformLocation>, x: f32, y: f32) {
        unsafe { self.gl.uniform_2_f32(location, x, y) };
    }

    fn uniform_3fv(&mut self, location: Option<&glow::UniformLocation>, values: &[f32]) {
        unsafe { self.gl.uniform_3_f32_slice(location, values) };
    }

    fn uniform_4f(&mut self, location: Option<&glow::UniformLocation>, values: [f32; 4]) {
        let [x, y, z, w] = values;
        unsafe { self.gl.uniform_4_f32(location, x, y, z, w) };
    }

    fn upload_vertices(&mut self, buffer: glow::Buffer, vertices: &[f32]) {
        unsafe {
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
            self.gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(vertices),
                glow::STATIC_DRAW,
            );
        }
    }

    #[allow(clippy::cast_possible_wrap)]
    fn configure_texture(&mut self, texture: glow::Texture) {
        let gl = &self.gl;
        unsafe {
            gl.active_texture(glow::TEXTURE0);
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_S,
                glow::CLAMP_TO_EDGE as i32,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_T,
                glow::CLAMP_TO_EDGE as i32,
            );
        }
    }

    fn upload_texture(&mut self, texture: glow::Texture, image: &TexelImage<'_>) {
        let expected = image.width as usize * image.height as usize * 4;
        if image.pixels.len() < expected {
            warn!(
                width = image.width,
                height = image.height,
                bytes = image.pixels.len(),
                "texture upload skipped; pixel buffer too small"
            );
            return;
        }
        let gl = &self.gl;
        unsafe {
            gl.active_texture(glow::TEXTURE0);
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                RGBA8_INTERNAL_FORMAT,
                image.width as i32,
                image.height as i32,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                PixelUnpackData::Slice(Some(&image.pixels[..expected])),
            );
        }
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        if let Some(hook) = self.on_surface_resize.as_mut() {
            hook(width, height);
        }
    }

    fn viewport(&mut self, width: u32, height: u32) {
        unsafe { self.gl.viewport(0, 0, width as i32, height as i32) };
    }

    fn draw_quad(&mut self, buffer: glow::Buffer, position: Option<u32>) {
        let gl = &self.gl;
        unsafe {
            gl.bind_vertex_array(Some(self.vertex_array));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
            if let Some(index) = position {
                gl.enable_vertex_attrib_array(index);
                gl.vertex_attrib_pointer_f32(index, 2, glow::FLOAT, false, 0, 0);
            }
            gl.draw_arrays(glow::TRIANGLE_STRIP, 0, 4);
        }
    }
}
