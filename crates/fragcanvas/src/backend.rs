//! Immediate-mode rendering seam consumed by [`RenderState`].
//!
//! The trait mirrors the small slice of an OpenGL ES style API the canvas
//! needs: object creation, compile/link, uniform lookup and upload, texture
//! upload, and one triangle-strip draw. [`crate::gl::GlowBackend`] implements
//! it on top of `glow`; tests use an in-memory recorder.
//!
//! [`RenderState`]: crate::state::RenderState

use std::fmt;

use crate::types::TexelImage;

/// Programmable pipeline stage of a shader object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Compile and link diagnostics reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("{stage} shader failed to compile: {log}")]
    Compile { stage: ShaderStage, log: String },
    #[error("program failed to link: {log}")]
    Link { log: String },
}

/// Rendering API used by the canvas.
///
/// Handles are plain copyable identifiers; uniform locations are owned values
/// that stay valid until the program is linked again. Uploads to a `None`
/// location must be silently ignored, matching GL's treatment of location -1.
pub trait RenderBackend {
    type Program: Copy + fmt::Debug;
    type Shader: Copy + fmt::Debug;
    type Buffer: Copy + fmt::Debug;
    type Texture: Copy + fmt::Debug;
    type UniformLocation: fmt::Debug;

    fn create_program(&mut self) -> Option<Self::Program>;
    fn create_shader(&mut self, stage: ShaderStage) -> Option<Self::Shader>;
    fn create_buffer(&mut self) -> Option<Self::Buffer>;
    fn create_texture(&mut self) -> Option<Self::Texture>;

    fn compile_shader(&mut self, shader: Self::Shader, source: &str) -> Result<(), BackendError>;
    fn attach_shader(&mut self, program: Self::Program, shader: Self::Shader);
    fn detach_shader(&mut self, program: Self::Program, shader: Self::Shader);
    fn link_program(&mut self, program: Self::Program) -> Result<(), BackendError>;
    fn use_program(&mut self, program: Self::Program);

    fn attrib_location(&self, program: Self::Program, name: &str) -> Option<u32>;
    fn uniform_location(&self, program: Self::Program, name: &str)
        -> Option<Self::UniformLocation>;

    fn uniform_1f(&mut self, location: Option<&Self::UniformLocation>, x: f32);
    fn uniform_1i(&mut self, location: Option<&Self::UniformLocation>, x: i32);
    fn uniform_2f(&mut self, location: Option<&Self::UniformLocation>, x: f32, y: f32);
    fn uniform_3fv(&mut self, location: Option<&Self::UniformLocation>, values: &[f32]);
    fn uniform_4f(&mut self, location: Option<&Self::UniformLocation>, values: [f32; 4]);

    /// Stores static vertex data (interleaved `vec2` positions).
    fn upload_vertices(&mut self, buffer: Self::Buffer, vertices: &[f32]);
    /// Binds `texture` to unit 0 with linear filtering and edge clamping.
    fn configure_texture(&mut self, texture: Self::Texture);
    fn upload_texture(&mut self, texture: Self::Texture, image: &TexelImage<'_>);

    /// Resizes the backing drawable surface.
    fn resize_surface(&mut self, width: u32, height: u32);
    fn viewport(&mut self, width: u32, height: u32);

    /// Draws 4 vertices as a triangle strip, reading a 2-component float
    /// position from `buffer` through `position`.
    fn draw_quad(&mut self, buffer: Self::Buffer, position: Option<u32>);
}
