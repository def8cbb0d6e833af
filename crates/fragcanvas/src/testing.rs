//! In-memory [`RenderBackend`] that records every call for assertions.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::backend::{BackendError, RenderBackend, ShaderStage};
use crate::state::GpuObject;
use crate::types::TexelImage;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum UniformValue {
    F1(f32),
    I1(i32),
    F2(f32, f32),
    F3(Vec<f32>),
    F4([f32; 4]),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Compile { shader: u32, source: String },
    Attach { program: u32, shader: u32 },
    Detach { program: u32, shader: u32 },
    Link(u32),
    UseProgram(u32),
    Uniform { name: String, value: UniformValue },
    UploadVertices(Vec<f32>),
    ConfigureTexture(u32),
    UploadTexture { width: u32, height: u32 },
    ResizeSurface(u32, u32),
    Viewport(u32, u32),
    DrawQuad { position: Option<u32> },
}

#[derive(Debug, Default)]
struct Recording {
    calls: Vec<Call>,
    failing: Option<GpuObject>,
    reject_links: bool,
    next_id: u32,
    sources: HashMap<u32, String>,
    attached: HashMap<u32, Vec<u32>>,
    linked: HashMap<u32, String>,
}

/// Cloning shares the underlying recording, so a test can keep a probe after
/// handing the backend to a [`RenderState`](crate::state::RenderState).
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingBackend {
    inner: Rc<RefCell<Recording>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose allocation of `object` always fails.
    pub fn failing(object: GpuObject) -> Self {
        let backend = Self::default();
        backend.inner.borrow_mut().failing = Some(object);
        backend
    }

    pub fn reject_links(&self, reject: bool) {
        self.inner.borrow_mut().reject_links = reject;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.borrow().calls.clone()
    }

    pub fn clear(&self) {
        self.inner.borrow_mut().calls.clear();
    }

    pub fn uniform_writes(&self, uniform: &str) -> Vec<UniformValue> {
        self.inner
            .borrow()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Uniform { name, value } if name == uniform => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn draw_count(&self) -> usize {
        self.count(|call| matches!(call, Call::DrawQuad { .. }))
    }

    pub fn texture_uploads(&self) -> usize {
        self.count(|call| matches!(call, Call::UploadTexture { .. }))
    }

    pub fn compile_count(&self) -> usize {
        self.count(|call| matches!(call, Call::Compile { .. }))
    }

    pub fn last_viewport(&self) -> Option<(u32, u32)> {
        self.inner
            .borrow()
            .calls
            .iter()
            .rev()
            .find_map(|call| match call {
                Call::Viewport(width, height) => Some((*width, *height)),
                _ => None,
            })
    }

    fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.inner
            .borrow()
            .calls
            .iter()
            .filter(|call| predicate(call))
            .count()
    }

    fn record(&self, call: Call) {
        self.inner.borrow_mut().calls.push(call);
    }

    fn allocate(&mut self, object: GpuObject) -> Option<u32> {
        let mut inner = self.inner.borrow_mut();
        if inner.failing == Some(object) {
            return None;
        }
        inner.next_id += 1;
        Some(inner.next_id)
    }

    fn uniform(&mut self, location: Option<&String>, value: UniformValue) {
        if let Some(name) = location {
            self.record(Call::Uniform {
                name: name.clone(),
                value,
            });
        }
    }
}

impl RenderBackend for RecordingBackend {
    type Program = u32;
    type Shader = u32;
    type Buffer = u32;
    type Texture = u32;
    type UniformLocation = String;

    fn create_program(&mut self) -> Option<u32> {
        self.allocate(GpuObject::Program)
    }

    fn create_shader(&mut self, stage: ShaderStage) -> Option<u32> {
        match stage {
            ShaderStage::Vertex => self.allocate(GpuObject::VertexShader),
            ShaderStage::Fragment => self.allocate(GpuObject::FragmentShader),
        }
    }

    fn create_buffer(&mut self) -> Option<u32> {
        self.allocate(GpuObject::VertexBuffer)
    }

    fn create_texture(&mut self) -> Option<u32> {
        self.allocate(GpuObject::Texture)
    }

    fn compile_shader(&mut self, shader: u32, source: &str) -> Result<(), BackendError> {
        self.inner
            .borrow_mut()
            .sources
            .insert(shader, source.to_owned());
        self.record(Call::Compile {
            shader,
            source: source.to_owned(),
        });
        Ok(())
    }

    fn attach_shader(&mut self, program: u32, shader: u32) {
        self.inner
            .borrow_mut()
            .attached
            .entry(program)
            .or_default()
            .push(shader);
        self.record(Call::Attach { program, shader });
    }

    fn detach_shader(&mut self, program: u32, shader: u32) {
        if let Some(shaders) = self.inner.borrow_mut().attached.get_mut(&program) {
            shaders.retain(|attached| *attached != shader);
        }
        self.record(Call::Detach { program, shader });
    }

    fn link_program(&mut self, program: u32) -> Result<(), BackendError> {
        self.record(Call::Link(program));
        let mut inner = self.inner.borrow_mut();
        if inner.reject_links {
            inner.linked.insert(program, String::new());
            return Err(BackendError::Link {
                log: "rejected by test".to_owned(),
            });
        }
        let combined = inner
            .attached
            .get(&program)
            .into_iter()
            .flatten()
            .filter_map(|shader| inner.sources.get(shader).cloned())
            .collect::<Vec<_>>()
            .join("\n");
        inner.linked.insert(program, combined);
        Ok(())
    }

    fn use_program(&mut self, program: u32) {
        self.record(Call::UseProgram(program));
    }

    fn attrib_location(&self, program: u32, name: &str) -> Option<u32> {
        let inner = self.inner.borrow();
        let linked = inner.linked.get(&program)?;
        linked.contains(name).then_some(0)
    }

    fn uniform_location(&self, program: u32, name: &str) -> Option<String> {
        let inner = self.inner.borrow();
        let linked = inner.linked.get(&program)?;
        let declared =
            linked.contains(&format!(" {name};")) || linked.contains(&format!(" {name}["));
        declared.then(|| name.to_owned())
    }

    fn uniform_1f(&mut self, location: Option<&String>, x: f32) {
        self.uniform(location, UniformValue::F1(x));
    }

    fn uniform_1i(&mut self, location: Option<&String>, x: i32) {
        self.uniform(location, UniformValue::I1(x));
    }

    fn uniform_2f(&mut self, location: Option<&String>, x: f32, y: f32) {
        self.uniform(location, UniformValue::F2(x, y));
    }

    fn uniform_3fv(&mut self, location: Option<&String>, values: &[f32]) {
        self.uniform(location, UniformValue::F3(values.to_vec()));
    }

    fn uniform_4f(&mut self, location: Option<&String>, values: [f32; 4]) {
        self.uniform(location, UniformValue::F4(values));
    }

    fn upload_vertices(&mut self, _buffer: u32, vertices: &[f32]) {
        self.record(Call::UploadVertices(vertices.to_vec()));
    }

    fn configure_texture(&mut self, texture: u32) {
        self.record(Call::ConfigureTexture(texture));
    }

    fn upload_texture(&mut self, _texture: u32, image: &TexelImage<'_>) {
        self.record(Call::UploadTexture {
            width: image.width,
            height: image.height,
        });
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.record(Call::ResizeSurface(width, height));
    }

    fn viewport(&mut self, width: u32, height: u32) {
        self.record(Call::Viewport(width, height));
    }

    fn draw_quad(&mut self, _buffer: u32, position: Option<u32>) {
        self.record(Call::DrawQuad { position });
    }
}
