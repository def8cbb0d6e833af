//! Shadertoy-style fragment shader canvas.
//!
//! The crate turns loose Shadertoy snippets into complete GLSL ES programs and
//! keeps one full-screen quad redrawing while a host surface is mounted:
//!
//! ```text
//!   shader text ──▶ compile::preprocess ──▶ RenderState ──▶ RenderBackend (glow)
//!                                              ▲
//!   visibility / resize / text trackers ──▶ SurfaceController ◀── FrameScheduler
//! ```
//!
//! `RenderState` owns every GPU object and binds the per-frame uniforms,
//! `SurfaceController` reacts to host notifications and drives the frame loop.
//! Hosts provide a [`backend::RenderBackend`] (see [`gl::GlowBackend`]), the
//! three trackers in [`tracking`], and a [`runtime::FrameScheduler`].

pub mod backend;
pub mod compile;
pub mod config;
pub mod controller;
#[cfg(feature = "glow")]
pub mod gl;
pub mod runtime;
pub mod source;
pub mod state;
pub mod tracking;
pub mod types;
pub mod uniforms;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{BackendError, RenderBackend, ShaderStage};
pub use compile::{preprocess, PreprocessedShader, ShaderDialect, MODERN_VERSION_MARKER};
pub use config::{parse_size, CanvasConfig, ConfigError};
pub use controller::{Services, SurfaceController, SurfaceElement, SurfacePhase};
#[cfg(feature = "glow")]
pub use gl::GlowBackend;
pub use runtime::{FrameHandle, FrameQueue, FrameScheduler};
pub use source::{shader_source, ContentNode};
pub use state::{GpuObject, InitError, InitState, RenderState};
pub use tracking::{
    resize_registry, visibility_registry, ObserverRegistry, ResizeTracker, Subscription,
    TargetId, TextMutationTracker, VisibilityTracker,
};
pub use types::{ContentBox, FrameSource, StillImage, SurfaceSize, TexelImage};
pub use uniforms::ShaderInput;
