/// Pixel dimensions of the drawable surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Device-pixel content box reported by a resize tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentBox {
    pub inline_size: u32,
    pub block_size: u32,
}

impl From<ContentBox> for SurfaceSize {
    fn from(content: ContentBox) -> Self {
        SurfaceSize::new(content.inline_size, content.block_size)
    }
}

/// Tightly packed RGBA8 pixels.
#[derive(Debug, Clone, Copy)]
pub struct TexelImage<'a> {
    pub width: u32,
    pub height: u32,
    pub pixels: &'a [u8],
}

/// Decoded still image together with the identity used to skip re-uploads.
#[derive(Debug, Clone, Copy)]
pub struct StillImage<'a> {
    /// Stable identity of the image resource (path, URL, ...).
    pub key: &'a str,
    /// False while the image is still loading; nothing is uploaded until then.
    pub ready: bool,
    pub image: TexelImage<'a>,
}

/// Input surface sampled through `iChannel0`.
#[derive(Debug, Clone, Copy)]
pub enum FrameSource<'a> {
    /// Uploaded once per distinct `key`.
    Still(StillImage<'a>),
    /// Video- or canvas-like content, uploaded every frame.
    Live(TexelImage<'a>),
}
