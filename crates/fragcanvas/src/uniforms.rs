use std::time::Duration;

use chrono::{Datelike, Local, Timelike};

/// Shadertoy inputs the preprocessor knows how to declare.
///
/// [`ShaderInput::ALL`] is also the order in which declarations are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderInput {
    Channel0,
    Resolution,
    ChannelResolution,
    Time,
    TimeDelta,
    Frame,
    Channel,
    Date,
}

impl ShaderInput {
    pub const ALL: [ShaderInput; 8] = [
        ShaderInput::Channel0,
        ShaderInput::Resolution,
        ShaderInput::ChannelResolution,
        ShaderInput::Time,
        ShaderInput::TimeDelta,
        ShaderInput::Frame,
        ShaderInput::Channel,
        ShaderInput::Date,
    ];

    /// Identifier as it appears in shader text.
    pub fn identifier(self) -> &'static str {
        match self {
            ShaderInput::Channel0 => "iChannel0",
            ShaderInput::Resolution => "iResolution",
            ShaderInput::ChannelResolution => "iChannelResolution",
            ShaderInput::Time => "iTime",
            ShaderInput::TimeDelta => "iTimeDelta",
            ShaderInput::Frame => "iFrame",
            ShaderInput::Channel => "iChannel",
            ShaderInput::Date => "iDate",
        }
    }

    /// GLSL declaration injected into the program header.
    pub fn declaration(self) -> &'static str {
        match self {
            ShaderInput::Channel0 => "uniform sampler2D iChannel0;",
            ShaderInput::Resolution => "uniform vec2 iResolution;",
            ShaderInput::ChannelResolution => "uniform vec3 iChannelResolution[1];",
            ShaderInput::Time => "uniform float iTime;",
            ShaderInput::TimeDelta => "uniform float iTimeDelta;",
            ShaderInput::Frame => "uniform float iFrame;",
            ShaderInput::Channel => "uniform float iChannel;",
            ShaderInput::Date => "uniform vec4 iDate;",
        }
    }
}

/// Uniform locations resolved from the most recently linked program.
///
/// Every slot is optional: a missing location means the shader never
/// mentioned the input (or the link failed) and the write is skipped.
#[derive(Debug)]
pub(crate) struct UniformLocations<L> {
    pub resolution: Option<L>,
    pub channel_resolution: Option<L>,
    pub time: Option<L>,
    pub time_delta: Option<L>,
    pub frame: Option<L>,
    pub channel: Option<L>,
    pub date: Option<L>,
}

impl<L> UniformLocations<L> {
    pub fn empty() -> Self {
        Self {
            resolution: None,
            channel_resolution: None,
            time: None,
            time_delta: None,
            frame: None,
            channel: None,
            date: None,
        }
    }

    /// Looks up every per-frame input through `lookup`.
    pub fn resolve(mut lookup: impl FnMut(&str) -> Option<L>) -> Self {
        Self {
            resolution: lookup(ShaderInput::Resolution.identifier()),
            channel_resolution: lookup(ShaderInput::ChannelResolution.identifier()),
            time: lookup(ShaderInput::Time.identifier()),
            time_delta: lookup(ShaderInput::TimeDelta.identifier()),
            frame: lookup(ShaderInput::Frame.identifier()),
            channel: lookup(ShaderInput::Channel.identifier()),
            date: lookup(ShaderInput::Date.identifier()),
        }
    }
}

/// Time values for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FrameTiming {
    pub seconds: f32,
    pub delta_seconds: f32,
}

/// Frame counter and previous timestamp carried between draws.
#[derive(Debug, Default)]
pub(crate) struct FrameClock {
    frame_count: u32,
    last_timestamp: Option<Duration>,
}

impl FrameClock {
    pub fn tick(&mut self, timestamp: Duration) -> FrameTiming {
        let delta = self
            .last_timestamp
            .map(|previous| timestamp.saturating_sub(previous))
            .unwrap_or(Duration::ZERO);
        self.last_timestamp = Some(timestamp);
        FrameTiming {
            seconds: timestamp.as_secs_f32(),
            delta_seconds: delta.as_secs_f32(),
        }
    }

    /// Post-increments the `iFrame` counter. Only called while `iFrame` is bound.
    pub fn next_frame(&mut self) -> u32 {
        let frame = self.frame_count;
        self.frame_count = self.frame_count.saturating_add(1);
        frame
    }
}

/// `iDate`: year, 1-based month, day, and local seconds since midnight.
pub(crate) fn date_vector() -> [f32; 4] {
    let local_now = Local::now();
    let seconds_since_midnight = local_now.num_seconds_from_midnight() as f32
        + local_now.nanosecond() as f32 / 1_000_000_000.0;
    [
        local_now.year() as f32,
        local_now.month() as f32,
        local_now.day() as f32,
        seconds_since_midnight,
    ]
}
