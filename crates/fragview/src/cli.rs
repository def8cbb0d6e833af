use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fragcanvas::SurfaceSize;

#[derive(Parser, Debug)]
#[command(
    name = "fragview",
    author,
    version,
    about = "Run a Shadertoy-style fragment shader in a window",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Fragment shader file; edits on disk are picked up live.
    #[arg(value_name = "SHADER")]
    pub shader: Option<PathBuf>,

    /// TOML file with canvas settings; flags given here take precedence.
    #[arg(long, value_name = "FILE", env = "FRAGVIEW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Start with the frame loop paused (toggle with Space).
    #[arg(long)]
    pub paused: bool,

    /// Resample the input image whenever the window is resized.
    #[arg(long)]
    pub autoresize: bool,

    /// Initial window size in physical pixels (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size_arg)]
    pub size: Option<SurfaceSize>,

    /// Still image bound as `iChannel0`.
    #[arg(long, value_name = "IMAGE")]
    pub input: Option<PathBuf>,

    /// Window title.
    #[arg(long)]
    pub title: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the rewritten GLSL for a shader file and exit.
    Preprocess {
        #[arg(value_name = "SHADER")]
        shader: PathBuf,
    },
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size_arg(value: &str) -> Result<SurfaceSize, String> {
    fragcanvas::parse_size(value).map_err(|err| err.to_string())
}
