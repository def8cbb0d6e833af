use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use fragcanvas::{preprocess, CanvasConfig, SurfaceSize};
use tracing_subscriber::EnvFilter;

use crate::cli::RunArgs;
use crate::window;

const DEFAULT_SIZE: SurfaceSize = SurfaceSize::new(1280, 720);

/// Where the shader text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderOrigin {
    File(PathBuf),
    Inline(String),
}

/// Effective settings after merging the config file with CLI flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub shader: ShaderOrigin,
    pub paused: bool,
    pub autoresize: bool,
    pub size: SurfaceSize,
    pub input: Option<PathBuf>,
    pub title: String,
}

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run(args: RunArgs) -> Result<()> {
    let config = match args.config.as_deref() {
        Some(path) => Some((load_config(path)?, config_dir(path))),
        None => None,
    };
    let settings = resolve_settings(args, config)?;
    tracing::debug!(?settings, "resolved fragview settings");
    window::run(settings)
}

/// Prints the rewritten shader to stdout and its dialect to stderr.
pub fn preprocess_file(path: &Path) -> Result<()> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read shader {}", path.display()))?;
    let shader = preprocess(&raw);
    println!("{}", shader.source);
    eprintln!("dialect: {}", shader.dialect);
    Ok(())
}

fn load_config(path: &Path) -> Result<CanvasConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    CanvasConfig::from_toml_str(&text)
        .with_context(|| format!("invalid config {}", path.display()))
}

fn config_dir(path: &Path) -> PathBuf {
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

/// CLI values win over the config file; config-relative paths are resolved
/// against the config's directory.
fn resolve_settings(args: RunArgs, config: Option<(CanvasConfig, PathBuf)>) -> Result<Settings> {
    let (config, base) = config.unwrap_or_default();
    let relative = |path: PathBuf| {
        if path.is_absolute() {
            path
        } else {
            base.join(path)
        }
    };

    let shader = match (args.shader, config.shader, config.source) {
        (Some(path), _, _) => ShaderOrigin::File(path),
        (None, Some(path), _) => ShaderOrigin::File(relative(path)),
        (None, None, Some(text)) => ShaderOrigin::Inline(text),
        (None, None, None) => bail!(
            "no shader given; pass a SHADER path or set `shader` or `source` in the config"
        ),
    };

    let title = args
        .title
        .or(config.title)
        .unwrap_or_else(|| match &shader {
            ShaderOrigin::File(path) => format!(
                "fragview: {}",
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string())
            ),
            ShaderOrigin::Inline(_) => "fragview".to_owned(),
        });

    Ok(Settings {
        shader,
        paused: args.paused || config.paused,
        autoresize: args.autoresize || config.autoresize,
        size: args.size.or(config.size).unwrap_or(DEFAULT_SIZE),
        input: args.input.or_else(|| config.input.map(relative)),
        title,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> RunArgs {
        RunArgs {
            shader: None,
            config: None,
            paused: false,
            autoresize: false,
            size: None,
            input: None,
            title: None,
        }
    }

    fn config(toml: &str) -> Option<(CanvasConfig, PathBuf)> {
        Some((
            CanvasConfig::from_toml_str(toml).expect("config"),
            PathBuf::from("/etc/fragview"),
        ))
    }

    #[test]
    fn cli_shader_wins_over_config() {
        let mut cli = args();
        cli.shader = Some(PathBuf::from("cli.frag"));
        let settings =
            resolve_settings(cli, config("shader = \"conf.frag\"\nsize = \"64x64\"")).expect("settings");
        assert_eq!(settings.shader, ShaderOrigin::File(PathBuf::from("cli.frag")));
        assert_eq!(settings.size, SurfaceSize::new(64, 64));
        assert_eq!(settings.title, "fragview: cli.frag");
    }

    #[test]
    fn config_paths_are_relative_to_config() {
        let settings = resolve_settings(
            args(),
            config("shader = \"shaders/a.frag\"\ninput = \"noise.png\"\npaused = true"),
        )
        .expect("settings");
        assert_eq!(
            settings.shader,
            ShaderOrigin::File(PathBuf::from("/etc/fragview/shaders/a.frag"))
        );
        assert_eq!(settings.input, Some(PathBuf::from("/etc/fragview/noise.png")));
        assert!(settings.paused);
        assert_eq!(settings.size, DEFAULT_SIZE);
    }

    #[test]
    fn inline_source_is_used_without_file() {
        let settings = resolve_settings(
            args(),
            config("source = \"void main() { gl_FragColor = vec4(1.0); }\"\ntitle = \"demo\""),
        )
        .expect("settings");
        assert!(matches!(settings.shader, ShaderOrigin::Inline(_)));
        assert_eq!(settings.title, "demo");
    }

    #[test]
    fn missing_shader_is_an_error() {
        assert!(resolve_settings(args(), None).is_err());
    }
}
