use std::fmt;

use crate::uniforms::ShaderInput;

/// Version directive that switches a fragment shader to GLSL ES 3.00.
pub const MODERN_VERSION_MARKER: &str = "#version 300 es";

const DEFAULT_PRECISION: &str = "precision highp float;\n";
const FRAG_COLOR: &str = "gl_FragColor";
const FRAG_COORD: &str = "gl_FragCoord";
const MODERN_FRAG_COLOR: &str = "aFragColor";

/// Shading-language variant a fragment shader is written against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderDialect {
    /// GLSL ES 1.00 (no version directive).
    Legacy,
    /// GLSL ES 3.00 (`#version 300 es`).
    Modern,
}

impl ShaderDialect {
    /// Detects the dialect from the version directive at the top of `source`.
    pub fn detect(source: &str) -> Self {
        if source.trim().starts_with(MODERN_VERSION_MARKER) {
            ShaderDialect::Modern
        } else {
            ShaderDialect::Legacy
        }
    }
}

impl fmt::Display for ShaderDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderDialect::Legacy => f.write_str("glsl-es-100"),
            ShaderDialect::Modern => f.write_str("glsl-es-300"),
        }
    }
}

/// Fully declared fragment program plus the dialect it was detected as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessedShader {
    pub source: String,
    pub dialect: ShaderDialect,
}

/// Full-screen quad vertex shader for GLSL ES 1.00 fragment shaders.
pub(crate) const VERTEX_SHADER_LEGACY: &str = "attribute vec2 vPos;
void main() {
  gl_Position = vec4(vPos, 0.0, 1.0);
}";

/// Full-screen quad vertex shader for GLSL ES 3.00 fragment shaders.
pub(crate) const VERTEX_SHADER_MODERN: &str = "#version 300 es
in vec4 vPos;
void main() {
  gl_Position = vPos;
}";

/// Name of the 2-component position attribute both vertex variants read.
pub(crate) const POSITION_ATTRIBUTE: &str = "vPos";

pub(crate) fn vertex_shader_source(dialect: ShaderDialect) -> &'static str {
    match dialect {
        ShaderDialect::Legacy => VERTEX_SHADER_LEGACY,
        ShaderDialect::Modern => VERTEX_SHADER_MODERN,
    }
}

/// Turns a Shadertoy-style snippet into a complete GLSL ES fragment shader.
///
/// Steps performed:
///
/// 1. Detect and strip a leading `#version 300 es` directive; it is re-emitted
///    at the top of the generated header.
/// 2. Add a default float precision unless the body opens with its own.
/// 3. When the body has no `main(`, rename `mainImage(` to `main(`, drop the
///    `(out vec4 C, in vec2 P)` parameter list, and alias `C`/`P` to the
///    dialect's fragment output and `gl_FragCoord.xy`.
/// 4. For GLSL ES 3.00 bodies that still write `gl_FragColor`, declare an
///    output variable and alias the legacy builtin to it.
/// 5. Declare each Shadertoy input the body mentions, in a fixed order.
/// 6. For GLSL ES 3.00, rewrite `texture2D(` calls to `texture(`.
///
/// Uniform declarations the body already carries for the recognized inputs
/// are dropped first so the generated ones are never duplicated.
pub fn preprocess(raw: &str) -> PreprocessedShader {
    let mut header = String::new();
    let mut body = raw.trim();
    let mut dialect = ShaderDialect::Legacy;

    if let Some(rest) = body.strip_prefix(MODERN_VERSION_MARKER) {
        dialect = ShaderDialect::Modern;
        // The directive's line break goes with it.
        let mut chars = rest.chars();
        chars.next();
        body = chars.as_str();
        header.push_str(MODERN_VERSION_MARKER);
        header.push('\n');
    }

    if !body.trim_start().starts_with("precision ") {
        header.push_str(DEFAULT_PRECISION);
    }

    let mut body = strip_input_declarations(body);

    if find_call(&body, "main").is_none() {
        let signature = find_io_signature(raw);
        body = replace_first_call(&body, "mainImage", "main(");
        body = replace_io_signatures(&body);

        if let Some(signature) = signature {
            match dialect {
                ShaderDialect::Modern => {
                    header.push_str(&format!("out vec4 {};\n", signature.color));
                }
                ShaderDialect::Legacy => {
                    if signature.color != FRAG_COLOR {
                        header.push_str(&format!("#define {} {FRAG_COLOR}\n", signature.color));
                    }
                }
            }
            if signature.coord != FRAG_COORD {
                header.push_str(&format!("#define {} {FRAG_COORD}.xy\n", signature.coord));
            }
        }
    }

    if dialect == ShaderDialect::Modern
        && body.contains(FRAG_COLOR)
        && !body.contains(MODERN_FRAG_COLOR)
    {
        // Keeps the historical `.xy` swizzle; see DESIGN.md.
        header.push_str(&format!("out vec4 {MODERN_FRAG_COLOR};\n"));
        header.push_str(&format!("#define {FRAG_COLOR} {MODERN_FRAG_COLOR}.xy\n"));
    }

    for input in ShaderInput::ALL {
        if body.contains(input.identifier()) {
            header.push_str(input.declaration());
            header.push('\n');
        }
    }

    if dialect == ShaderDialect::Modern {
        body = replace_all_calls(&body, "texture2D", "texture(");
    }

    PreprocessedShader {
        source: format!("{header}\n{body}"),
        dialect,
    }
}

/// Drops `uniform` lines that declare one of the recognized Shadertoy inputs.
fn strip_input_declarations(body: &str) -> String {
    body.split_inclusive('\n')
        .filter(|line| !declares_shader_input(line))
        .collect()
}

fn declares_shader_input(line: &str) -> bool {
    let Some(rest) = line.trim_start().strip_prefix("uniform ") else {
        return false;
    };
    let mut tokens = rest.split_whitespace();
    let _ty = tokens.next();
    let Some(name) = tokens.next() else {
        return false;
    };
    let name = name
        .split(|c: char| c == ';' || c == '[')
        .next()
        .unwrap_or_default();
    ShaderInput::ALL
        .iter()
        .any(|input| input.identifier() == name)
}

/// Byte range of the first `name` that is followed by optional whitespace and `(`.
fn find_call(haystack: &str, name: &str) -> Option<(usize, usize)> {
    let mut start = 0;
    while let Some(offset) = haystack[start..].find(name) {
        let at = start + offset;
        let after = &haystack[at + name.len()..];
        let trimmed = after.trim_start();
        if trimmed.starts_with('(') {
            return Some((at, haystack.len() - trimmed.len() + 1));
        }
        start = at + name.len();
    }
    None
}

fn replace_first_call(haystack: &str, name: &str, replacement: &str) -> String {
    match find_call(haystack, name) {
        Some((start, end)) => format!("{}{replacement}{}", &haystack[..start], &haystack[end..]),
        None => haystack.to_owned(),
    }
}

fn replace_all_calls(haystack: &str, name: &str, replacement: &str) -> String {
    let mut output = String::with_capacity(haystack.len());
    let mut rest = haystack;
    while let Some((start, end)) = find_call(rest, name) {
        output.push_str(&rest[..start]);
        output.push_str(replacement);
        rest = &rest[end..];
    }
    output.push_str(rest);
    output
}

/// Names bound by a `(out vec4 color, in vec2 coord)` parameter list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IoSignature<'a> {
    color: &'a str,
    coord: &'a str,
}

fn find_io_signature(source: &str) -> Option<IoSignature<'_>> {
    source
        .match_indices('(')
        .find_map(|(open, _)| match_io_signature(source, open))
        .map(|(signature, _)| signature)
}

/// Replaces every `(out vec4 C, in vec2 P)` parameter list with `()`.
fn replace_io_signatures(source: &str) -> String {
    let mut output = String::with_capacity(source.len());
    let mut cursor = 0;
    while let Some(offset) = source[cursor..].find('(') {
        let open = cursor + offset;
        match match_io_signature(source, open) {
            Some((_, end)) => {
                output.push_str(&source[cursor..open]);
                output.push_str("()");
                cursor = end;
            }
            None => {
                output.push_str(&source[cursor..=open]);
                cursor = open + 1;
            }
        }
    }
    output.push_str(&source[cursor..]);
    output
}

/// Matches `(\s*out\s+vec4\s+(\S+)\s*,\s*in\s+vec2\s+(\S+)\s*\)` at `open`.
///
/// Captures are the longest non-whitespace runs that still let the rest of the
/// pattern match, so `c,in` and `c , in` both bind `c`. Returns the byte
/// offset just past the closing parenthesis.
fn match_io_signature(source: &str, open: usize) -> Option<(IoSignature<'_>, usize)> {
    let rest = source[open..].strip_prefix('(')?.trim_start();
    let rest = rest.strip_prefix("out")?;
    let rest = skip_required_whitespace(rest)?.strip_prefix("vec4")?;
    let rest = skip_required_whitespace(rest)?;

    for color_len in token_prefixes(rest) {
        let color = &rest[..color_len];
        let Some(tail) = rest[color_len..].trim_start().strip_prefix(',') else {
            continue;
        };
        let Some(tail) = tail.trim_start().strip_prefix("in") else {
            continue;
        };
        let Some(tail) = skip_required_whitespace(tail).and_then(|t| t.strip_prefix("vec2")) else {
            continue;
        };
        let Some(tail) = skip_required_whitespace(tail) else {
            continue;
        };
        for coord_len in token_prefixes(tail) {
            let coord = &tail[..coord_len];
            if let Some(after) = tail[coord_len..].trim_start().strip_prefix(')') {
                return Some((IoSignature { color, coord }, source.len() - after.len()));
            }
        }
    }
    None
}

fn skip_required_whitespace(input: &str) -> Option<&str> {
    let trimmed = input.trim_start();
    (trimmed.len() < input.len()).then_some(trimmed)
}

/// Byte lengths of every non-empty prefix of the leading non-whitespace run,
/// longest first.
fn token_prefixes(input: &str) -> impl Iterator<Item = usize> + '_ {
    let run = input.find(char::is_whitespace).unwrap_or(input.len());
    input[..run]
        .char_indices()
        .map(|(index, ch)| index + ch.len_utf8())
        .rev()
}
