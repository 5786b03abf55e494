//! Turning a [`ModuleSource`] into a compiled wasmtime [`Module`].
//!
//! Raw bytes are classified by content, never by file name: the binary magic
//! number, or an opening parenthesis after an optional BOM, whitespace and
//! comments.
//! Text sources go through `wat` before compilation.

use std::borrow::Cow;
use std::io::Read;
use std::path::PathBuf;

use wasmtime::{Engine, Module};

use crate::error::Result;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("bytes are neither a wasm binary nor module text")]
    UnrecognizedFormat,
    #[error("malformed module text: {0}")]
    WatParseFailed(#[source] wat::Error),
}

/// Where the module comes from.
pub enum ModuleSource {
    /// Binary or text-format bytes.
    Bytes(Vec<u8>),
    /// A module compiled earlier against the same engine.
    Module(Module),
    /// A file the engine may compile directly.
    File(PathBuf),
    /// Any byte stream; buffered fully before compiling.
    Stream(Box<dyn Read + Send>),
}

impl ModuleSource {
    pub fn stream(reader: impl Read + Send + 'static) -> Self {
        ModuleSource::Stream(Box::new(reader))
    }
}

impl From<Vec<u8>> for ModuleSource {
    fn from(bytes: Vec<u8>) -> Self {
        ModuleSource::Bytes(bytes)
    }
}

impl From<&[u8]> for ModuleSource {
    fn from(bytes: &[u8]) -> Self {
        ModuleSource::Bytes(bytes.to_vec())
    }
}

impl From<&str> for ModuleSource {
    fn from(text: &str) -> Self {
        ModuleSource::Bytes(text.as_bytes().to_vec())
    }
}

impl From<Module> for ModuleSource {
    fn from(module: Module) -> Self {
        ModuleSource::Module(module)
    }
}

impl From<PathBuf> for ModuleSource {
    fn from(path: PathBuf) -> Self {
        ModuleSource::File(path)
    }
}

impl core::fmt::Debug for ModuleSource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ModuleSource::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            ModuleSource::Module(_) => write!(f, "Module"),
            ModuleSource::File(p) => write!(f, "File({})", p.display()),
            ModuleSource::Stream(_) => write!(f, "Stream"),
        }
    }
}

/// Compile raw bytes in either format.
pub fn compile_module(engine: &Engine, bytes: &[u8]) -> Result<Module> {
    let (format, binary) = to_binary(bytes)?;
    log::debug!("compiling {format:?} module ({} bytes)", binary.len());
    Ok(Module::new(engine, &binary)?)
}

/// Compile straight from disk, letting the engine map the file itself.
pub fn compile_file(engine: &Engine, path: &std::path::Path) -> Result<Module> {
    log::debug!("compiling module from {}", path.display());
    Ok(Module::from_file(engine, path)?)
}

/// Drain a stream into memory.
pub fn buffer_stream(mut reader: impl Read) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Encoding of a byte source.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SourceFormat {
    Binary,
    Text,
}

const WASM_MAGIC: &[u8; 4] = b"\0asm";
const UTF8_BOM: &[u8; 3] = b"\xEF\xBB\xBF";

impl SourceFormat {
    /// Binary if the magic number is present; text if the first token after an
    /// optional BOM, whitespace and comments opens an s-expression.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(WASM_MAGIC) {
            return Some(SourceFormat::Binary);
        }
        let text = bytes.strip_prefix(UTF8_BOM.as_slice()).unwrap_or(bytes);
        match skip_trivia(text)? {
            [b'(', ..] => Some(SourceFormat::Text),
            _ => None,
        }
    }
}

/// Drop leading whitespace, `;;` line comments and nested `(; ;)` block
/// comments. `None` if a block comment never closes.
fn skip_trivia(mut text: &[u8]) -> Option<&[u8]> {
    loop {
        match text {
            [b' ' | b'\t' | b'\r' | b'\n', rest @ ..] => text = rest,
            [b';', b';', rest @ ..] => {
                text = match rest.iter().position(|&b| b == b'\n') {
                    Some(end) => &rest[end + 1..],
                    None => &[],
                };
            }
            [b'(', b';', rest @ ..] => text = skip_block_comment(rest)?,
            _ => return Some(text),
        }
    }
}

/// Remainder after the `;)` closing a block comment whose opener was consumed.
fn skip_block_comment(mut text: &[u8]) -> Option<&[u8]> {
    let mut depth = 1usize;
    while depth > 0 {
        text = match text {
            [b'(', b';', rest @ ..] => {
                depth += 1;
                rest
            }
            [b';', b')', rest @ ..] => {
                depth -= 1;
                rest
            }
            [_, rest @ ..] => rest,
            [] => return None,
        };
    }
    Some(text)
}

/// Binary module bytes for `bytes`; text sources are assembled first.
pub fn to_binary(bytes: &[u8]) -> Result<(SourceFormat, Cow<'_, [u8]>), LoadError> {
    match SourceFormat::sniff(bytes).ok_or(LoadError::UnrecognizedFormat)? {
        SourceFormat::Binary => Ok((SourceFormat::Binary, Cow::Borrowed(bytes))),
        SourceFormat::Text => {
            let binary = wat::parse_bytes(bytes).map_err(LoadError::WatParseFailed)?;
            Ok((SourceFormat::Text, Cow::Owned(binary.into_owned())))
        }
    }
}
