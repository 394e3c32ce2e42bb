//! Memory images and the tools around them.
//!
//! This module provides:
//! - [`MemoryImage`], a set of `(address, word)` pairs to preload
//! - JSON image files of the form `{"<module>": {"base": N, "words": [..]}}`
//! - A disassembler driven by the control table

pub mod disasm;

pub use disasm::{disassemble, disassemble_at, Line};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Words to place in memory before the first pulse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryImage {
    words: Vec<(u64, u64)>,
}

impl MemoryImage {
    /// An empty image.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consecutive words starting at `base`. Words that would fall past
    /// `u64::MAX` are dropped; `base` itself is then out of range for any
    /// memory, so loading still rejects the image.
    pub fn from_words(base: u64, words: &[u64]) -> Self {
        Self {
            words: words
                .iter()
                .enumerate()
                .map_while(|(i, &w)| Some((base.checked_add(i as u64)?, w)))
                .collect(),
        }
    }

    /// Arbitrary `(address, word)` pairs, applied in order.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (u64, u64)>,
    {
        Self {
            words: pairs.into_iter().collect(),
        }
    }

    /// Parse JSON image text. Entries that are not objects are skipped.
    pub fn from_json(text: &str) -> Result<Self, ImageError> {
        let modules: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(text).map_err(|e| ImageError::Parse(e.to_string()))?;

        let mut image = MemoryImage::new();
        for (name, value) in modules {
            if !value.is_object() {
                continue;
            }
            let module: ImageModule = serde_json::from_value(value)
                .map_err(|e| ImageError::Parse(format!("module {}: {}", name, e)))?;
            image.extend(module.base, &module.words)?;
        }
        Ok(image)
    }

    /// Append consecutive words at `base`. Negative values are kept in
    /// two's complement and masked when loaded. Fails without appending
    /// anything if an address would overflow.
    pub fn extend(&mut self, base: u64, words: &[i64]) -> Result<(), ImageError> {
        let pairs = words
            .iter()
            .enumerate()
            .map(|(i, &w)| {
                base.checked_add(i as u64)
                    .map(|address| (address, w as u64))
                    .ok_or(ImageError::AddressOverflow { base, offset: i })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.words.extend(pairs);
        Ok(())
    }

    /// Every `(address, word)` pair in application order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.words.iter().copied()
    }

    pub fn addresses(&self) -> impl Iterator<Item = u64> + '_ {
        self.words.iter().map(|&(address, _)| address)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// One module entry of a JSON image file.
#[derive(Debug, Serialize, Deserialize)]
struct ImageModule {
    #[serde(default)]
    base: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    length: Option<usize>,
    #[serde(default)]
    words: Vec<i64>,
}

/// Load a JSON image file from disk.
pub fn load_image_file<P: AsRef<Path>>(path: P) -> Result<MemoryImage, ImageError> {
    let text = std::fs::read_to_string(path.as_ref())
        .map_err(|e| ImageError::Io(e.to_string()))?;
    MemoryImage::from_json(&text)
}

/// Render a memory dump as a single-module JSON image.
pub fn image_to_json(name: &str, memory: &[u64]) -> Result<String, ImageError> {
    let module = ImageModule {
        base: 0,
        length: Some(memory.len()),
        words: memory.iter().map(|&w| w as i64).collect(),
    };
    let mut modules = BTreeMap::new();
    modules.insert(name, module);
    serde_json::to_string_pretty(&modules).map_err(|e| ImageError::Parse(e.to_string()))
}

/// Save a memory dump to disk in the JSON image format.
pub fn save_image<P: AsRef<Path>>(path: P, name: &str, memory: &[u64]) -> Result<(), ImageError> {
    let text = image_to_json(name, memory)?;
    std::fs::write(path.as_ref(), text).map_err(|e| ImageError::Io(e.to_string()))
}

/// Errors raised while reading or applying memory images.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("image address {address:#x} outside {memory_size}-word memory")]
    AddressOutOfRange { address: u64, memory_size: usize },

    #[error("image word {offset} past base {base:#x} overflows the address space")]
    AddressOverflow { base: u64, offset: usize },

    #[error("images can only be loaded before the first pulse")]
    AlreadyRunning,

    #[error("image parse error: {0}")]
    Parse(String),

    #[error("image I/O error: {0}")]
    Io(String),
}
