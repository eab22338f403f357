// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Model descriptor parsing.
//!
//! A descriptor is a small YAML document stored next to a model (or embedded in an ONNX
//! file's custom metadata) that records the output head layout, the anchor strides, the
//! input size and the class names.

use std::collections::HashMap;
use std::path::Path;

use crate::catalog::ClassCatalog;
use crate::error::{InferenceError, Result};
use crate::inference::{DEFAULT_STRIDES, InferenceConfig};
use crate::preprocessing::SizePolicy;
use crate::style::DecodeStyle;

/// Layout information describing a detection model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    /// Model description.
    pub description: String,
    /// Exporter version.
    pub version: String,
    /// Output head layout.
    pub style: DecodeStyle,
    /// Anchor strides, finest first.
    pub strides: Vec<u32>,
    /// Largest stride, used to align dynamic input sizes.
    pub stride: u32,
    /// Input image size as (height, width).
    pub imgsz: (usize, usize),
    /// Class ID to class name mapping.
    pub names: HashMap<usize, String>,
}

impl Default for ModelDescriptor {
    fn default() -> Self {
        Self {
            description: String::new(),
            version: String::new(),
            style: DecodeStyle::Direct,
            strides: DEFAULT_STRIDES.to_vec(),
            stride: 32,
            imgsz: (640, 640),
            names: HashMap::new(),
        }
    }
}

impl ModelDescriptor {
    /// Read a descriptor file.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read, or a metadata error if it is
    /// malformed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Parse a descriptor from ONNX model custom metadata properties.
    ///
    /// # Errors
    ///
    /// Returns an error if no metadata entry is present or it is malformed.
    pub fn from_onnx_metadata(metadata_map: &HashMap<String, String>) -> Result<Self> {
        let yaml_str = metadata_map
            .get("metadata")
            .or_else(|| metadata_map.get("model_metadata"))
            .or_else(|| metadata_map.values().find(|v| v.contains("names:")))
            .ok_or_else(|| {
                InferenceError::ModelLoadError("No metadata found in ONNX model".to_string())
            })?;

        Self::from_yaml_str(yaml_str)
    }

    /// Parse a descriptor from a YAML string.
    ///
    /// Recognized keys: `description`, `version`, `style` (`direct`, `dfl`, `dfl:<bins>`),
    /// `reg_max`, `strides`, `stride`, `imgsz` and `names`. Other keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::MetadataError`] for unparsable values.
    pub fn from_yaml_str(yaml_str: &str) -> Result<Self> {
        let mut descriptor = Self::default();
        let mut reg_max: Option<usize> = None;

        for line in yaml_str.lines() {
            // Only top-level keys; nested entries belong to blocks parsed below.
            if line.starts_with([' ', '\t']) {
                continue;
            }
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            let value = unquote(value);

            match key {
                "description" => descriptor.description = value.to_string(),
                "version" => descriptor.version = value.to_string(),
                "style" => {
                    descriptor.style = value.parse().map_err(|e| {
                        InferenceError::MetadataError(format!("Invalid style in descriptor: {e}"))
                    })?;
                }
                "reg_max" => reg_max = Some(parse_number(key, value)?),
                "stride" => descriptor.stride = parse_number(key, value)?,
                _ => {}
            }
        }

        if let Some(reg_max) = reg_max {
            if reg_max == 0 {
                return Err(InferenceError::MetadataError(
                    "reg_max must be positive".to_string(),
                ));
            }
            if let DecodeStyle::Dfl { .. } = descriptor.style {
                descriptor.style = DecodeStyle::Dfl { reg_max };
            }
        }

        if let Some(values) = parse_list::<u32>(yaml_str, "strides")? {
            if values.is_empty() || values.contains(&0) {
                return Err(InferenceError::MetadataError(format!(
                    "strides must be non-empty and positive, got {values:?}"
                )));
            }
            descriptor.strides = values;
        }

        if let Some(values) = parse_list::<usize>(yaml_str, "imgsz")? {
            descriptor.imgsz = match values.as_slice() {
                [size] => (*size, *size),
                [h, w, ..] => (*h, *w),
                [] => descriptor.imgsz,
            };
        }

        descriptor.names = parse_names_block(yaml_str);
        Ok(descriptor)
    }

    /// Get the number of classes named by this descriptor.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.names.len()
    }

    /// Class catalog built from `names`.
    #[must_use]
    pub fn catalog(&self) -> ClassCatalog {
        ClassCatalog::from_names(&self.names)
    }

    /// Letterbox policy for this model: square inputs are fixed, others are stride-aligned.
    ///
    /// A non-square `imgsz` is read as the long side of a dynamic-shape model. The result
    /// is `StrideAligned { size: max(h, w) }`, which follows each frame's orientation and
    /// does not reproduce a static `(h, w)` input. Models with a static non-square input
    /// need frames of that aspect ratio or a square export.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn size_policy(&self) -> SizePolicy {
        let (h, w) = self.imgsz;
        if h == w {
            SizePolicy::Fixed { size: h as u32 }
        } else {
            SizePolicy::StrideAligned {
                size: h.max(w) as u32,
                stride: self.stride,
            }
        }
    }

    /// Apply the descriptor's layout to a configuration, keeping its thresholds.
    #[must_use]
    pub fn apply_to(&self, config: InferenceConfig) -> InferenceConfig {
        config
            .with_style(self.style)
            .with_strides(self.strides.clone())
            .with_size_policy(self.size_policy())
    }
}

fn unquote(value: &str) -> &str {
    value.trim().trim_matches('\'').trim_matches('"')
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| InferenceError::MetadataError(format!("Invalid {key} value: {value}")))
}

/// Parse a list field written inline (`key: [8, 16, 32]`), as a scalar (`key: 640`) or as
/// a block of `- item` lines. Returns `None` if the key is absent.
fn parse_list<T: std::str::FromStr>(yaml_str: &str, key: &str) -> Result<Option<Vec<T>>> {
    let prefix = format!("{key}:");
    let lines: Vec<&str> = yaml_str.lines().collect();
    let Some(index) = lines.iter().position(|l| l.trim_start().starts_with(&prefix)) else {
        return Ok(None);
    };

    let inline = lines[index].trim_start()[prefix.len()..].trim();
    if let Some(inner) = inline.strip_prefix('[') {
        let inner = inner.strip_suffix(']').ok_or_else(|| {
            InferenceError::MetadataError(format!("Unterminated list for {key}"))
        })?;
        return inner
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| parse_number(key, s))
            .collect::<Result<Vec<_>>>()
            .map(Some);
    }
    if !inline.is_empty() {
        return parse_number(key, unquote(inline)).map(|v| Some(vec![v]));
    }

    let mut values = Vec::new();
    for following in &lines[index + 1..] {
        let trimmed = following.trim();
        if let Some(item) = trimmed.strip_prefix('-') {
            values.push(parse_number(key, item.trim())?);
        } else if !trimmed.is_empty() && !trimmed.starts_with('#') {
            break;
        }
    }
    Ok(Some(values))
}

/// Parse the names block from YAML or Python dict format.
fn parse_names_block(yaml_str: &str) -> HashMap<usize, String> {
    let mut names = HashMap::new();

    if let Some(start) = yaml_str.find("names:") {
        let trimmed = yaml_str[start + 6..].trim();
        // Python dict format: `names: {0: 'person', 1: 'bicycle'}`
        if let Some(body) = trimmed.strip_prefix('{') {
            if let Some(end) = body.find('}') {
                for entry in body[..end].split(',') {
                    if let Some((key, value)) = entry.split_once(':') {
                        if let Ok(class_id) = key.trim().parse::<usize>() {
                            names.insert(class_id, unquote(value).to_string());
                        }
                    }
                }
                return names;
            }
        }
    }

    let mut in_names_block = false;
    for line in yaml_str.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("names:") {
            in_names_block = true;
            continue;
        }
        if !in_names_block || trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        // Block entries look like "  0: person"; anything else ends the block.
        let Some((key, value)) = trimmed.split_once(':') else {
            break;
        };
        let Ok(class_id) = key.trim().parse::<usize>() else {
            break;
        };
        names.insert(class_id, unquote(value).to_string());
    }

    names
}
