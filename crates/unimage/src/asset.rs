//! Source assets: the uploaded image or video and its derived metadata.

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::client::Part;
use crate::error::AssetError;

/// An inline media payload, base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub data: String,
    pub mime_type: String,
}

impl Asset {
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self::new(BASE64.encode(bytes), mime_type)
    }

    pub fn decode(&self) -> Result<Vec<u8>, AssetError> {
        Ok(BASE64.decode(self.data.as_bytes())?)
    }

    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with("video/")
    }

    pub fn to_part(&self) -> Part {
        Part::inline(&self.mime_type, &self.data)
    }

    /// Wraps a base64 image whose MIME type was not recorded, sniffing it
    /// from the magic bytes. Falls back to PNG.
    pub fn sniffed(data: impl Into<String>) -> Self {
        let data = data.into();
        let mime_type = BASE64
            .decode(data.as_bytes())
            .ok()
            .and_then(|bytes| image::guess_format(&bytes).ok())
            .map(|format| format.to_mime_type().to_string())
            .unwrap_or_else(|| "image/png".to_string());
        Self { data, mime_type }
    }
}

/// Decodes a base64 image and writes it to `path` as PNG.
pub fn export_png(data: &str, path: &Path) -> Result<(), AssetError> {
    let bytes = BASE64.decode(data.as_bytes())?;
    let decoded = image::load_from_memory(&bytes)?;
    decoded
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| AssetError::Export {
            path: path.to_path_buf(),
            source: e,
        })?;
    log::info!("Exported image to {}", path.display());
    Ok(())
}

/// Aspect ratios supported by the image model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "3:4")]
    Portrait,
    #[serde(rename = "4:3")]
    Landscape,
    #[serde(rename = "9:16")]
    Tall,
    #[serde(rename = "16:9")]
    Wide,
}

impl AspectRatio {
    const CANDIDATES: [(AspectRatio, f64); 5] = [
        (AspectRatio::Square, 1.0),
        (AspectRatio::Portrait, 0.75),
        (AspectRatio::Landscape, 1.333),
        (AspectRatio::Tall, 0.5625),
        (AspectRatio::Wide, 1.777),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait => "3:4",
            AspectRatio::Landscape => "4:3",
            AspectRatio::Tall => "9:16",
            AspectRatio::Wide => "16:9",
        }
    }

    /// Picks the supported ratio closest to `width / height`.
    /// Ties keep the earlier candidate.
    pub fn nearest(width: u32, height: u32) -> AspectRatio {
        if height == 0 {
            return AspectRatio::default();
        }
        let ratio = width as f64 / height as f64;
        let mut best = Self::CANDIDATES[0];
        for candidate in Self::CANDIDATES.iter().skip(1) {
            if (candidate.1 - ratio).abs() < (best.1 - ratio).abs() {
                best = *candidate;
            }
        }
        best.0
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An asset read from disk together with what the loader detected about it.
#[derive(Debug, Clone)]
pub struct LoadedAsset {
    pub asset: Asset,
    pub aspect_ratio: AspectRatio,
}

/// Reads an image or video file and prepares it for the pipeline.
///
/// Images are decoded once to detect their aspect ratio. Videos are not
/// decoded and default to 16:9.
pub fn load_asset<P: AsRef<Path>>(path: P) -> Result<LoadedAsset, AssetError> {
    let path = path.as_ref();
    let mime_type = mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let is_image = mime_type.starts_with("image/");
    if !is_image && !mime_type.starts_with("video/") {
        return Err(AssetError::UnsupportedType { mime_type });
    }

    let bytes = std::fs::read(path).map_err(|e| AssetError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let aspect_ratio = if is_image {
        let decoded = image::load_from_memory(&bytes)?;
        AspectRatio::nearest(decoded.width(), decoded.height())
    } else {
        AspectRatio::Wide
    };

    log::debug!(
        "Loaded asset {} ({}, {} bytes, aspect {})",
        path.display(),
        mime_type,
        bytes.len(),
        aspect_ratio
    );

    Ok(LoadedAsset {
        asset: Asset::from_bytes(&bytes, mime_type),
        aspect_ratio,
    })
}
