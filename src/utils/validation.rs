use std::path::{Component, Path};
use thiserror::Error;

/// Audio containers the separation engine is able to decode
pub const ALLOWED_AUDIO_EXTENSIONS: &[&str] = &[
    "wav", "mp3", "flac", "ogg", "oga", "opus", "m4a", "aac", "aif", "aiff", "wma", "webm", "mp4",
];

const MAX_FILENAME_BYTES: usize = 255;

#[derive(Error, Debug, Clone)]
#[error("{code}: {message}")]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Sanitizes an uploaded filename so it can be stored as a single path segment
/// inside a workspace. Directory components are dropped, reserved characters
/// are replaced and the extension must be a known audio container.
pub fn sanitize_upload_filename(filename: &str) -> Result<String, ValidationError> {
    // Clients on Windows send backslash-separated paths
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim();

    if name != filename {
        tracing::warn!("Directory components stripped from upload name: {}", filename);
    }

    if name.is_empty() || name == "." || name == ".." {
        return Err(ValidationError::new(
            "INVALID_FILENAME",
            "Filename cannot be empty",
        ));
    }

    if name.starts_with('.') {
        return Err(ValidationError::new(
            "HIDDEN_FILE",
            "Hidden files (starting with '.') are not allowed",
        ));
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|' | ';')
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    let sanitized = truncate_keeping_extension(&sanitized, MAX_FILENAME_BYTES);
    validate_audio_extension(&sanitized)?;
    Ok(sanitized)
}

/// Rejects files whose extension is not an audio container the engine reads.
pub fn validate_audio_extension(filename: &str) -> Result<(), ValidationError> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .ok_or_else(|| {
            ValidationError::new(
                "MISSING_EXTENSION",
                format!("'{}' has no file extension", filename),
            )
        })?;

    if ALLOWED_AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(ValidationError::new(
            "UNSUPPORTED_FORMAT",
            format!("File extension '.{}' is not a supported audio format", ext),
        ))
    }
}

/// True when `segment` names exactly one entry directly below its parent:
/// no separators, no `.`/`..`, no root or drive prefix.
pub fn is_safe_path_segment(segment: &str) -> bool {
    if segment.is_empty() || segment.contains(['/', '\\', '\0']) {
        return false;
    }

    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn truncate_keeping_extension(name: &str, max_bytes: usize) -> String {
    if name.len() <= max_bytes {
        return name.to_string();
    }

    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.len() < 16)
        .map(|e| format!(".{}", e))
        .unwrap_or_default();

    let mut end = max_bytes - ext.len();
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &name[..end], ext)
}
