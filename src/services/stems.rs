use std::collections::HashMap;
use std::path::Path;

/// The closed set of stems the six-source model emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stem {
    Bass,
    Piano,
    Other,
    Vocals,
    Guitar,
    Drums,
}

impl Stem {
    pub const ALL: [Stem; 6] = [
        Stem::Bass,
        Stem::Piano,
        Stem::Other,
        Stem::Vocals,
        Stem::Guitar,
        Stem::Drums,
    ];

    /// Label the engine puts in parentheses inside its output names.
    pub fn engine_label(self) -> &'static str {
        match self {
            Stem::Bass => "Bass",
            Stem::Piano => "Piano",
            Stem::Other => "Other",
            Stem::Vocals => "Vocals",
            Stem::Guitar => "Guitar",
            Stem::Drums => "Drums",
        }
    }

    /// Client-facing filename inside a workspace.
    pub fn canonical_name(self) -> &'static str {
        match self {
            Stem::Bass => "bass.wav",
            Stem::Piano => "piano.wav",
            Stem::Other => "strings_or_pads.wav",
            Stem::Vocals => "vocals.wav",
            Stem::Guitar => "guitar.wav",
            Stem::Drums => "drums.wav",
        }
    }

    pub fn from_canonical_name(name: &str) -> Option<Stem> {
        Stem::ALL.into_iter().find(|s| s.canonical_name() == name)
    }
}

/// Translates raw engine output names into canonical stem names for one loaded model.
#[derive(Debug, Clone)]
pub struct OutputMapper {
    model_tag: String,
    extension: String,
}

impl OutputMapper {
    pub fn new(model_tag: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            model_tag: model_tag.into(),
            extension: extension.into(),
        }
    }

    /// `{base}_({Label})_{model_tag}.{ext}`
    pub fn raw_name(&self, base_name: &str, stem: Stem) -> String {
        format!(
            "{}_({})_{}.{}",
            base_name,
            stem.engine_label(),
            self.model_tag,
            self.extension
        )
    }

    /// Exact raw filename -> stem, always one entry per stem.
    pub fn build_mapping(&self, base_name: &str) -> HashMap<String, Stem> {
        Stem::ALL
            .into_iter()
            .map(|stem| (self.raw_name(base_name, stem), stem))
            .collect()
    }
}

/// Upload name with its extension stripped. Directory components are never retained.
pub fn base_name(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
