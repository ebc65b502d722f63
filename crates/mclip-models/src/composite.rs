//! Multi-source composite requests.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::encoding::EncodingConfig;
use crate::error::ModelError;
use crate::layout::{Slot, Template};
use crate::source::VideoSource;

/// Most sources a single composite accepts.
pub const MAX_COMPOSITE_SOURCES: usize = 10;

/// How source audio reaches the composite output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AudioPolicy {
    /// One source's audio track
    #[default]
    SingleSource,
    /// Every audio-enabled source mixed together
    MixAll,
    /// No audio output
    Mute,
}

impl AudioPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioPolicy::SingleSource => "single_source",
            AudioPolicy::MixAll => "mix_all",
            AudioPolicy::Mute => "mute",
        }
    }
}

impl fmt::Display for AudioPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A template plus the sources drawn into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CompositeRequest {
    pub template: Template,
    pub sources: Vec<VideoSource>,
    #[serde(default)]
    pub audio_policy: AudioPolicy,
    /// Source id whose audio is used under [`AudioPolicy::SingleSource`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_source: Option<String>,
    #[serde(default)]
    pub encoding: EncodingConfig,
    /// Optional cap on output duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_limit: Option<f64>,
    pub output_path: PathBuf,
}

impl CompositeRequest {
    /// Build a request, enforcing every structural invariant.
    pub fn new(
        template: Template,
        sources: Vec<VideoSource>,
        audio_policy: AudioPolicy,
        audio_source: Option<String>,
        output_path: impl Into<PathBuf>,
    ) -> Result<Self, ModelError> {
        let request = Self {
            template,
            sources,
            audio_policy,
            audio_source,
            encoding: EncodingConfig::default(),
            duration_limit: None,
            output_path: output_path.into(),
        };
        request.validate()?;
        Ok(request)
    }

    pub fn with_encoding(mut self, encoding: EncodingConfig) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_duration_limit(mut self, seconds: f64) -> Self {
        self.duration_limit = Some(seconds);
        self
    }

    /// Same request, writing somewhere else.
    pub fn with_output_path(mut self, output_path: impl Into<PathBuf>) -> Self {
        self.output_path = output_path.into();
        self
    }

    /// Re-check the invariants `new` enforces, for requests built through serde.
    pub fn validate(&self) -> Result<(), ModelError> {
        let count = self.sources.len();
        if count == 0 || count > MAX_COMPOSITE_SOURCES {
            return Err(ModelError::SourceCount {
                count,
                max: MAX_COMPOSITE_SOURCES,
            });
        }

        self.template.validate_layout()?;

        for source in &self.sources {
            if self.template.slot(&source.slot_id).is_none() {
                return Err(ModelError::UnknownSlot {
                    source_id: source.id.clone(),
                    slot_id: source.slot_id.clone(),
                });
            }
            source.validate()?;
        }

        if self.audio_policy == AudioPolicy::SingleSource {
            if let Some(id) = &self.audio_source {
                if !self.sources.iter().any(|s| &s.id == id) {
                    return Err(ModelError::UnknownAudioSource(id.clone()));
                }
            }
        }

        if let Some(limit) = self.duration_limit {
            if limit <= 0.0 {
                return Err(ModelError::invalid(format!(
                    "Duration limit must be positive, got {}",
                    limit
                )));
            }
        }

        Ok(())
    }

    /// The source whose audio feeds a single-source output.
    ///
    /// Explicit `audio_source` wins when it has audio enabled; otherwise the
    /// first audio-enabled source in list order. Always `None` unless the
    /// policy is [`AudioPolicy::SingleSource`].
    pub fn get_audio_source(&self) -> Option<&VideoSource> {
        if self.audio_policy != AudioPolicy::SingleSource {
            return None;
        }

        self.audio_source
            .as_deref()
            .and_then(|id| self.sources.iter().find(|s| s.id == id && s.audio_enabled))
            .or_else(|| self.sources.iter().find(|s| s.audio_enabled))
    }

    /// Enabled sources paired with their slots, bottom layer first.
    ///
    /// Ordered by slot z-index; ties keep input order. Sources whose slot is
    /// disabled are left out.
    pub fn sources_in_z_order(&self) -> Vec<(&VideoSource, &Slot)> {
        let mut pairs: Vec<(&VideoSource, &Slot)> = self
            .sources
            .iter()
            .filter_map(|source| {
                self.template
                    .slot(&source.slot_id)
                    .filter(|slot| slot.enabled)
                    .map(|slot| (source, slot))
            })
            .collect();
        // sort_by_key is stable, so equal z-indices keep list order
        pairs.sort_by_key(|(_, slot)| slot.z_index);
        pairs
    }

    /// Slot ids referenced by more than one source.
    pub fn shared_slots(&self) -> Vec<&str> {
        let mut shared: Vec<&str> = Vec::new();
        for (i, source) in self.sources.iter().enumerate() {
            let repeated = self.sources[..i].iter().any(|s| s.slot_id == source.slot_id);
            if repeated && !shared.contains(&source.slot_id.as_str()) {
                shared.push(&source.slot_id);
            }
        }
        shared
    }
}
