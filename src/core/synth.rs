//! The synthesis-engine boundary.
//!
//! The engine itself lives outside this crate (a neural TTS model, a cloud
//! API, whatever the host wires in). The queue only depends on this trait:
//! text plus a voice identifier in, audio bytes or a [`SynthesisError`] out.
//! A call may take seconds and must be safely invocable from up to the
//! configured number of concurrent slots; the crate does not prescribe
//! whether the engine is shared, pooled, or per-language.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::SynthesisError;

/// Canonical output sample rate in Hz.
pub const CANONICAL_SAMPLE_RATE: u32 = 48_000;

/// Engine-side voice identifier (e.g. `"baya"`, `"en_0"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoiceId(String);

impl VoiceId {
    /// Create a voice id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VoiceId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// Container format of the produced audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    /// Uncompressed WAV.
    Wav,
    /// Ogg/Opus.
    Ogg,
    /// MP3.
    Mp3,
}

/// A finished synthesis result: encoded audio plus its wire parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioClip {
    /// Encoded audio bytes.
    pub samples: Vec<u8>,
    /// Sample rate in Hz; engines are expected to emit
    /// [`CANONICAL_SAMPLE_RATE`].
    pub sample_rate: u32,
    /// Container format of `samples`.
    pub format: AudioFormat,
}

impl AudioClip {
    /// Build a clip at the canonical sample rate.
    pub fn new(samples: Vec<u8>, format: AudioFormat) -> Self {
        Self {
            samples,
            sample_rate: CANONICAL_SAMPLE_RATE,
            format,
        }
    }
}

/// Abstraction over the speech-synthesis engine.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use voxgate::core::{AudioClip, AudioFormat, SynthesisAdapter, SynthesisError, VoiceId};
///
/// struct NeuralTts { /* model handle */ }
///
/// #[async_trait]
/// impl SynthesisAdapter for NeuralTts {
///     async fn synthesize(&self, text: &str, voice: &VoiceId)
///         -> Result<AudioClip, SynthesisError>
///     {
///         let wav = self.run_model(text, voice.as_str()).await
///             .map_err(|e| SynthesisError::Model(e.to_string()))?;
///         Ok(AudioClip::new(wav, AudioFormat::Wav))
///     }
/// }
/// ```
#[async_trait]
pub trait SynthesisAdapter: Send + Sync + 'static {
    /// Render `text` with the given voice.
    ///
    /// May be slow (seconds). Must be callable concurrently from as many
    /// tasks as the slot limiter admits.
    async fn synthesize(&self, text: &str, voice: &VoiceId) -> Result<AudioClip, SynthesisError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_defaults_to_canonical_rate() {
        let clip = AudioClip::new(vec![0u8; 16], AudioFormat::Wav);
        assert_eq!(clip.sample_rate, CANONICAL_SAMPLE_RATE);
        assert_eq!(clip.samples.len(), 16);
    }

    #[test]
    fn voice_id_display() {
        let v = VoiceId::from("baya");
        assert_eq!(v.as_str(), "baya");
        assert_eq!(v.to_string(), "baya");
    }
}
