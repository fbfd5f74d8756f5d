use std::path::Path;

use anyhow::{bail, Context, Result};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::relay::model::{InferTask, RawTranscript, SpeechModel};
use crate::relay::types::Segment;

// Segment timestamps come back in centiseconds.
const TIMESTAMP_UNIT_SECS: f64 = 0.01;

/// Synchronous whisper.cpp adapter. The context is loaded once at startup
/// and shared; each call gets its own decoding state.
pub struct WhisperEngine {
    ctx: WhisperContext,
}

impl WhisperEngine {
    #[tracing::instrument(level = "info")]
    pub fn load(model_path: &str) -> Result<Self> {
        let ctx = WhisperContext::new_with_params(model_path, WhisperContextParameters::default())
            .with_context(|| format!("failed to load whisper model from {model_path}"))?;
        Ok(Self { ctx })
    }
}

impl SpeechModel for WhisperEngine {
    #[tracing::instrument(level = "info", skip(self))]
    fn infer(
        &self,
        audio: &Path,
        task: InferTask,
        source_language: Option<&str>,
    ) -> Result<RawTranscript> {
        let samples = read_wav_samples(audio)?;
        let mut state = self.ctx.create_state()?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(source_language.unwrap_or("auto")));
        params.set_translate(task == InferTask::Translate);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state.full(params, &samples)?;

        let detected = whisper_rs::get_lang_str(state.full_lang_id_from_state()?)
            .map(str::to_string)
            .or_else(|| source_language.map(str::to_string));

        let segment_count = state.full_n_segments()?;
        let mut segments = Vec::with_capacity(segment_count as usize);
        let mut text = String::new();
        for i in 0..segment_count {
            let segment_text = state.full_get_segment_text(i)?;
            text.push_str(&segment_text);
            segments.push(Segment {
                id: i as usize,
                start: state.full_get_segment_t0(i)? as f64 * TIMESTAMP_UNIT_SECS,
                end: state.full_get_segment_t1(i)? as f64 * TIMESTAMP_UNIT_SECS,
                text: segment_text.trim().to_string(),
            });
        }

        Ok(RawTranscript {
            text,
            language: detected,
            segments,
        })
    }
}

/// Requirements: 16 kHz, mono, PCM int16 WAV file.
fn read_wav_samples(wav_path: &Path) -> Result<Vec<f32>> {
    let mut reader = hound::WavReader::open(wav_path)
        .with_context(|| format!("failed to open {}", wav_path.display()))?;
    let spec = reader.spec();

    if spec.channels != 1 {
        bail!("expected 1 channel, found {}", spec.channels);
    }
    if spec.sample_rate != 16_000 {
        bail!("expected 16000 Hz sample rate, found {} Hz", spec.sample_rate);
    }
    if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
        bail!(
            "expected 16 bit PCM samples, found {} bit {:?}",
            spec.bits_per_sample,
            spec.sample_format
        );
    }

    let samples: Result<Vec<f32>, _> = reader
        .samples::<i16>()
        .map(|sample| sample.map(|s| f32::from(s) / f32::from(i16::MAX)))
        .collect();
    Ok(samples?)
}
