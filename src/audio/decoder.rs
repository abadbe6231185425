use std::io::Cursor;
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use hound::{SampleFormat, WavReader};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, error, info};

use super::resample::sinc_resample;
use crate::errors::{AcquisitionError, DecoderFailure};
use crate::types::{AudioSignal, AudioSource, TARGET_SAMPLE_RATE};

/// Raw container bytes plus what is known about their origin.
#[derive(Debug, Clone)]
pub struct EncodedAudio {
    pub bytes: Arc<[u8]>,
    pub extension: Option<String>,
    pub name: String,
}

impl EncodedAudio {
    pub fn load(source: &AudioSource) -> Result<Self, AcquisitionError> {
        let bytes: Arc<[u8]> = match source {
            AudioSource::Path(path) => {
                std::fs::read(path)
                    .map(Arc::from)
                    .map_err(|error| AcquisitionError::Unreadable {
                        source_name: source.describe(),
                        error,
                    })?
            }
            AudioSource::Bytes { data, .. } => Arc::clone(data),
        };
        Ok(Self {
            bytes,
            extension: source.extension(),
            name: source.describe(),
        })
    }
}

/// One decoding strategy in the acquisition chain.
///
/// Implementations return the stream at its native rate; the chain conforms
/// the result to the analysis rate.
pub trait AudioDecoder: Send + Sync {
    fn name(&self) -> &'static str;

    fn decode(&self, input: &EncodedAudio) -> Result<AudioSignal>;
}

/// General-purpose decoder: container probed with the extension hint, all
/// channels averaged to mono.
#[derive(Debug, Default, Clone, Copy)]
pub struct MixdownDecoder;

impl AudioDecoder for MixdownDecoder {
    fn name(&self) -> &'static str {
        "symphonia-mixdown"
    }

    fn decode(&self, input: &EncodedAudio) -> Result<AudioSignal> {
        decode_packets(
            input,
            PacketPolicy {
                use_hint: true,
                skip_corrupt: false,
                channels: ChannelSelection::Average,
            },
        )
    }
}

/// Raw RIFF/WAVE reader keeping only the first channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct WavChannelDecoder;

impl AudioDecoder for WavChannelDecoder {
    fn name(&self) -> &'static str {
        "wav-first-channel"
    }

    fn decode(&self, input: &EncodedAudio) -> Result<AudioSignal> {
        let mut reader =
            WavReader::new(Cursor::new(&input.bytes[..])).context("not a readable WAV stream")?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .context("failed to read float WAV samples")?,
            SampleFormat::Int => {
                let scale = 1.0 / (1u64 << spec.bits_per_sample.saturating_sub(1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|value| value as f32 * scale))
                    .collect::<Result<_, _>>()
                    .context("failed to read integer WAV samples")?
            }
        };

        let samples: Vec<f32> = interleaved.into_iter().step_by(channels).collect();
        ensure!(!samples.is_empty(), "WAV stream contains no samples");
        Ok(AudioSignal::mono(samples, spec.sample_rate))
    }
}

/// Last resort: probe without trusting the extension, keep channel 0 and
/// skip packets that fail to decode instead of aborting.
#[derive(Debug, Default, Clone, Copy)]
pub struct TolerantDecoder;

impl AudioDecoder for TolerantDecoder {
    fn name(&self) -> &'static str {
        "symphonia-tolerant"
    }

    fn decode(&self, input: &EncodedAudio) -> Result<AudioSignal> {
        decode_packets(
            input,
            PacketPolicy {
                use_hint: false,
                skip_corrupt: true,
                channels: ChannelSelection::First,
            },
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelSelection {
    Average,
    First,
}

#[derive(Debug, Clone, Copy)]
struct PacketPolicy {
    use_hint: bool,
    skip_corrupt: bool,
    channels: ChannelSelection,
}

fn decode_packets(input: &EncodedAudio, policy: PacketPolicy) -> Result<AudioSignal> {
    let cursor = Cursor::new(input.bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    if policy.use_hint {
        if let Some(extension) = input.extension.as_deref() {
            hint.with_extension(extension);
        }
    }

    let probe_result = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("failed to probe audio format")?;
    let mut format = probe_result.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("no audio tracks found in stream")?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .context("sample rate not specified in stream")?;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("failed to create decoder")?;

    let mut samples = Vec::new();
    let mut skipped = 0usize;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => return Err(err).context("failed to read packet"),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) if policy.skip_corrupt => {
                skipped += 1;
                debug!(reason, "skipping undecodable packet");
                continue;
            }
            Err(err) => return Err(err).context("failed to decode audio packet"),
        };

        let channels = decoded.spec().channels.count().max(1);
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        buffer.copy_interleaved_ref(decoded);
        let interleaved = buffer.samples();

        match policy.channels {
            ChannelSelection::Average => samples.extend(
                interleaved
                    .chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
            ),
            ChannelSelection::First => {
                samples.extend(interleaved.iter().step_by(channels).copied())
            }
        }
    }

    if skipped > 0 {
        debug!(skipped, "packets dropped while decoding");
    }
    ensure!(!samples.is_empty(), "decoded stream contains no samples");
    Ok(AudioSignal::mono(samples, sample_rate))
}

/// Ordered fallback chain; the first decoder to yield samples wins.
pub struct DecoderChain {
    decoders: Vec<Box<dyn AudioDecoder>>,
}

impl Default for DecoderChain {
    fn default() -> Self {
        Self::standard()
    }
}

impl DecoderChain {
    pub fn new(decoders: Vec<Box<dyn AudioDecoder>>) -> Self {
        Self { decoders }
    }

    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(MixdownDecoder),
            Box::new(WavChannelDecoder),
            Box::new(TolerantDecoder),
        ])
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.decoders.iter().map(|decoder| decoder.name()).collect()
    }

    /// Decode `source` to a mono signal at the canonical analysis rate.
    pub fn acquire(&self, source: &AudioSource) -> Result<AudioSignal, AcquisitionError> {
        if self.decoders.is_empty() {
            return Err(AcquisitionError::NoDecoders);
        }
        let input = EncodedAudio::load(source)?;

        let mut attempts = Vec::with_capacity(self.decoders.len());
        for decoder in &self.decoders {
            match decoder
                .decode(&input)
                .and_then(|signal| conform_rate(signal, TARGET_SAMPLE_RATE))
            {
                Ok(signal) => {
                    info!(
                        decoder = decoder.name(),
                        source = %input.name,
                        samples = signal.samples.len(),
                        "audio acquired"
                    );
                    return Ok(signal);
                }
                Err(err) => {
                    debug!(decoder = decoder.name(), error = %err, "decoder failed");
                    attempts.push(DecoderFailure {
                        decoder: decoder.name(),
                        message: format!("{:#}", err),
                    });
                }
            }
        }

        error!(source = %input.name, "every decoder in the chain failed");
        Err(AcquisitionError::AllDecodersFailed {
            source_name: input.name,
            attempts,
        })
    }
}

/// Resample to `target_rate` when needed.
pub fn conform_rate(signal: AudioSignal, target_rate: u32) -> Result<AudioSignal> {
    if signal.sample_rate == target_rate {
        return Ok(signal);
    }
    let samples = sinc_resample(&signal.samples, signal.sample_rate, target_rate)?;
    ensure!(!samples.is_empty(), "resampling produced no samples");
    Ok(AudioSignal::mono(samples, target_rate))
}
