use std::f32::consts::PI;
use std::path::Path;

use anyhow::Result;
use voice_biomarkers::errors::AcquisitionError;
use voice_biomarkers::{
    AudioSignal, AudioSource, BiomarkerPipeline, ExtractionError, ExtractorConfig, FeatureValue,
};

const SAMPLE_RATE: u32 = 16_000;

fn harmonic_tone(frequency: f32, duration_secs: f32) -> Vec<f32> {
    let total = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..total)
        .map(|index| {
            let t = index as f32 / SAMPLE_RATE as f32;
            (1..=3)
                .map(|h| (0.4 / h as f32) * (2.0 * PI * frequency * h as f32 * t).sin())
                .sum()
        })
        .collect()
}

fn padded(samples: Vec<f32>, pad_secs: f32) -> Vec<f32> {
    let pad = vec![0.0; (SAMPLE_RATE as f32 * pad_secs) as usize];
    let mut out = pad.clone();
    out.extend(samples);
    out.extend(pad);
    out
}

fn write_wav(path: &Path, samples: &[f32]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

fn sorted_keys(record: &voice_biomarkers::FeatureRecord) -> Vec<String> {
    record.keys().map(String::from).collect()
}

#[test]
fn recovers_fundamental_of_padded_tone_from_wav() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tone.wav");
    write_wav(&path, &padded(harmonic_tone(440.0, 2.0), 0.5))?;

    let pipeline = BiomarkerPipeline::new(ExtractorConfig::default());
    let record = pipeline.extract(&AudioSource::from_path(&path))?;

    let f0 = record.number("f0_mean").unwrap_or_default();
    assert!((f0 - 440.0).abs() < 10.0, "f0_mean {}", f0);
    assert_eq!(record.number("clipping_ratio"), Some(0.0));
    Ok(())
}

#[test]
fn key_set_is_independent_of_length_and_quality() -> Result<()> {
    let pipeline = BiomarkerPipeline::new(ExtractorConfig::default());

    let clean = pipeline.extract_signal(AudioSignal::mono(
        padded(harmonic_tone(180.0, 2.5), 0.3),
        SAMPLE_RATE,
    ))?;

    let harsh: Vec<f32> = harmonic_tone(250.0, 0.4)
        .into_iter()
        .map(|s| (s * 6.0).clamp(-1.0, 1.0))
        .collect();
    let degraded = pipeline.extract_signal(AudioSignal::mono(harsh, SAMPLE_RATE))?;

    let silent = pipeline.extract_signal(AudioSignal::mono(vec![0.0; 8_000], SAMPLE_RATE))?;

    assert_eq!(sorted_keys(&clean), sorted_keys(&degraded));
    assert_eq!(sorted_keys(&clean), sorted_keys(&silent));
    assert!(clean.len() > 300);
    Ok(())
}

#[test]
fn corrupt_bytes_exhaust_every_decoder() {
    let pipeline = BiomarkerPipeline::new(ExtractorConfig::default());
    let garbage: Vec<u8> = (0..4_096u32).map(|i| (i * 37 % 251) as u8).collect();

    for data in [garbage, Vec::new()] {
        let source = AudioSource::from_bytes(data, Some("webm"));
        match pipeline.extract(&source) {
            Err(ExtractionError::Acquisition(AcquisitionError::AllDecodersFailed {
                attempts,
                ..
            })) => assert_eq!(attempts.len(), 3),
            other => panic!("expected acquisition failure, got {:?}", other.map(|r| r.len())),
        }
    }
}

#[test]
fn silent_recording_is_one_long_pause() -> Result<()> {
    let pipeline = BiomarkerPipeline::new(ExtractorConfig::default());
    let record =
        pipeline.extract_signal(AudioSignal::mono(vec![0.0; 2 * SAMPLE_RATE as usize], SAMPLE_RATE))?;

    assert_eq!(record.number("pause_frequency"), Some(1.0));
    let total = record.number("pause_duration_total").unwrap_or_default();
    assert!((total - 2.0).abs() < 0.05, "pause total {}", total);
    assert_eq!(record.number("f0_mean"), Some(0.0));
    assert_eq!(record.number("hnr_anomaly_flag"), Some(1.0));

    match record.get("degraded_branches") {
        Some(FeatureValue::List(branches)) => {
            assert!(branches.iter().any(|b| b == "perturbation"));
            assert!(branches.iter().any(|b| b == "harmonicity"));
        }
        other => panic!("degraded_branches missing: {:?}", other),
    }
    Ok(())
}

#[test]
fn record_serializes_to_flat_json() -> Result<()> {
    let pipeline = BiomarkerPipeline::new(ExtractorConfig::default());
    let record = pipeline.extract_signal(AudioSignal::mono(harmonic_tone(200.0, 1.2), SAMPLE_RATE))?;
    let json = serde_json::to_value(&record)?;
    let object = json.as_object().expect("record is a JSON object");
    assert_eq!(object["feature_version"], "v1.3");
    assert_eq!(object["preprocessing_chain"][4], "bandpass_80_4000");
    assert!(object.values().all(|v| !v.is_object()));
    Ok(())
}
