use std::f32::consts::PI;
use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn write_tone(path: &Path, frequency: f32, seconds: f32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for n in 0..(16_000.0 * seconds) as usize {
        let t = n as f32 / 16_000.0;
        let value = 0.3 * (2.0 * PI * frequency * t).sin() + 0.1 * (4.0 * PI * frequency * t).sin();
        writer.write_sample((value * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("voice-biomarkers").unwrap();
    cmd.env("RUST_LOG", "warn");
    cmd
}

#[test]
fn prints_versioned_record_for_wav() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("sustained_a.wav");
    write_tone(&input, 150.0, 1.5);

    cli()
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"feature_version\":\"v1.3\""))
        .stdout(predicate::str::contains("\"jitter_local\""));
}

#[test]
fn rejects_disallowed_extension() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("notes.txt");
    fs::write(&input, b"not audio").unwrap();

    cli()
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported audio format"));
}

#[test]
fn corrupt_recording_reports_decoder_exhaustion() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("broken.wav");
    let garbage: Vec<u8> = (0..2_048u32).map(|i| (i * 37 % 251) as u8).collect();
    fs::write(&input, garbage).unwrap();

    cli()
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("all decoders failed"));
}

#[test]
fn missing_input_fails_validation() {
    cli()
        .arg("/no/such/recording.wav")
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn output_flag_writes_submission() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("p01.wav");
    let output = dir.path().join("out").join("p01.json");
    write_tone(&input, 120.0, 1.2);

    cli()
        .arg(&input)
        .args(["--profile", "legacy", "--parallel"])
        .arg("--output")
        .arg(&output)
        .args(["--subject", "P-01", "--age", "64", "--label", "pd"])
        .assert()
        .success();

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(written["subject_id"], "P-01");
    assert_eq!(written["metadata"]["age"], 64);
    assert_eq!(written["metadata"]["clinical_label"], "pd");
    assert_eq!(written["features"]["feature_version"], "v1.3");
}
