use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

/// Format used for silence when no narrated clip is available to copy from.
pub const DEFAULT_SILENCE_SPEC: WavSpec = WavSpec {
    channels: 1,
    sample_rate: 22_050,
    bits_per_sample: 16,
    sample_format: SampleFormat::Int,
};

pub fn wav_duration_seconds(path: &Path) -> Result<f64, hound::Error> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let samples = reader.len();
    let frames = samples as f64 / spec.channels as f64;
    let duration = frames / spec.sample_rate as f64;
    Ok(duration)
}

pub fn wav_spec(path: &Path) -> Result<WavSpec, hound::Error> {
    Ok(WavReader::open(path)?.spec())
}

/// Write `duration` seconds of digital silence.
///
/// Non-16-bit specs are written as 16-bit PCM with the same rate and channel count,
/// which is enough for the concat demuxer.
pub fn write_silence_wav(path: &Path, duration: f64, spec: WavSpec) -> Result<(), hound::Error> {
    let spec = WavSpec {
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
        ..spec
    };
    let frames = (duration.max(0.01) * spec.sample_rate as f64).round() as u64;
    let mut writer = WavWriter::create(path, spec)?;
    for _ in 0..frames * spec.channels as u64 {
        writer.write_sample(0i16)?;
    }
    writer.finalize()
}
