//! Audio file playback to system speakers via cpal.
//!
//! Cue sources are local audio files decoded with symphonia. Decoding and
//! the output stream both live on a blocking thread; the stream is polled
//! every 10 ms for completion or cancellation. A cue preempted while it is
//! still decoding never opens a stream.

use super::sink::{AudioSink, CueRef, PlaybackOutcome};
use crate::config::AudioConfig;
use crate::error::{BellError, Result};
use async_trait::async_trait;
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Plays cue files on the configured output device.
#[derive(Debug, Clone, Default)]
pub struct CpalSink {
    output_device: Option<String>,
}

impl CpalSink {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            output_device: config.output_device.clone(),
        }
    }

    /// List available output devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| BellError::Audio(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }
}

#[async_trait]
impl AudioSink for CpalSink {
    async fn start(&self, cue: &CueRef, volume: f32, cancel: CancellationToken) -> PlaybackOutcome {
        let device_name = self.output_device.clone();
        let source = cue.source.clone();

        let joined = tokio::task::spawn_blocking(move || {
            render(device_name.as_deref(), Path::new(&source), volume, &cancel)
        })
        .await;

        match joined {
            Ok(Ok(())) => PlaybackOutcome::Completed,
            Ok(Err(e)) => PlaybackOutcome::Failed(e.to_string()),
            Err(e) => PlaybackOutcome::Failed(format!("playback thread failed: {e}")),
        }
    }
}

/// Decoded interleaved samples.
struct Clip {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

fn open_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    let device = if let Some(name) = name {
        host.output_devices()
            .map_err(|e| BellError::Audio(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| BellError::Audio(format!("output device '{name}' not found")))?
    } else {
        host.default_output_device()
            .ok_or_else(|| BellError::Audio("no default output device".into()))?
    };

    let device_name = device
        .description()
        .map(|d| d.name().to_owned())
        .unwrap_or_else(|_| "<unknown>".into());
    info!("using output device: {device_name}");
    Ok(device)
}

/// Decode `source` and play it, unless `cancel` fires first.
fn render(
    device_name: Option<&str>,
    source: &Path,
    volume: f32,
    cancel: &CancellationToken,
) -> Result<()> {
    let clip = decode_file(source)?;
    if cancel.is_cancelled() {
        debug!("{} cancelled before playback", source.display());
        return Ok(());
    }
    play_blocking(device_name, &clip, volume, cancel)
}

/// Play `clip` and block until it ends or `cancel` fires.
fn play_blocking(
    device_name: Option<&str>,
    clip: &Clip,
    volume: f32,
    cancel: &CancellationToken,
) -> Result<()> {
    let device = open_device(device_name)?;
    let stream_config = StreamConfig {
        channels: clip.channels,
        sample_rate: clip.sample_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let gain = volume.clamp(0.0, 1.0);
    let buffer = Arc::new(Mutex::new(PlaybackBuffer {
        samples: clip.samples.iter().map(|s| s * gain).collect(),
        position: 0,
        finished: false,
    }));
    let buffer_clone = Arc::clone(&buffer);

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let mut buf = match buffer_clone.lock() {
                    Ok(b) => b,
                    Err(_) => return,
                };

                for sample in data.iter_mut() {
                    if buf.position < buf.samples.len() {
                        *sample = buf.samples[buf.position];
                        buf.position += 1;
                    } else {
                        *sample = 0.0;
                        buf.finished = true;
                    }
                }
            },
            move |err| {
                error!("audio output stream error: {err}");
            },
            None,
        )
        .map_err(|e| BellError::Playback(format!("failed to build output stream: {e}")))?;

    if cancel.is_cancelled() {
        return Ok(());
    }
    stream
        .play()
        .map_err(|e| BellError::Playback(format!("failed to start output stream: {e}")))?;

    loop {
        if cancel.is_cancelled() {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
        let buf = buffer
            .lock()
            .map_err(|e| BellError::Playback(format!("playback buffer lock poisoned: {e}")))?;
        if buf.finished {
            break;
        }
    }

    drop(stream);
    Ok(())
}

/// Decode an audio file to interleaved f32 samples.
fn decode_file(path: &Path) -> Result<Clip> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::errors::Error as SymphError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let file = std::fs::File::open(path)
        .map_err(|e| BellError::Playback(format!("cannot open {}: {e}", path.display())))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| BellError::Playback(format!("unrecognized audio format: {e}")))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| BellError::Playback("no default audio track".into()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| BellError::Playback("unknown sample rate".into()))?;
    let channels = codec_params
        .channels
        .map(|c| u16::try_from(c.count()).unwrap_or(2))
        .unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| BellError::Playback(format!("failed to create decoder: {e}")))?;

    let mut samples: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(BellError::Playback(format!("audio read error: {e}"))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphError::DecodeError(_)) => continue,
            Err(e) => return Err(BellError::Playback(format!("audio decode error: {e}"))),
        };

        let spec = *decoded.spec();
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    if samples.is_empty() {
        return Err(BellError::Playback(format!(
            "{} decoded to no audio",
            path.display()
        )));
    }

    Ok(Clip {
        samples,
        sample_rate,
        channels,
    })
}

/// Internal buffer for tracking playback progress.
struct PlaybackBuffer {
    samples: Vec<f32>,
    position: usize,
    finished: bool,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn missing_file_is_a_playback_error() {
        let err = match decode_file(Path::new("/nonexistent/workbell/chime.mp3")) {
            Err(e) => e,
            Ok(_) => panic!("decoding a missing file must fail"),
        };
        assert!(matches!(err, BellError::Playback(_)));
    }

    /// 16-bit mono PCM WAV holding `frames` samples of a ramp.
    fn write_wav(path: &Path, frames: u32) {
        let rate: u32 = 8_000;
        let data_len = frames * 2;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&rate.to_le_bytes());
        bytes.extend_from_slice(&(rate * 2).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for i in 0..frames {
            let sample = ((i % 64) as i16 - 32) * 512;
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn wav_decodes_to_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chime.wav");
        write_wav(&path, 800);

        let clip = decode_file(&path).unwrap();
        assert_eq!(clip.sample_rate, 8_000);
        assert_eq!(clip.channels, 1);
        assert_eq!(clip.samples.len(), 800);
    }

    #[test]
    fn cue_cancelled_during_decode_never_opens_a_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chime.wav");
        write_wav(&path, 800);

        let cancel = CancellationToken::new();
        cancel.cancel();
        // A device name that cannot exist: reaching the device would fail.
        let result = render(Some("workbell-no-such-device"), &path, 0.5, &cancel);
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn missing_file_reports_failed_outcome() {
        let sink = CpalSink::default();
        let outcome = sink
            .start(
                &CueRef::new("Chime", "/nonexistent/workbell/chime.mp3"),
                0.5,
                CancellationToken::new(),
            )
            .await;
        assert!(matches!(outcome, PlaybackOutcome::Failed(_)));
    }
}
