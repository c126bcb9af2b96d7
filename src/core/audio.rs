use std::{fs::File, path::Path};

use hound::{SampleFormat, WavSpec, WavWriter};
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, warn};

use crate::{
    error::{Result, StemError},
    types::Waveform,
};

/// Decodes any container/codec symphonia knows into a planar waveform.
pub fn read_audio<P: AsRef<Path>>(path: P) -> Result<Waveform> {
    let path: &Path = path.as_ref();

    let file: File = File::open(path).map_err(|source| StemError::AudioOpen {
        path: path.to_path_buf(),
        source,
    })?;

    let decode_err = |reason: String| StemError::AudioDecode {
        path: path.to_path_buf(),
        reason,
    };

    let mss: MediaSourceStream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint: Hint = Hint::new();

    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| decode_err(e.to_string()))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| decode_err("no audio track found".into()))?;
    let track_id = track.id;

    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_err(e.to_string()))?;

    let mut interleaved: Vec<f32> = Vec::new();
    let mut sample_rate: u32 = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels: usize = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(0);
    let mut buffer: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(decode_err(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("skipping undecodable packet in {}: {}", path.display(), e);
                continue;
            }
            Err(e) => return Err(decode_err(e.to_string())),
        };

        sample_rate = decoded.spec().rate;
        channels = decoded.spec().channels.count();

        let needed = decoded.capacity();
        if buffer.as_ref().map_or(true, |b| b.capacity() < needed) {
            buffer = Some(SampleBuffer::<f32>::new(needed as u64, *decoded.spec()));
        }
        if let Some(buf) = buffer.as_mut() {
            buf.copy_interleaved_ref(decoded);
            interleaved.extend_from_slice(buf.samples());
        }
    }

    if channels == 0 || sample_rate == 0 || interleaved.is_empty() {
        return Err(decode_err("no audio frames decoded".into()));
    }

    let waveform = Waveform::from_interleaved(&interleaved, channels, sample_rate);

    debug!(
        "read {}: sample_rate={}, channels={}, frames={}",
        path.display(),
        waveform.sample_rate,
        waveform.channels(),
        waveform.frames()
    );

    Ok(waveform)
}

/// Writes `audio` as 32-bit float WAV at its own sample rate.
pub fn write_wav<P: AsRef<Path>>(path: P, audio: &Waveform) -> Result<()> {
    let path = path.as_ref();
    let write_err = |e: hound::Error| StemError::StemWrite {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let spec = WavSpec {
        channels: audio.channels() as u16,
        sample_rate: audio.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec).map_err(write_err)?;
    for frame in audio.samples.columns() {
        for &sample in frame {
            writer.write_sample(sample).map_err(write_err)?;
        }
    }

    writer.finalize().map_err(write_err)?;
    Ok(())
}

/// Writes interleaved 16-bit PCM; used for fixtures and exports that need
/// integer WAV.
pub fn write_wav_pcm16<P: AsRef<Path>>(path: P, audio: &Waveform) -> Result<()> {
    let path = path.as_ref();
    let write_err = |e: hound::Error| StemError::StemWrite {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let spec = WavSpec {
        channels: audio.channels() as u16,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec).map_err(write_err)?;
    for sample in audio.to_interleaved() {
        let s = (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        writer.write_sample(s).map_err(write_err)?;
    }

    writer.finalize().map_err(write_err)?;
    Ok(())
}
