use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::{info, warn};

use crate::{
    core::{
        audio::{read_audio, write_wav},
        engine::{apply_model, ModelProvider, OrtProvider, StemModel},
        resample::normalize_rate,
        stage::{AtStage, Severity, Stage, StageError},
    },
    error::{Result, StemError},
    io::progress::{emit_split_progress, SplitProgress},
    types::{
        RateMismatchPolicy, SeparationResult, SplitOptions, SplitReport, StemOutcome,
        MODEL_SAMPLE_RATE,
    },
};

/// Creates `dir` (and parents) if needed and returns its absolute path.
pub fn resolve_output_dir(dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    Ok(fs::canonicalize(dir)?)
}

/// Splits `input` with the ONNX model named in `opts`.
pub fn split_file<P: AsRef<Path>>(
    input: P,
    opts: &SplitOptions,
) -> std::result::Result<SplitReport, StageError> {
    let provider = OrtProvider::new(opts.manifest_url_override.clone());
    split_file_with(input, opts, &provider)
}

/// Resolve output, load, normalize, separate, write.
///
/// The first fatal stage failure is returned. Stem write failures are
/// recorded in the report and the remaining stems are still written.
pub fn split_file_with<P, M>(
    input: P,
    opts: &SplitOptions,
    provider: &M,
) -> std::result::Result<SplitReport, StageError>
where
    P: AsRef<Path>,
    M: ModelProvider + ?Sized,
{
    let input = input.as_ref();

    emit_split_progress(SplitProgress::Stage(Stage::ResolveOutput));
    let output_dir = resolve_output_dir(&opts.output_dir).at(Stage::ResolveOutput)?;

    emit_split_progress(SplitProgress::Stage(Stage::LoadAudio));
    let audio = read_audio(input).at(Stage::LoadAudio)?;
    info!(
        "loaded {}: {} Hz, {} channels, {} frames",
        input.display(),
        audio.sample_rate,
        audio.channels(),
        audio.frames()
    );
    emit_split_progress(SplitProgress::AudioLoaded {
        sample_rate: audio.sample_rate,
        channels: audio.channels(),
        frames: audio.frames(),
    });

    emit_split_progress(SplitProgress::Stage(Stage::NormalizeRate));
    if audio.sample_rate != MODEL_SAMPLE_RATE && opts.on_rate_mismatch == RateMismatchPolicy::Resample
    {
        emit_split_progress(SplitProgress::Resampling {
            from: audio.sample_rate,
            to: MODEL_SAMPLE_RATE,
        });
    }
    let audio = normalize_rate(audio, opts.on_rate_mismatch).at(Stage::NormalizeRate)?;

    emit_split_progress(SplitProgress::Stage(Stage::LoadModel));
    let mut model = provider
        .load_model(&opts.model_name)
        .at(Stage::LoadModel)?;
    if model.sample_rate() != MODEL_SAMPLE_RATE {
        return Err(StageError::new(
            Stage::LoadModel,
            StemError::Model(format!(
                "model `{}` runs at {} Hz, expected {} Hz",
                opts.model_name,
                model.sample_rate(),
                MODEL_SAMPLE_RATE
            )),
        ));
    }

    emit_split_progress(SplitProgress::Stage(Stage::Separate));
    let result = apply_model(&mut model, &audio).at(Stage::Separate)?;
    drop(model);

    emit_split_progress(SplitProgress::Stage(Stage::WriteStem));
    let stems = write_stems(&result, &output_dir)?;

    let report = SplitReport {
        output_dir,
        sample_rate: audio.sample_rate,
        channels: audio.channels(),
        frames: audio.frames(),
        stems,
    };

    emit_split_progress(SplitProgress::Finished {
        written: report.written(),
        failed: report.failed(),
    });
    Ok(report)
}

/// Writes every stem to `{dir}/{label}.wav`, one independent attempt each.
pub fn write_stems(
    result: &SeparationResult,
    dir: &Path,
) -> std::result::Result<Vec<StemOutcome>, StageError> {
    let mut outcomes = Vec::with_capacity(4);

    for (stem, waveform) in result.iter() {
        let path = dir.join(stem.file_name());

        match write_wav(&path, waveform).at(Stage::WriteStem) {
            Ok(()) => {
                info!("saved {} to {}", stem, path.display());
                emit_split_progress(SplitProgress::StemWritten {
                    stem,
                    path: path.clone(),
                });
                outcomes.push(StemOutcome {
                    stem,
                    path,
                    error: None,
                });
            }
            Err(e) if e.severity() == Severity::Recoverable => {
                let error = e.source.to_string();
                warn!("failed to save {}: {}", stem, error);
                emit_split_progress(SplitProgress::StemFailed {
                    stem,
                    path: path.clone(),
                    error: error.clone(),
                });
                outcomes.push(StemOutcome {
                    stem,
                    path,
                    error: Some(error),
                });
            }
            Err(e) => return Err(e),
        }
    }

    Ok(outcomes)
}
