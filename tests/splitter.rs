mod common;

use common::{files_in, write_tone, Exploding, Provide, Rate48k, ScaledCopies, ThreeStems, Unavailable};
use stem_splitter::{
    split_file_with, RateMismatchPolicy, SplitOptions, Stage, Stem, StemError, STEM_ORDER,
};
use tempfile::tempdir;

const ALL_STEMS: [&str; 4] = ["bass.wav", "drums.wav", "other.wav", "vocals.wav"];

#[test]
fn writes_four_stems_for_stereo_input() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("song.wav");
    let source = write_tone(&input, 44_100, 2, 1.5);
    let out = dir.path().join("stems");

    let opts = SplitOptions::default().output_dir(&out);
    let report = split_file_with(&input, &opts, &Provide(ScaledCopies)).expect("split failed");

    assert_eq!(files_in(&out), ALL_STEMS);
    assert_eq!(report.written(), 4);
    assert_eq!(report.failed(), 0);
    assert_eq!(report.sample_rate, 44_100);
    assert_eq!(report.channels, 2);
    assert_eq!(report.frames, source.frames());

    let order: Vec<Stem> = report.stems.iter().map(|o| o.stem).collect();
    assert_eq!(order, STEM_ORDER);

    for outcome in &report.stems {
        let reader = hound::WavReader::open(&outcome.path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 44_100);
        assert_eq!(spec.channels, 2);
        assert_eq!(reader.duration() as usize, source.frames());
    }
}

#[test]
fn stems_carry_the_model_output() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("song.wav");
    write_tone(&input, 44_100, 2, 0.5);
    let out = dir.path().join("stems");

    let opts = SplitOptions::default().output_dir(&out);
    let report = split_file_with(&input, &opts, &Provide(ScaledCopies)).unwrap();

    let loaded = stem_splitter::read_audio(&input).unwrap();
    let vocals = stem_splitter::read_audio(report.path_of(Stem::Vocals).unwrap()).unwrap();
    let drums = stem_splitter::read_audio(report.path_of(Stem::Drums).unwrap()).unwrap();

    for i in (0..loaded.frames()).step_by(997) {
        let x = loaded.samples[(0, i)];
        approx::assert_abs_diff_eq!(drums.samples[(0, i)], x * 0.1, epsilon = 1e-6);
        approx::assert_abs_diff_eq!(vocals.samples[(0, i)], x * 0.4, epsilon = 1e-6);
    }
}

#[test]
fn resamples_off_rate_input_by_default() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("low.wav");
    write_tone(&input, 22_050, 2, 3.0);
    let out = dir.path().join("stems");

    let opts = SplitOptions::default().output_dir(&out);
    let report = split_file_with(&input, &opts, &Provide(ScaledCopies)).unwrap();

    assert_eq!(report.sample_rate, 44_100);
    assert_eq!(report.frames, 132_300);
    for outcome in &report.stems {
        let reader = hound::WavReader::open(&outcome.path).unwrap();
        assert_eq!(reader.spec().sample_rate, 44_100);
        assert_eq!(reader.duration(), 132_300);
    }
}

#[test]
fn reject_policy_stops_before_writing() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("low.wav");
    write_tone(&input, 22_050, 2, 0.5);
    let out = dir.path().join("stems");

    let opts = SplitOptions::default()
        .output_dir(&out)
        .on_rate_mismatch(RateMismatchPolicy::Reject);
    let err = split_file_with(&input, &opts, &Provide(ScaledCopies)).unwrap_err();

    assert_eq!(err.stage, Stage::NormalizeRate);
    assert!(matches!(
        err.source,
        StemError::SampleRateMismatch {
            found: 22_050,
            expected: 44_100
        }
    ));
    assert!(out.is_dir());
    assert!(files_in(&out).is_empty());
}

#[test]
fn missing_input_is_a_load_failure() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("stems");

    let opts = SplitOptions::default().output_dir(&out);
    let err = split_file_with(dir.path().join("nope.wav"), &opts, &Provide(ScaledCopies))
        .unwrap_err();

    assert_eq!(err.stage, Stage::LoadAudio);
    assert!(err.to_string().starts_with("load_audio"), "{err}");
    assert!(files_in(&out).is_empty());
}

#[test]
fn undecodable_input_is_a_load_failure() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("notes.wav");
    std::fs::write(&input, "definitely not audio").unwrap();
    let out = dir.path().join("stems");

    let opts = SplitOptions::default().output_dir(&out);
    let err = split_file_with(&input, &opts, &Provide(ScaledCopies)).unwrap_err();

    assert_eq!(err.stage, Stage::LoadAudio);
    assert!(files_in(&out).is_empty());
}

#[test]
fn unavailable_model_fails_at_model_load() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("song.wav");
    write_tone(&input, 44_100, 2, 0.25);
    let out = dir.path().join("stems");

    let opts = SplitOptions::default().output_dir(&out).model("ghost");
    let err = split_file_with(&input, &opts, &Unavailable).unwrap_err();

    assert_eq!(err.stage, Stage::LoadModel);
    assert!(err.to_string().contains("ghost"), "{err}");
    assert!(files_in(&out).is_empty());
}

#[test]
fn model_at_another_rate_is_refused() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("song.wav");
    write_tone(&input, 44_100, 2, 0.25);
    let out = dir.path().join("stems");

    let opts = SplitOptions::default().output_dir(&out);
    let err = split_file_with(&input, &opts, &Provide(Rate48k)).unwrap_err();

    assert_eq!(err.stage, Stage::LoadModel);
    assert!(files_in(&out).is_empty());
}

#[test]
fn inference_failure_writes_nothing() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("song.wav");
    write_tone(&input, 44_100, 2, 0.25);
    let out = dir.path().join("stems");

    let opts = SplitOptions::default().output_dir(&out);
    let err = split_file_with(&input, &opts, &Provide(Exploding)).unwrap_err();

    assert_eq!(err.stage, Stage::Separate);
    assert!(matches!(err.source, StemError::Inference(_)));
    assert!(files_in(&out).is_empty());
}

#[test]
fn wrong_source_count_writes_nothing() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("song.wav");
    write_tone(&input, 44_100, 2, 0.25);
    let out = dir.path().join("stems");

    let opts = SplitOptions::default().output_dir(&out);
    let err = split_file_with(&input, &opts, &Provide(ThreeStems)).unwrap_err();

    assert_eq!(err.stage, Stage::Separate);
    assert!(matches!(err.source, StemError::OutputShape { .. }));
    assert!(files_in(&out).is_empty());
}

#[test]
fn one_unwritable_stem_does_not_stop_the_others() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("song.wav");
    write_tone(&input, 44_100, 2, 0.25);
    let out = dir.path().join("stems");
    std::fs::create_dir_all(out.join("bass.wav")).unwrap();

    let opts = SplitOptions::default().output_dir(&out);
    let report = split_file_with(&input, &opts, &Provide(ScaledCopies)).expect("partial write is not fatal");

    assert_eq!(report.written(), 3);
    assert_eq!(report.failed(), 1);

    let failed: Vec<Stem> = report
        .stems
        .iter()
        .filter(|o| !o.is_written())
        .map(|o| o.stem)
        .collect();
    assert_eq!(failed, vec![Stem::Bass]);
    assert!(report.path_of(Stem::Bass).is_none());

    for stem in [Stem::Drums, Stem::Other, Stem::Vocals] {
        let path = report.path_of(stem).expect("stem written");
        assert!(path.is_file(), "{} missing", path.display());
    }
    assert!(out.join("bass.wav").is_dir());
}

#[test]
fn rerunning_overwrites_with_identical_bytes() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("song.wav");
    write_tone(&input, 44_100, 2, 0.5);
    let out = dir.path().join("stems");

    let opts = SplitOptions::default().output_dir(&out);
    split_file_with(&input, &opts, &Provide(ScaledCopies)).unwrap();
    let first: Vec<Vec<u8>> = ALL_STEMS
        .iter()
        .map(|f| std::fs::read(out.join(f)).unwrap())
        .collect();

    split_file_with(&input, &opts, &Provide(ScaledCopies)).unwrap();
    let second: Vec<Vec<u8>> = ALL_STEMS
        .iter()
        .map(|f| std::fs::read(out.join(f)).unwrap())
        .collect();

    assert_eq!(first, second);
    assert_eq!(files_in(&out), ALL_STEMS);
}

#[test]
fn mono_input_gives_mono_stems() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("mono.wav");
    write_tone(&input, 44_100, 1, 0.5);
    let out = dir.path().join("stems");

    let opts = SplitOptions::default().output_dir(&out);
    let report = split_file_with(&input, &opts, &Provide(ScaledCopies)).unwrap();

    assert_eq!(report.channels, 1);
    for outcome in &report.stems {
        let reader = hound::WavReader::open(&outcome.path).unwrap();
        assert_eq!(reader.spec().channels, 1);
    }
}

#[test]
fn creates_nested_output_directory() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("song.wav");
    write_tone(&input, 44_100, 2, 0.25);
    let out = dir.path().join("a").join("b").join("c");

    let opts = SplitOptions::default().output_dir(&out);
    let report = split_file_with(&input, &opts, &Provide(ScaledCopies)).unwrap();

    assert!(report.output_dir.is_absolute());
    assert!(out.is_dir());
    assert_eq!(files_in(&out), ALL_STEMS);
}

#[test]
fn output_path_that_is_a_file_fails_first() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("song.wav");
    write_tone(&input, 44_100, 2, 0.25);
    let out = dir.path().join("taken");
    std::fs::write(&out, b"x").unwrap();

    let opts = SplitOptions::default().output_dir(&out);
    let err = split_file_with(&input, &opts, &Provide(ScaledCopies)).unwrap_err();

    assert_eq!(err.stage, Stage::ResolveOutput);
}
