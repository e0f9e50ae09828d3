#![cfg(unix)]

mod support;

use std::fs;

use fitvid_core::error::AppError;
use fitvid_core::ffmpeg::PassLogFiles;
use fitvid_core::{CompressOutcome, SpeedPreference};
use serial_test::serial;
use support::{
    CompressEnv, FakeEncoder, assert_progress_well_formed, metadata, value_after,
};

fn collect_progress(
    env: &CompressEnv,
    request: &fitvid_core::CompressionRequest,
) -> (Result<CompressOutcome, AppError>, Vec<(f64, String)>) {
    let mut reports = Vec::new();
    let result = env
        .compressor
        .compress(request, &mut |p: f64, d: &str| reports.push((p, d.to_string())));
    (result, reports)
}

#[test]
#[serial]
fn two_pass_encode_writes_output_and_removes_pass_logs() {
    let env = CompressEnv::new(FakeEncoder::default(), metadata(100.0, 60.0, true));
    let request = env.request("holiday.mov", 8.0);

    let (result, reports) = collect_progress(&env, &request);
    let outcome = result.expect("encode");

    let expected = env.output_dir().join("holiday_compressed.mp4");
    assert_eq!(outcome.path(), expected.as_path());
    assert!(!outcome.is_reused());
    assert_eq!(
        fs::read_to_string(&expected).expect("output"),
        "fake mp4 payload"
    );
    assert!(
        env.pass_log_leftovers().is_empty(),
        "leftovers: {:?}",
        env.pass_log_leftovers()
    );

    assert_progress_well_formed(&reports);
    let values: Vec<f64> = reports.iter().map(|(p, _)| *p).collect();
    for expected in [0.0625, 0.125, 0.25, 0.4375, 0.625] {
        assert!(values.contains(&expected), "missing {} in {:?}", expected, values);
    }
    assert_eq!(reports.last(), Some(&(1.0, "Done".to_string())));
    assert!(reports.iter().any(|(_, d)| d == "Encoding pass 1/2..."));
    assert!(reports.iter().any(|(_, d)| d == "Encoding pass 2/2..."));
}

#[test]
#[serial]
fn encoder_arguments_follow_two_pass_contract() {
    let env = CompressEnv::new(FakeEncoder::default(), metadata(100.0, 60.0, true));
    let request = env.request("clip.mp4", 8.0);
    env.compressor
        .compress(&request, &mut |_: f64, _: &str| {})
        .expect("encode");

    let calls = env.encoder_calls();
    assert_eq!(calls.len(), 2);
    let (pass1, pass2) = (&calls[0], &calls[1]);
    let prefix = PassLogFiles::for_input(&env.output_dir(), "clip");
    let prefix = prefix.prefix().to_string_lossy().to_string();
    let input = env.path("clip.mp4").to_string_lossy().to_string();

    for (args, pass) in [(pass1, "1"), (pass2, "2")] {
        assert_eq!(
            &args[..5],
            &["-hide_banner", "-nostdin", "-y", "-i", input.as_str()]
        );
        assert_eq!(value_after(args, "-c:v"), Some("libx264"));
        assert_eq!(value_after(args, "-preset"), Some("slow"));
        assert_eq!(value_after(args, "-b:v"), Some("878632"));
        assert_eq!(value_after(args, "-maxrate"), Some("1317948"));
        assert_eq!(value_after(args, "-bufsize"), Some("1757264"));
        assert_eq!(value_after(args, "-pass"), Some(pass));
        assert_eq!(value_after(args, "-passlogfile"), Some(prefix.as_str()));
        assert!(!args.contains(&"-ss".to_string()));
    }

    assert_eq!(value_after(pass1, "-f"), Some("mp4"));
    assert!(pass1.contains(&"-an".to_string()));
    assert_eq!(pass1.last().map(String::as_str), Some("/dev/null"));

    assert_eq!(value_after(pass2, "-c:a"), Some("aac"));
    assert_eq!(value_after(pass2, "-b:a"), Some("128000"));
    assert_eq!(value_after(pass2, "-movflags"), Some("+faststart"));
    let output = env.output_dir().join("clip_compressed.mp4");
    assert_eq!(
        pass2.last().map(String::as_str),
        Some(output.to_string_lossy().as_ref())
    );
}

#[test]
#[serial]
fn alternate_codec_uses_x265_stats_and_cleans_up() {
    let env = CompressEnv::new(FakeEncoder::default(), metadata(100.0, 60.0, true));
    let mut request = env.request("clip.mp4", 8.0);
    request.use_alternate_codec = true;
    request.speed_preference = SpeedPreference::Speed;
    env.compressor
        .compress(&request, &mut |_: f64, _: &str| {})
        .expect("encode");

    let calls = env.encoder_calls();
    assert_eq!(calls.len(), 2);
    let stats = PassLogFiles::for_input(&env.output_dir(), "clip").stats_file();
    for (args, pass) in [(&calls[0], 1), (&calls[1], 2)] {
        assert_eq!(value_after(args, "-c:v"), Some("libx265"));
        assert_eq!(value_after(args, "-tag:v"), Some("hvc1"));
        assert_eq!(value_after(args, "-preset"), Some("veryfast"));
        assert_eq!(
            value_after(args, "-x265-params"),
            Some(format!("pass={}:stats={}", pass, stats.display()).as_str())
        );
    }
    assert!(env.pass_log_leftovers().is_empty());
}

#[test]
#[serial]
fn trimmed_encode_scales_progress_to_trim_duration() {
    let env = CompressEnv::new(FakeEncoder::default(), metadata(100.0, 60.0, false));
    let mut request = env.request("clip.mp4", 8.0);
    request.start_seconds = Some(10.0);
    request.end_seconds = Some(40.0);

    let (result, reports) = collect_progress(&env, &request);
    let outcome = result.expect("encode");
    let plan = outcome.plan().expect("plan");
    assert_eq!(plan.target_duration, 30.0);
    assert_eq!(plan.audio_bitrate_bps, 0);

    let calls = env.encoder_calls();
    for args in &calls {
        assert_eq!(value_after(args, "-ss"), Some("10.000"));
        assert_eq!(value_after(args, "-to"), Some("40.000"));
    }
    assert!(calls[1].contains(&"-an".to_string()));
    assert!(!calls[1].contains(&"-c:a".to_string()));

    // time=00:00:15 is half of a 30 s pass.
    let values: Vec<f64> = reports.iter().map(|(p, _)| *p).collect();
    assert!(values.contains(&0.125), "{:?}", values);
    assert!(values.contains(&0.625), "{:?}", values);
    assert_progress_well_formed(&reports);
}

#[test]
#[serial]
fn removed_audio_disables_audio_in_final_pass() {
    let env = CompressEnv::new(FakeEncoder::default(), metadata(100.0, 60.0, true));
    let mut request = env.request("clip.mp4", 8.0);
    request.remove_audio = true;
    env.compressor
        .compress(&request, &mut |_: f64, _: &str| {})
        .expect("encode");
    let calls = env.encoder_calls();
    assert!(calls[1].contains(&"-an".to_string()));
    assert_eq!(value_after(&calls[1], "-b:a"), None);
}

#[test]
#[serial]
fn invalid_argument_failure_carries_tail_and_leaves_no_artifacts() {
    let env = CompressEnv::new(
        FakeEncoder::failing(1, 2, "Error parsing options: Invalid argument"),
        metadata(100.0, 60.0, true),
    );
    let request = env.request("clip.mp4", 8.0);
    let (result, reports) = collect_progress(&env, &request);

    match result {
        Err(AppError::EncodeFailure { pass, code, tail }) => {
            assert_eq!(pass, 1);
            assert_eq!(code, 2);
            assert!(tail.contains("Invalid argument"), "tail: {}", tail);
        }
        other => panic!("expected EncodeFailure, got {:?}", other),
    }
    assert_eq!(env.encoder_calls().len(), 1, "pass 2 must not run");
    assert!(env.pass_log_leftovers().is_empty());
    assert!(!env.output_dir().join("clip_compressed.mp4").exists());
    assert_progress_well_formed(&reports);
    assert!(reports.iter().all(|(p, _)| *p < 1.0));
}

#[test]
#[serial]
fn final_pass_failure_removes_partial_output() {
    let env = CompressEnv::new(
        FakeEncoder::failing(2, 1, "Conversion failed!"),
        metadata(100.0, 60.0, true),
    );
    let request = env.request("clip.mp4", 8.0);
    let (result, _) = collect_progress(&env, &request);

    let err = result.expect_err("pass 2 fails");
    assert!(matches!(err, AppError::EncodeFailure { pass: 2, code: 1, .. }));
    assert_eq!(err.summary(), "FFmpeg failed.");
    assert_eq!(env.encoder_calls().len(), 2);
    assert!(!env.output_dir().join("clip_compressed.mp4").exists());
    assert!(env.pass_log_leftovers().is_empty());
}

#[test]
#[serial]
fn stale_pass_logs_are_removed() {
    let env = CompressEnv::new(FakeEncoder::default(), metadata(100.0, 60.0, true));
    let files = PassLogFiles::for_input(&env.output_dir(), "clip");
    let stale: Vec<_> = files
        .artifacts()
        .into_iter()
        .filter(|p| p.to_string_lossy().ends_with(".cutree"))
        .collect();
    assert_eq!(stale.len(), 1);
    fs::write(&stale[0], b"left over from a crash").unwrap();

    env.compressor
        .compress(&env.request("clip.mp4", 8.0), &mut |_: f64, _: &str| {})
        .expect("encode");
    assert!(env.pass_log_leftovers().is_empty());
}

#[test]
#[serial]
fn small_source_is_reused_without_invoking_encoder() {
    let env = CompressEnv::new(FakeEncoder::default(), metadata(5.0, 60.0, true));
    let request = env.request("clip.mp4", 8.0);
    let (result, reports) = collect_progress(&env, &request);

    let outcome = result.expect("shortcut");
    assert_eq!(
        outcome,
        CompressOutcome::Reused {
            path: env.path("clip.mp4")
        }
    );
    assert!(env.encoder_calls().is_empty());
    assert_eq!(reports.last().map(|(p, _)| *p), Some(1.0));
}

#[test]
#[serial]
fn trimming_a_small_source_still_encodes() {
    let env = CompressEnv::new(FakeEncoder::default(), metadata(5.0, 60.0, true));
    let mut request = env.request("clip.mp4", 8.0);
    request.end_seconds = Some(30.0);
    let outcome = env
        .compressor
        .compress(&request, &mut |_: f64, _: &str| {})
        .expect("encode");
    assert!(!outcome.is_reused());
    assert_eq!(env.encoder_calls().len(), 2);
}

#[test]
#[serial]
fn inverted_range_fails_before_any_process_runs() {
    let env = CompressEnv::new(FakeEncoder::default(), metadata(100.0, 60.0, true));
    let mut request = env.request("clip.mp4", 8.0);
    request.start_seconds = Some(10.0);
    request.end_seconds = Some(5.0);
    let (result, _) = collect_progress(&env, &request);

    assert!(matches!(
        result,
        Err(AppError::InvalidRange { start, end }) if start == 10.0 && end == 5.0
    ));
    assert_eq!(
        env.probe_calls.load(std::sync::atomic::Ordering::SeqCst),
        0
    );
    assert!(env.encoder_calls().is_empty());
}
