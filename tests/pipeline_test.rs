//! End-to-end pipeline tests against stub engine binaries.
//!
//! The stubs stand in for ffmpeg/ffprobe: ffprobe prints a fixed JSON
//! stream description, ffmpeg logs its argument vector and writes a
//! marker byte sequence to its final argument (the output path), with
//! optional failure triggers keyed on argument substrings. This makes
//! every cascade path reachable deterministically, without real codecs.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use slidecast::config::Config;
use slidecast::media::{ExtractedStream, Rect};
use slidecast::transcode::{MediaProcessor, ProcessorOptions};
use slidecast_av::{ToolOverrides, ToolRegistry};

struct StubEngine {
    dir: tempfile::TempDir,
}

impl StubEngine {
    /// Build stub binaries. `probe_json` is what ffprobe prints;
    /// `fail_on` lists argument substrings that make ffmpeg exit 1.
    fn new(probe_json: &str, fail_on: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();

        let ffprobe = format!("#!/bin/sh\nprintf '%s' '{probe_json}'\n");
        write_script(&dir.path().join("ffprobe"), &ffprobe);

        let log = dir.path().join("ffmpeg.log");
        let mut triggers = String::new();
        for pattern in fail_on {
            triggers.push_str(&format!(
                "case \"$*\" in *{pattern}*) exit 1;; esac\n"
            ));
        }
        let ffmpeg = format!(
            "#!/bin/sh\n\
             printf '%s\\n' \"$*\" >> '{}'\n\
             {triggers}\
             for last in \"$@\"; do :; done\n\
             printf 'ENCODED' > \"$last\"\n\
             exit 0\n",
            log.display()
        );
        write_script(&dir.path().join("ffmpeg"), &ffmpeg);

        Self { dir }
    }

    fn registry(&self) -> ToolRegistry {
        ToolRegistry::discover(&ToolOverrides {
            ffmpeg_path: Some(self.dir.path().join("ffmpeg")),
            ffprobe_path: Some(self.dir.path().join("ffprobe")),
            timeout_secs: None,
        })
    }

    /// One entry per ffmpeg invocation, in order.
    fn invocations(&self) -> Vec<String> {
        fs::read_to_string(self.dir.path().join("ffmpeg.log"))
            .unwrap_or_default()
            .lines()
            .map(|l| l.to_string())
            .collect()
    }
}

/// A registry whose overrides point nowhere: no engine at all.
fn absent_registry() -> ToolRegistry {
    ToolRegistry::discover(&ToolOverrides {
        ffmpeg_path: Some(PathBuf::from("/nonexistent/ffmpeg")),
        ffprobe_path: Some(PathBuf::from("/nonexistent/ffprobe")),
        timeout_secs: None,
    })
}

fn write_script(path: &Path, content: &str) {
    fs::write(path, content).unwrap();
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).unwrap();
}

fn probe_json(codec: &str, width: u32, height: u32) -> String {
    format!(r#"{{"streams":[{{"width":{width},"height":{height},"codec_name":"{codec}"}}]}}"#)
}

/// Bytes that sniff as video/mp4.
fn mp4_bytes() -> Vec<u8> {
    let mut bytes = vec![0, 0, 0, 24];
    bytes.extend_from_slice(b"ftypisom");
    bytes.resize(256, 0x42);
    bytes
}

/// Bytes that sniff as video/webm.
fn webm_bytes() -> Vec<u8> {
    let mut bytes = vec![0x1A, 0x45, 0xDF, 0xA3, 0x01, 0x02];
    bytes.extend_from_slice(b"B\x82\x84webm");
    bytes.resize(256, 0x42);
    bytes
}

fn stream(bytes: Vec<u8>, hint: Option<&str>) -> ExtractedStream {
    ExtractedStream {
        bytes,
        page_index: 0,
        annot_index: 0,
        object_id: Some((7, 0)),
        content_type_hint: hint.map(|h| h.to_string()),
        rect: Rect::default(),
    }
}

fn processor(
    registry: &ToolRegistry,
    media_dir: PathBuf,
    options: ProcessorOptions,
) -> MediaProcessor {
    MediaProcessor::new(Config::default(), media_dir, registry, options)
}

fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn preferred_source_is_kept_untouched() {
    let engine = StubEngine::new(&probe_json("h264", 1280, 720), &[]);
    let out = tempfile::tempdir().unwrap();
    let media_dir = out.path().join("videos");
    let proc = processor(&engine.registry(), media_dir.clone(), ProcessorOptions::default());

    let input = mp4_bytes();
    let record = proc.process_item(&stream(input.clone(), None)).unwrap().unwrap();

    assert!(!record.transcoded);
    assert_eq!(record.output_path, "videos/slide_1_annot_1_7_0.mp4");
    assert_eq!(record.content_type, "video/mp4");
    assert_eq!(fs::read(&record.absolute_path).unwrap(), input);
    assert!(engine.invocations().is_empty(), "engine must not run");
    assert_eq!(dir_entries(&media_dir), vec!["slide_1_annot_1_7_0.mp4"]);
}

#[test]
fn reprocessing_is_idempotent() {
    let engine = StubEngine::new(&probe_json("h264", 1280, 720), &[]);
    let out = tempfile::tempdir().unwrap();
    let media_dir = out.path().join("videos");
    let proc = processor(&engine.registry(), media_dir.clone(), ProcessorOptions::default());

    let input = mp4_bytes();
    let first = proc.process_item(&stream(input.clone(), None)).unwrap().unwrap();
    let first_bytes = fs::read(&first.absolute_path).unwrap();
    let second = proc.process_item(&stream(input, None)).unwrap().unwrap();

    assert_eq!(first.absolute_path, second.absolute_path);
    assert_eq!(fs::read(&second.absolute_path).unwrap(), first_bytes);
    assert_eq!(dir_entries(&media_dir).len(), 1);
}

#[test]
fn absent_engine_keeps_bytes_under_detected_type() {
    let out = tempfile::tempdir().unwrap();
    let media_dir = out.path().join("videos");
    let proc = processor(&absent_registry(), media_dir.clone(), ProcessorOptions::default());

    let input = webm_bytes();
    let record = proc.process_item(&stream(input.clone(), None)).unwrap().unwrap();

    // Without the engine nothing can be verified or converted, so the
    // artifact keeps the sniffed container's extension.
    assert!(!record.transcoded);
    assert_eq!(record.output_path, "videos/slide_1_annot_1_7_0.webm");
    assert_eq!(record.content_type, "video/webm");
    assert_eq!(fs::read(&record.absolute_path).unwrap(), input);
    assert_eq!(dir_entries(&media_dir), vec!["slide_1_annot_1_7_0.webm"]);
}

#[cfg(target_os = "linux")]
#[test]
fn accel_failure_cascades_to_software() {
    // vp8 cannot be hardware-decoded, and the accelerated encoder is
    // broken: intermediate encode, failed accelerated attempt, then a
    // successful software fallback from the intermediate.
    let engine = StubEngine::new(&probe_json("vp8", 640, 360), &["h264_vaapi"]);
    let out = tempfile::tempdir().unwrap();
    let media_dir = out.path().join("videos");
    let options = ProcessorOptions {
        use_vaapi: true,
        ..Default::default()
    };
    let proc = processor(&engine.registry(), media_dir.clone(), options);

    let record = proc.process_item(&stream(webm_bytes(), None)).unwrap().unwrap();

    assert!(record.transcoded);
    assert_eq!(record.output_path, "videos/slide_1_annot_1_7_0.mp4");
    assert_eq!(record.content_type, "video/mp4");

    let calls = engine.invocations();
    assert_eq!(calls.len(), 3, "calls: {calls:#?}");
    assert!(calls[0].contains("ultrafast"), "intermediate first: {}", calls[0]);
    assert!(calls[1].contains("h264_vaapi"), "then accel: {}", calls[1]);
    assert!(calls[2].contains("libx264"), "then software: {}", calls[2]);
    assert!(
        calls[2].contains("inter_h264"),
        "software fallback reads the intermediate: {}",
        calls[2]
    );

    // Intermediate and failed attempt temp are gone.
    assert_eq!(dir_entries(&media_dir), vec!["slide_1_annot_1_7_0.mp4"]);
}

#[test]
fn software_encode_for_non_preferred_codec() {
    let engine = StubEngine::new(&probe_json("vp8", 640, 360), &[]);
    let out = tempfile::tempdir().unwrap();
    let media_dir = out.path().join("videos");
    let proc = processor(&engine.registry(), media_dir.clone(), ProcessorOptions::default());

    let record = proc.process_item(&stream(webm_bytes(), None)).unwrap().unwrap();

    assert!(record.transcoded);
    let calls = engine.invocations();
    assert_eq!(calls.len(), 1, "calls: {calls:#?}");
    assert!(calls[0].contains("libx264"));
    assert!(!calls[0].contains("vaapi"));
    assert_eq!(dir_entries(&media_dir), vec!["slide_1_annot_1_7_0.mp4"]);
}

#[test]
fn oversized_source_is_pre_resized() {
    let engine = StubEngine::new(&probe_json("h264", 7680, 4320), &[]);
    let out = tempfile::tempdir().unwrap();
    let media_dir = out.path().join("videos");
    let proc = processor(&engine.registry(), media_dir.clone(), ProcessorOptions::default());

    // The stub's pre-resize output is unsniffable, so the declared type
    // carries the container detection.
    let record = proc
        .process_item(&stream(mp4_bytes(), Some("video/mp4")))
        .unwrap()
        .unwrap();

    let calls = engine.invocations();
    assert_eq!(calls.len(), 1, "calls: {calls:#?}");
    assert!(calls[0].contains("3840"));
    assert!(calls[0].contains("2160"));
    assert!(calls[0].contains("bicubic"));
    assert!(!record.transcoded);
    assert_eq!(dir_entries(&media_dir), vec!["slide_1_annot_1_7_0.mp4"]);
}

#[test]
fn scaling_failure_does_not_abort_the_item() {
    let engine = StubEngine::new(&probe_json("h264", 1280, 720), &["lanczos"]);
    let out = tempfile::tempdir().unwrap();
    let media_dir = out.path().join("videos");
    let options = ProcessorOptions {
        scaling_percent: Some(50),
        ..Default::default()
    };
    let proc = processor(&engine.registry(), media_dir.clone(), options);

    let input = mp4_bytes();
    let record = proc.process_item(&stream(input.clone(), None)).unwrap().unwrap();

    // The scale attempt ran and failed; the item continues unscaled.
    assert_eq!(engine.invocations().len(), 1);
    assert!(!record.transcoded);
    assert_eq!(fs::read(&record.absolute_path).unwrap(), input);
    assert_eq!(dir_entries(&media_dir), vec!["slide_1_annot_1_7_0.mp4"]);
}

#[test]
fn successful_scaling_can_make_the_encode_unnecessary() {
    // A webm source scaled through the H.264/MP4 intermediate already
    // matches the default target, so no final encode runs.
    let engine = StubEngine::new(&probe_json("vp8", 640, 360), &[]);
    let out = tempfile::tempdir().unwrap();
    let media_dir = out.path().join("videos");
    let options = ProcessorOptions {
        scaling_percent: Some(50),
        ..Default::default()
    };
    let proc = processor(&engine.registry(), media_dir.clone(), options);

    let record = proc.process_item(&stream(webm_bytes(), None)).unwrap().unwrap();

    let calls = engine.invocations();
    assert_eq!(calls.len(), 1, "calls: {calls:#?}");
    assert!(calls[0].contains("lanczos"));
    assert!(!record.transcoded);
    assert_eq!(record.output_path, "videos/slide_1_annot_1_7_0.mp4");
    assert_eq!(record.content_type, "video/mp4");
    assert_eq!(dir_entries(&media_dir), vec!["slide_1_annot_1_7_0.mp4"]);
}

#[test]
fn requested_codec_forces_an_encode() {
    let engine = StubEngine::new(&probe_json("h264", 1280, 720), &[]);
    let out = tempfile::tempdir().unwrap();
    let media_dir = out.path().join("videos");
    let options = ProcessorOptions {
        codec: Some("vp9".to_string()),
        ..Default::default()
    };
    let proc = processor(&engine.registry(), media_dir.clone(), options);

    let record = proc.process_item(&stream(mp4_bytes(), None)).unwrap().unwrap();

    assert!(record.transcoded);
    assert_eq!(record.output_path, "videos/slide_1_annot_1_7_0.webm");
    assert_eq!(record.content_type, "video/webm");
    let calls = engine.invocations();
    assert_eq!(calls.len(), 1, "calls: {calls:#?}");
    assert!(calls[0].contains("libvpx-vp9"));
    assert!(calls[0].contains("libopus"));
    assert_eq!(dir_entries(&media_dir), vec!["slide_1_annot_1_7_0.webm"]);
}

#[test]
fn exhausted_cascade_keeps_the_source_encoding() {
    // Every encode fails; the item survives under the canonical name
    // with its original bytes and transcoded=false.
    let engine = StubEngine::new(&probe_json("vp8", 640, 360), &["libx264"]);
    let out = tempfile::tempdir().unwrap();
    let media_dir = out.path().join("videos");
    let proc = processor(&engine.registry(), media_dir.clone(), ProcessorOptions::default());

    let input = webm_bytes();
    let record = proc.process_item(&stream(input.clone(), None)).unwrap().unwrap();

    assert!(!record.transcoded);
    assert_eq!(record.content_type, "video/webm");
    assert_eq!(fs::read(&record.absolute_path).unwrap(), input);
    assert_eq!(dir_entries(&media_dir), vec!["slide_1_annot_1_7_0.mp4"]);
}
