mod common;

use common::{graph_factory, registry, MockControl, MockHost, MODULE_PATH};
use myy_control::core::{MediaItem, StageKind, StreamDetails};
use myy_control::pipeline::{stage_key, MemorySettingsStore, PipelineAssembler, SettingsStore};
use myy_control::rules::{ComponentChoices, RuleEngine, RuleSource};
use myy_control::PlayerError;
use std::sync::Arc;

fn assembler(host: &Arc<MockHost>, fail_link: Option<&str>) -> PipelineAssembler {
    let control = MockControl::new(60_000, true);
    PipelineAssembler::new(
        Arc::new(registry(host.clone())),
        graph_factory(host.clone(), control, fail_link),
    )
    .with_default_audio_renderer("system-audio-renderer")
    .with_video_renderer(Some("video-renderer".to_string()))
}

fn full_choices() -> ComponentChoices {
    ComponentChoices::new()
        .with(StageKind::Source, &["file-source"])
        .with(StageKind::Splitter, &["lav-splitter"])
        .with(StageKind::Subtitle, &["sub-filter"])
        .with(StageKind::Extra, &["extra-a", "extra-b", "extra-a"])
        .with(StageKind::VideoDecoder, &["lav-video"])
        .with(StageKind::AudioDecoder, &["lav-audio"])
}

fn movie() -> MediaItem {
    MediaItem::from_url("/media/movie.mkv").unwrap()
}

/// 释放的组件与创建的组件一致，且顺序相反
fn assert_released_in_reverse(host: &MockHost) {
    let mut created = host.events_with("create:");
    created.reverse();
    assert_eq!(host.events_with("drop:"), created);
}

#[test]
fn test_build_order_and_links() {
    common::init_logger();
    let host = MockHost::new();
    let pipeline = assembler(&host, None).build(&movie(), &full_choices()).unwrap();

    let kinds: Vec<StageKind> = pipeline.stages().iter().map(|h| h.kind).collect();
    assert_eq!(
        kinds,
        vec![
            StageKind::Source,
            StageKind::Splitter,
            StageKind::Subtitle,
            StageKind::Extra,
            StageKind::Extra,
            StageKind::VideoDecoder,
            StageKind::AudioDecoder,
            StageKind::AudioRenderer,
            StageKind::VideoRenderer,
        ]
    );
    assert_eq!(
        host.events_with("link:"),
        vec![
            "file-source->lav-splitter",
            "lav-splitter->sub-filter",
            "sub-filter->extra-a",
            "extra-a->extra-b",
            "lav-splitter->lav-video",
            "lav-splitter->lav-audio",
            "lav-audio->system-audio-renderer",
            "lav-video->video-renderer",
        ]
    );
    assert!(pipeline.stage(StageKind::Source).unwrap().is_internal());
    assert_eq!(
        pipeline.stage(StageKind::VideoDecoder).unwrap().type_id(),
        format!("module:{}", MODULE_PATH)
    );

    host.clear();
    pipeline.teardown();
    assert_eq!(
        host.events_with("remove:"),
        vec![
            "video-renderer",
            "system-audio-renderer",
            "lav-audio",
            "lav-video",
            "extra-b",
            "extra-a",
            "sub-filter",
            "lav-splitter",
            "file-source",
        ]
    );
    // 外部组件先显式释放再卸载模块；内部组件只 drop
    assert_eq!(host.events_with("release:"), vec!["system-audio-renderer", "lav-audio", "lav-video", "lav-splitter"]);
    assert_eq!(host.events_with("unload:").len(), 3);
}

#[test]
fn test_unified_source_skips_splitter() {
    let host = MockHost::new();
    host.set_ports("net-source", 2);
    let choices = full_choices().with(StageKind::Source, &["net-source"]);
    let pipeline = assembler(&host, None).build(&movie(), &choices).unwrap();

    assert!(pipeline.stage(StageKind::Splitter).is_none());
    let links = host.events_with("link:");
    assert!(links.contains(&"net-source->lav-video".to_string()));
    assert!(links.contains(&"net-source->sub-filter".to_string()));
    assert!(!host.events_with("create:").contains(&"lav-splitter".to_string()));
}

#[test]
fn test_video_decoder_failure_releases_everything() {
    common::init_logger();
    let host = MockHost::new();
    host.fail_on("broken-video");
    let choices = ComponentChoices::new()
        .with(StageKind::Source, &["file-source"])
        .with(StageKind::Splitter, &["lav-splitter"])
        .with(StageKind::VideoDecoder, &["broken-video"]);

    let err = assembler(&host, None).build(&movie(), &choices).unwrap_err();
    assert!(matches!(err, PlayerError::ComponentCreate { stage: StageKind::VideoDecoder, .. }));
    assert!(err.to_string().contains("video decoder"));

    assert_eq!(host.events_with("create:"), vec!["file-source", "lav-splitter"]);
    assert_released_in_reverse(&host);
    assert_eq!(host.events_with("remove:"), vec!["lav-splitter", "file-source"]);
    assert_eq!(host.events_with("release:"), vec!["lav-splitter"]);
    assert_eq!(host.events_with("unload:"), vec![MODULE_PATH]);
}

#[test]
fn test_link_failure_is_distinguished() {
    let host = MockHost::new();
    let err = assembler(&host, Some("lav-audio"))
        .build(&movie(), &full_choices())
        .unwrap_err();

    match &err {
        PlayerError::ComponentLink { stage, component, .. } => {
            assert_eq!(*stage, StageKind::AudioDecoder);
            assert_eq!(component, "lav-audio");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(err.to_string().contains("audio decoder"));
    // 创建成功但连接失败的阶段同样被释放
    assert_eq!(host.events_with("create:").last().map(String::as_str), Some("lav-audio"));
    assert_released_in_reverse(&host);
}

#[test]
fn test_missing_splitter_fails_after_source() {
    let host = MockHost::new();
    let choices = ComponentChoices::new().with(StageKind::Source, &["file-source"]);
    let err = assembler(&host, None).build(&movie(), &choices).unwrap_err();

    assert_eq!(err.stage(), Some(StageKind::Splitter));
    assert_eq!(host.events_with("drop:"), vec!["file-source"]);
}

#[test]
fn test_unregistered_choices_skip_to_next_and_fail_when_exhausted() {
    let host = MockHost::new();
    let choices = ComponentChoices::new()
        .with(StageKind::Source, &["not-installed", "file-source"])
        .with(StageKind::Splitter, &["lav-splitter"])
        .with(StageKind::VideoDecoder, &["not-installed"]);

    let err = assembler(&host, None).build(&movie(), &choices).unwrap_err();
    assert_eq!(err.stage(), Some(StageKind::VideoDecoder));
    assert_eq!(host.events_with("create:"), vec!["file-source", "lav-splitter"]);
    assert_released_in_reverse(&host);
}

#[test]
fn test_audio_only_item_uses_default_renderer() {
    let host = MockHost::new();
    let item = MediaItem::from_url("/music/track.flac").unwrap().with_details(StreamDetails {
        audio_codec: Some("flac".to_string()),
        channels: 2,
        ..StreamDetails::default()
    });
    let choices = full_choices().without(StageKind::Subtitle).without(StageKind::Extra);

    let pipeline = assembler(&host, None).build(&item, &choices).unwrap();
    let kinds: Vec<StageKind> = pipeline.stages().iter().map(|h| h.kind).collect();
    assert_eq!(
        kinds,
        vec![
            StageKind::Source,
            StageKind::Splitter,
            StageKind::AudioDecoder,
            StageKind::AudioRenderer,
        ]
    );
    assert_eq!(
        pipeline.stage(StageKind::AudioRenderer).unwrap().component,
        "system-audio-renderer"
    );
}

#[test]
fn test_stage_settings_are_applied() {
    let host = MockHost::new();
    let settings = Arc::new(MemorySettingsStore::new());
    let item = movie();
    settings.store(item.identity(), &stage_key("lav-video"), "threads=4");

    let _pipeline = assembler(&host, None)
        .with_settings(settings)
        .build(&item, &full_choices())
        .unwrap();
    assert_eq!(host.events_with("configure:"), vec!["lav-video:threads=4"]);
}

#[test]
fn test_rules_to_pipeline() {
    let rules = r#"{
        "rule_sets": [
            {
                "name": "HighRes",
                "priority": "10",
                "codec": "h264|hevc",
                "stages": {
                    "video": [ { "name": "uhd", "resolution": "1080|2160", "component": "lav-video" } ]
                }
            },
            {
                "name": "Default",
                "priority": "0",
                "protocol": "file",
                "stages": {
                    "source": [ { "component": "file-source" } ],
                    "splitter": [ { "container": "mkv|mp4", "component": "lav-splitter" } ],
                    "video": [ { "component": "broken-video" } ],
                    "audio": [ { "codec": "aac", "component": "lav-audio" } ]
                }
            }
        ]
    }"#;
    let engine = RuleEngine::new();
    engine.load(vec![RuleSource::inline("test", rules)]).unwrap();

    let item = movie().with_details(StreamDetails {
        video_codec: Some("hevc".to_string()),
        audio_codec: Some("aac".to_string()),
        width: 1920,
        height: 1080,
        ..StreamDetails::default()
    });
    let choices = engine.choose_components(&item, false);
    assert_eq!(choices.get(StageKind::VideoDecoder), ["lav-video", "broken-video"]);

    let host = MockHost::new();
    host.fail_on("broken-video");
    let pipeline = assembler(&host, None).build(&item, &choices).unwrap();
    assert_eq!(pipeline.stage(StageKind::VideoDecoder).unwrap().component, "lav-video");
}
