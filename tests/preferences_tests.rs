use std::fs;

use rust_slideshow::config::{self, Preferences, Source};
use rust_slideshow::settings::RawSettings;
use tempfile::tempdir;

#[test]
fn missing_file_gives_defaults() {
    let app = tempdir().unwrap();
    let loaded = config::load(&app.path().join("nope.json"), app.path());
    assert_eq!(loaded.source, Source::Defaults);
    assert_eq!(loaded.prefs, Preferences::defaults(app.path()));
    assert_eq!(loaded.status(), "Using default settings (Small WebM).");
}

#[test]
fn malformed_file_gives_defaults() {
    let app = tempdir().unwrap();
    let path = app.path().join("prefs.json");
    fs::write(&path, "{ not json").unwrap();
    let loaded = config::load(&path, app.path());
    assert_eq!(loaded.source, Source::Defaults);

    fs::write(&path, "[1, 2, 3]").unwrap();
    let loaded = config::load(&path, app.path());
    assert_eq!(loaded.source, Source::Defaults);
}

#[test]
fn file_values_override_defaults() {
    let app = tempdir().unwrap();
    let images = tempdir().unwrap();
    let path = app.path().join("prefs.json");
    let text = format!(
        r#"{{
            "output_profile": "Smallest File (WebM / AV1 - Slow Encode)",
            "quality_crf": "28",
            "time_per_image_sec": "3",
            "downscale_enabled": false,
            "downscale_factor": "0.25",
            "output_file_hint": "/videos/last.webm",
            "last_add_directory": {:?},
            "unknown_key": 42
        }}"#,
        images.path().to_str().unwrap()
    );
    fs::write(&path, text).unwrap();

    let loaded = config::load(&path, app.path());
    assert_eq!(loaded.source, Source::File);
    let prefs = loaded.prefs;
    assert_eq!(prefs.output_profile, "AV1 - .webm");
    assert_eq!(prefs.quality_crf, "28");
    assert_eq!(prefs.time_per_image_sec, "3");
    assert!(!prefs.downscale_enabled);
    assert_eq!(prefs.downscale_factor, "0.25");
    assert_eq!(
        prefs.output_file_hint.as_deref(),
        Some(std::path::Path::new("/videos/last.webm"))
    );
    assert_eq!(prefs.last_add_directory, images.path());
}

#[test]
fn saved_preferences_load_back() {
    let app = tempdir().unwrap();
    let path = app.path().join("prefs.json");
    let mut prefs = Preferences::defaults(app.path());
    let raw = RawSettings {
        duration: "0.75".into(),
        profile: "H.264 - .mp4".into(),
        quality: "20".into(),
        downscale_enabled: false,
        downscale_factor: "0.5".into(),
        output: None,
    };
    let hint = app.path().join("out.mp4");
    prefs.capture(&raw, Some(&hint), app.path());
    config::save(&path, &prefs).unwrap();

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written["output_profile"], "H.264 - .mp4");
    assert_eq!(written["downscale_enabled"], false);

    let loaded = config::load(&path, app.path());
    assert_eq!(loaded.prefs, prefs);
    assert_eq!(loaded.prefs.raw_settings(), raw);
}

#[test]
fn save_failure_is_not_escalated() {
    let app = tempdir().unwrap();
    let path = app.path().join("no_such_dir").join("prefs.json");
    let prefs = Preferences::defaults(app.path());
    assert!(config::save(&path, &prefs).is_err());
    config::save_or_warn(&path, &prefs);
    assert!(!path.exists());
}
