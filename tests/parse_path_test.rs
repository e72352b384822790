//! URL parsing scenarios: signature modes, source encodings, the named and
//! legacy option forms, presets, client hints, and content negotiation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use http::HeaderMap;

use suzaku::config::Config;
use suzaku::error::ProxyError;
use suzaku::imagetype::ImageType;
use suzaku::options::{GravityType, ProcessingOptions, ResizingType, RgbColor};
use suzaku::url::parse_path;

fn parse(path: &str, conf: &Config) -> Result<(String, ProcessingOptions), ProxyError> {
    parse_path(path, &HeaderMap::new(), conf)
}

fn parse_with_headers(
    path: &str,
    headers: &[(&str, &str)],
    conf: &Config,
) -> Result<(String, ProcessingOptions), ProxyError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.insert(
            http::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
            value.parse().unwrap(),
        );
    }
    parse_path(path, &map, conf)
}

fn b64(url: &str) -> String {
    URL_SAFE_NO_PAD.encode(url)
}

#[test]
fn test_parse_base64_url() {
    let image_url = "http://images.dev/lorem/ipsum.jpg?param=value";
    let path = format!("/unsafe/size:100:100/{}.png", b64(image_url));
    let (url, po) = parse(&path, &Config::default()).unwrap();

    assert_eq!(url, image_url);
    assert_eq!(po.format, ImageType::Png);
    assert_eq!((po.width, po.height), (100, 100));
}

#[test]
fn test_parse_base64_url_without_extension() {
    let image_url = "http://images.dev/lorem/ipsum.jpg?param=value";
    let path = format!("/unsafe/size:100:100/{}", b64(image_url));
    let (url, po) = parse(&path, &Config::default()).unwrap();

    assert_eq!(url, image_url);
    assert_eq!(po.format, ImageType::Unknown);
}

#[test]
fn test_parse_base64_url_with_base() {
    let mut conf = Config::default();
    conf.security.base_url = "http://images.dev/".into();

    let path = format!("/unsafe/size:100:100/{}.png", b64("lorem/ipsum.jpg?param=value"));
    let (url, po) = parse(&path, &conf).unwrap();

    assert_eq!(url, "http://images.dev/lorem/ipsum.jpg?param=value");
    assert_eq!(po.format, ImageType::Png);
}

#[test]
fn test_parse_plain_url() {
    let (url, po) = parse(
        "/unsafe/size:100:100/plain/http://images.dev/lorem/ipsum.jpg@png",
        &Config::default(),
    )
    .unwrap();

    assert_eq!(url, "http://images.dev/lorem/ipsum.jpg");
    assert_eq!(po.format, ImageType::Png);
}

#[test]
fn test_parse_plain_url_without_extension() {
    let (url, po) = parse(
        "/unsafe/size:100:100/plain/http://images.dev/lorem/ipsum.jpg",
        &Config::default(),
    )
    .unwrap();

    assert_eq!(url, "http://images.dev/lorem/ipsum.jpg");
    assert_eq!(po.format, ImageType::Unknown);
}

#[test]
fn test_parse_plain_url_escaped() {
    let (url, po) = parse(
        "/unsafe/size:100:100/plain/http%3A%2F%2Fimages.dev%2Florem%2Fipsum.jpg%3Fparam%3Dvalue@png",
        &Config::default(),
    )
    .unwrap();

    assert_eq!(url, "http://images.dev/lorem/ipsum.jpg?param=value");
    assert_eq!(po.format, ImageType::Png);
}

#[test]
fn test_parse_plain_url_with_base() {
    let mut conf = Config::default();
    conf.security.base_url = "http://images.dev/".into();

    let (url, po) = parse("/unsafe/size:100:100/plain/lorem/ipsum.jpg@png", &conf).unwrap();

    assert_eq!(url, "http://images.dev/lorem/ipsum.jpg");
    assert_eq!(po.format, ImageType::Png);
}

#[test]
fn test_allowed_source() {
    let mut conf = Config::default();
    conf.security.allowed_sources = vec!["local://".into(), "http://images.dev/".into()];

    assert!(parse("/unsafe/plain/http://images.dev/lorem/ipsum.jpg", &conf).is_ok());
}

#[test]
fn test_not_allowed_source() {
    let mut conf = Config::default();
    conf.security.allowed_sources = vec!["local://".into(), "http://images.dev/".into()];

    let err = parse("/unsafe/plain/s3://images/lorem/ipsum.jpg", &conf).unwrap_err();
    assert!(matches!(err, ProxyError::SourceNotAllowed { .. }));
}

#[test]
fn test_parse_legacy_positional_form() {
    let (url, po) = parse(
        "/unsafe/fill/100/200/noea/1/plain/http://images.dev/lorem/ipsum.jpg@png",
        &Config::default(),
    )
    .unwrap();

    assert_eq!(url, "http://images.dev/lorem/ipsum.jpg");
    assert_eq!(po.resizing_type, ResizingType::Fill);
    assert_eq!((po.width, po.height), (100, 200));
    assert_eq!(po.gravity.gravity_type, GravityType::NorthEast);
    assert!(po.enlarge);
    assert_eq!(po.format, ImageType::Png);
}

#[test]
fn test_parse_advanced_format() {
    let (_, po) = parse(
        "/unsafe/format:webp/plain/http://images.dev/lorem/ipsum.jpg",
        &Config::default(),
    )
    .unwrap();
    assert_eq!(po.format, ImageType::WebP);
}

#[test]
fn test_parse_advanced_resize() {
    let (_, po) = parse(
        "/unsafe/resize:fill:100:200:1/plain/http://images.dev/lorem/ipsum.jpg",
        &Config::default(),
    )
    .unwrap();
    assert_eq!(po.resizing_type, ResizingType::Fill);
    assert_eq!((po.width, po.height), (100, 200));
    assert!(po.enlarge);
}

#[test]
fn test_parse_advanced_resizing_type() {
    let (_, po) = parse(
        "/unsafe/resizing_type:fill/plain/http://images.dev/lorem/ipsum.jpg",
        &Config::default(),
    )
    .unwrap();
    assert_eq!(po.resizing_type, ResizingType::Fill);
}

#[test]
fn test_parse_advanced_size() {
    let (_, po) = parse(
        "/unsafe/size:100:200:1/plain/http://images.dev/lorem/ipsum.jpg",
        &Config::default(),
    )
    .unwrap();
    assert_eq!((po.width, po.height), (100, 200));
    assert!(po.enlarge);
}

#[test]
fn test_parse_advanced_width_height() {
    let (_, po) = parse(
        "/unsafe/width:100/height:50/plain/http://images.dev/lorem/ipsum.jpg",
        &Config::default(),
    )
    .unwrap();
    assert_eq!((po.width, po.height), (100, 50));
}

#[test]
fn test_parse_advanced_enlarge() {
    let (_, po) = parse(
        "/unsafe/enlarge:1/plain/http://images.dev/lorem/ipsum.jpg",
        &Config::default(),
    )
    .unwrap();
    assert!(po.enlarge);
}

#[test]
fn test_parse_advanced_extend() {
    let (_, po) = parse(
        "/unsafe/extend:1:so:10:20/plain/http://images.dev/lorem/ipsum.jpg",
        &Config::default(),
    )
    .unwrap();
    assert!(po.extend.enabled);
    assert_eq!(po.extend.gravity.gravity_type, GravityType::South);
    assert_eq!((po.extend.gravity.x, po.extend.gravity.y), (10.0, 20.0));
}

#[test]
fn test_parse_advanced_gravity() {
    let (_, po) = parse(
        "/unsafe/gravity:soea/plain/http://images.dev/lorem/ipsum.jpg",
        &Config::default(),
    )
    .unwrap();
    assert_eq!(po.gravity.gravity_type, GravityType::SouthEast);
}

#[test]
fn test_parse_advanced_gravity_focus_point() {
    let (_, po) = parse(
        "/unsafe/gravity:fp:0.5:0.75/plain/http://images.dev/lorem/ipsum.jpg",
        &Config::default(),
    )
    .unwrap();
    assert_eq!(po.gravity.gravity_type, GravityType::FocusPoint);
    assert_eq!((po.gravity.x, po.gravity.y), (0.5, 0.75));
}

#[test]
fn test_parse_advanced_quality() {
    let (_, po) = parse(
        "/unsafe/quality:55/plain/http://images.dev/lorem/ipsum.jpg",
        &Config::default(),
    )
    .unwrap();
    assert_eq!(po.quality, 55);
}

#[test]
fn test_parse_advanced_background_triple() {
    let (_, po) = parse(
        "/unsafe/background:128:129:130/plain/http://images.dev/lorem/ipsum.jpg",
        &Config::default(),
    )
    .unwrap();
    assert!(po.flatten);
    assert_eq!(po.background, RgbColor { r: 128, g: 129, b: 130 });
}

#[test]
fn test_parse_advanced_background_hex() {
    let (_, po) = parse(
        "/unsafe/background:ffddee/plain/http://images.dev/lorem/ipsum.jpg",
        &Config::default(),
    )
    .unwrap();
    assert!(po.flatten);
    assert_eq!(po.background, RgbColor { r: 0xff, g: 0xdd, b: 0xee });
}

#[test]
fn test_parse_advanced_background_disable() {
    let (_, po) = parse(
        "/unsafe/background:fff/background:/plain/http://images.dev/lorem/ipsum.jpg",
        &Config::default(),
    )
    .unwrap();
    assert!(!po.flatten);
}

#[test]
fn test_parse_advanced_blur_sharpen_dpr() {
    let (_, po) = parse(
        "/unsafe/blur:0.2/sharpen:0.4/dpr:2/plain/http://images.dev/lorem/ipsum.jpg",
        &Config::default(),
    )
    .unwrap();
    assert_eq!(po.blur, 0.2);
    assert_eq!(po.sharpen, 0.4);
    assert_eq!(po.dpr, 2.0);
}

#[test]
fn test_parse_advanced_watermark() {
    let (_, po) = parse(
        "/unsafe/watermark:0.5:soea:10:20:0.6/plain/http://images.dev/lorem/ipsum.jpg",
        &Config::default(),
    )
    .unwrap();
    assert!(po.watermark.enabled);
    assert_eq!(po.watermark.opacity, 0.5);
    assert_eq!(po.watermark.gravity.gravity_type, GravityType::SouthEast);
    assert_eq!((po.watermark.gravity.x, po.watermark.gravity.y), (10.0, 20.0));
    assert_eq!(po.watermark.scale, 0.6);
}

#[test]
fn test_parse_advanced_cachebuster_and_filename() {
    let (_, po) = parse(
        "/unsafe/cachebuster:123/filename:pretty.jpg/plain/http://images.dev/lorem/ipsum.jpg",
        &Config::default(),
    )
    .unwrap();
    assert_eq!(po.cache_buster, "123");
    assert_eq!(po.filename, "pretty.jpg");
}

#[test]
fn test_parse_advanced_strip_metadata() {
    let (_, po) = parse(
        "/unsafe/strip_metadata:true/plain/http://images.dev/lorem/ipsum.jpg",
        &Config::default(),
    )
    .unwrap();
    assert!(po.strip_metadata);
}

#[test]
fn test_parse_repeated_option_overwrites() {
    let (_, po) = parse(
        "/unsafe/quality:40/quality:90/plain/http://images.dev/lorem/ipsum.jpg",
        &Config::default(),
    )
    .unwrap();
    assert_eq!(po.quality, 90);
}

#[test]
fn test_parse_empty_option_list_is_valid() {
    let (_, po) = parse("/unsafe/plain/http://images.dev/lorem/ipsum.jpg", &Config::default())
        .unwrap();
    assert_eq!(po, ProcessingOptions::default());
}

#[test]
fn test_parse_unknown_option() {
    let err = parse(
        "/unsafe/sepia:1/plain/http://images.dev/lorem/ipsum.jpg",
        &Config::default(),
    )
    .unwrap_err();
    assert!(matches!(err, ProxyError::InvalidOption { .. }));
}

// === Presets ===

fn preset_config() -> Config {
    let mut conf = Config::default();
    conf.presets
        .map
        .insert("test1".into(), "resizing_type:fill".into());
    conf.presets
        .map
        .insert("test2".into(), "blur:0.2/quality:50".into());
    conf
}

#[test]
fn test_presets_expand_in_order() {
    let conf = preset_config();
    let (_, po) = parse(
        "/unsafe/preset:test1:test2/plain/http://images.dev/lorem/ipsum.jpg",
        &conf,
    )
    .unwrap();
    assert_eq!(po.resizing_type, ResizingType::Fill);
    assert_eq!(po.blur, 0.2);
    assert_eq!(po.quality, 50);
}

#[test]
fn test_preset_cycle_elimination() {
    let conf = preset_config();
    let (_, po) = parse(
        "/unsafe/preset:test1:test2:test1/plain/http://images.dev/lorem/ipsum.jpg",
        &conf,
    )
    .unwrap();
    assert_eq!(po.used_presets, vec!["test1".to_string(), "test2".to_string()]);
}

#[test]
fn test_default_preset_applied_first() {
    let mut conf = Config::default();
    conf.presets.map.insert(
        "default".into(),
        "resizing_type:fill/blur:0.2/quality:50".into(),
    );

    let (_, po) = parse(
        "/unsafe/quality:70/plain/http://images.dev/lorem/ipsum.jpg",
        &conf,
    )
    .unwrap();
    // URL options win over the default preset.
    assert_eq!(po.resizing_type, ResizingType::Fill);
    assert_eq!(po.blur, 0.2);
    assert_eq!(po.quality, 70);
}

#[test]
fn test_unknown_preset_rejected() {
    let err = parse(
        "/unsafe/preset:nope/plain/http://images.dev/lorem/ipsum.jpg",
        &Config::default(),
    )
    .unwrap_err();
    assert!(matches!(err, ProxyError::InvalidOption { .. }));
}

#[test]
fn test_only_presets_mode() {
    let mut conf = preset_config();
    conf.presets.only_presets = true;
    conf.presets.map.insert("test3".into(), "quality:50".into());
    conf.presets.map.insert("test4".into(), "blur:0.2".into());

    let (_, po) = parse(
        "/unsafe/test3:test4/plain/http://images.dev/lorem/ipsum.jpg",
        &conf,
    )
    .unwrap();
    assert_eq!(po.quality, 50);
    assert_eq!(po.blur, 0.2);
}

#[test]
fn test_only_presets_mode_with_base64_source() {
    let mut conf = preset_config();
    conf.presets.only_presets = true;

    let path = format!(
        "/unsafe/test1:test2/{}.png",
        b64("http://images.dev/lorem/ipsum.jpg?param=value")
    );
    let (_, po) = parse(&path, &conf).unwrap();
    assert_eq!(po.resizing_type, ResizingType::Fill);
    assert_eq!(po.quality, 50);
}

// === Signatures ===

fn secured_config() -> Config {
    let mut conf = Config::default();
    conf.security.allow_insecure = false;
    conf.security.keys = vec!["test-key".into()];
    conf.security.salts = vec!["test-salt".into()];
    conf
}

#[test]
fn test_signed_path_accepted() {
    let conf = secured_config();
    let (url, po) = parse(
        "/HcvNognEV1bW6f8zRqxNYuOkV0IUf1xloRb57CzbT4g/width:150/plain/http://images.dev/lorem/ipsum.jpg@png",
        &conf,
    )
    .unwrap();
    assert_eq!(url, "http://images.dev/lorem/ipsum.jpg");
    assert_eq!(po.width, 150);
}

#[test]
fn test_unsafe_rejected_when_secured() {
    let conf = secured_config();
    let err = parse(
        "/unsafe/width:150/plain/http://images.dev/lorem/ipsum.jpg@png",
        &conf,
    )
    .unwrap_err();
    assert!(matches!(err, ProxyError::InvalidSignature));
}

// === Client hints ===

#[test]
fn test_width_header() {
    let mut conf = Config::default();
    conf.negotiation.enable_client_hints = true;

    let (_, po) = parse_with_headers(
        "/unsafe/plain/http://images.dev/lorem/ipsum.jpg@png",
        &[("Width", "100")],
        &conf,
    )
    .unwrap();
    assert_eq!(po.width, 100);
}

#[test]
fn test_width_header_ignored_when_disabled() {
    let (_, po) = parse_with_headers(
        "/unsafe/plain/http://images.dev/lorem/ipsum.jpg@png",
        &[("Width", "100")],
        &Config::default(),
    )
    .unwrap();
    assert_eq!(po.width, 0);
}

#[test]
fn test_url_width_wins_over_header() {
    let mut conf = Config::default();
    conf.negotiation.enable_client_hints = true;

    let (_, po) = parse_with_headers(
        "/unsafe/width:150/plain/http://images.dev/lorem/ipsum.jpg@png",
        &[("Width", "100")],
        &conf,
    )
    .unwrap();
    assert_eq!(po.width, 150);
}

#[test]
fn test_viewport_width_header() {
    let mut conf = Config::default();
    conf.negotiation.enable_client_hints = true;

    let (_, po) = parse_with_headers(
        "/unsafe/plain/http://images.dev/lorem/ipsum.jpg@png",
        &[("Viewport-Width", "100")],
        &conf,
    )
    .unwrap();
    assert_eq!(po.width, 100);
}

#[test]
fn test_url_width_wins_over_viewport_header() {
    let mut conf = Config::default();
    conf.negotiation.enable_client_hints = true;

    let (_, po) = parse_with_headers(
        "/unsafe/width:150/plain/http://images.dev/lorem/ipsum.jpg@png",
        &[("Viewport-Width", "100")],
        &conf,
    )
    .unwrap();
    assert_eq!(po.width, 150);
}

#[test]
fn test_dpr_header() {
    let mut conf = Config::default();
    conf.negotiation.enable_client_hints = true;

    let (_, po) = parse_with_headers(
        "/unsafe/plain/http://images.dev/lorem/ipsum.jpg@png",
        &[("DPR", "2")],
        &conf,
    )
    .unwrap();
    assert_eq!(po.dpr, 2.0);
}

#[test]
fn test_dpr_header_ignored_when_disabled() {
    let (_, po) = parse_with_headers(
        "/unsafe/plain/http://images.dev/lorem/ipsum.jpg@png",
        &[("DPR", "2")],
        &Config::default(),
    )
    .unwrap();
    assert_eq!(po.dpr, 1.0);
}

// === Content negotiation ===

#[test]
fn test_webp_detection() {
    let mut conf = Config::default();
    conf.negotiation.enable_webp_detection = true;

    let (_, po) = parse_with_headers(
        "/unsafe/plain/http://images.dev/lorem/ipsum.jpg",
        &[("Accept", "image/webp")],
        &conf,
    )
    .unwrap();
    assert!(po.prefer_webp);
    assert!(!po.enforce_webp);
}

#[test]
fn test_webp_enforce() {
    let mut conf = Config::default();
    conf.negotiation.enforce_webp = true;

    let (_, po) = parse_with_headers(
        "/unsafe/plain/http://images.dev/lorem/ipsum.jpg@png",
        &[("Accept", "image/webp")],
        &conf,
    )
    .unwrap();
    assert!(po.prefer_webp);
    assert!(po.enforce_webp);
}

#[test]
fn test_webp_detection_without_accept_header() {
    let mut conf = Config::default();
    conf.negotiation.enable_webp_detection = true;

    let (_, po) = parse(
        "/unsafe/plain/http://images.dev/lorem/ipsum.jpg",
        &conf,
    )
    .unwrap();
    assert!(!po.prefer_webp);
}

#[test]
fn test_parse_is_deterministic() {
    let conf = preset_config();
    let path = "/unsafe/preset:test2/width:64/plain/http://images.dev/a.jpg@png";
    let first = parse(path, &conf).unwrap();
    let second = parse(path, &conf).unwrap();
    assert_eq!(first.0, second.0);
    assert_eq!(first.1, second.1);
}
