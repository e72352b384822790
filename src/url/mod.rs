//! Request path parsing.
//!
//! `/<signature>/<options>/<encoded-source>[@<format>]` is decoded into a
//! source URL plus a [`ProcessingOptions`] record. Both the named option
//! form (`size:100:100`) and the legacy positional form
//! (`fill/100/200/noea/1`) are supported, as are configuration presets with
//! in-place expansion and cycle elimination.

pub mod signature;
pub mod source;

use http::HeaderMap;

use crate::config::presets::UrlOption;
use crate::config::Config;
use crate::error::ProxyError;
use crate::imagetype::ImageType;
use crate::options::{
    Gravity, GravityType, ProcessingOptions, ResizingType, RgbColor, TrimOptions,
};

use self::source::SourceUrl;

/// Parse a request path and headers into `(source URL, options)`.
///
/// Deterministic for a given configuration: the same path and headers
/// always produce the same record.
pub fn parse_path(
    path: &str,
    headers: &HeaderMap,
    conf: &Config,
) -> Result<(String, ProcessingOptions), ProxyError> {
    let trimmed = path
        .strip_prefix('/')
        .ok_or_else(|| ProxyError::invalid_url("path must start with /"))?;

    let (sig, signed_part) = trimmed
        .split_once('/')
        .map(|(sig, _)| (sig, &trimmed[sig.len()..]))
        .ok_or_else(|| ProxyError::invalid_url("path is too short"))?;
    if sig.is_empty() {
        return Err(ProxyError::invalid_url("empty signature segment"));
    }

    signature::verify_signature(sig, signed_part, &conf.security)?;

    let rest: Vec<&str> = signed_part[1..].split('/').collect();
    let (option_segments, src) = split_source(&rest)?;
    let src = source::resolve_source(src, &conf.security)?;

    let mut po = ProcessingOptions::default();
    if conf.presets.map.contains_key("default") {
        apply_preset(&mut po, "default", conf)?;
    }

    if conf.presets.only_presets {
        for atom in option_segments {
            for name in atom.split(':') {
                apply_preset(&mut po, name, conf)?;
            }
        }
    } else if is_legacy_prefix(option_segments) {
        apply_legacy_options(&mut po, option_segments)?;
    } else {
        for atom in option_segments {
            let opt = UrlOption::parse(atom).map_err(ProxyError::invalid_option)?;
            apply_url_option(&mut po, &opt, conf)?;
        }
    }

    // The source's format suffix overrides any format option.
    if src.format != ImageType::Unknown {
        po.format = src.format;
    }

    apply_client_hints(&mut po, headers, conf);
    apply_webp_negotiation(&mut po, headers, conf);

    Ok((src.url, po))
}

/// Locate the source marker and split option atoms from the source.
fn split_source<'a>(rest: &'a [&'a str]) -> Result<(&'a [&'a str], SourceUrl), ProxyError> {
    if rest.is_empty() {
        return Err(ProxyError::invalid_url("missing source URL"));
    }

    if let Some(marker) = rest.iter().position(|s| *s == "plain") {
        let src = source::decode_plain(&rest[marker + 1..])?;
        Ok((&rest[..marker], src))
    } else {
        let (last, options) = rest.split_last().expect("checked non-empty");
        if last.is_empty() {
            return Err(ProxyError::invalid_url("missing source URL"));
        }
        let src = source::decode_base64(last)?;
        Ok((options, src))
    }
}

/// The legacy form starts with a bare resizing type segment.
fn is_legacy_prefix(segments: &[&str]) -> bool {
    segments
        .first()
        .is_some_and(|s| !s.contains(':') && s.parse::<ResizingType>().is_ok())
}

/// Legacy positional options, fixed order:
/// `{resizing_type}/{width}/{height}/{gravity}/{enlarge}[/{extension}]`.
fn apply_legacy_options(po: &mut ProcessingOptions, segments: &[&str]) -> Result<(), ProxyError> {
    if segments.len() < 5 || segments.len() > 6 {
        return Err(ProxyError::invalid_url(
            "legacy option list must be resizing_type/width/height/gravity/enlarge",
        ));
    }

    po.resizing_type = segments[0].parse()?;
    po.width = parse_dimension("width", segments[1])?;
    po.height = parse_dimension("height", segments[2])?;
    po.gravity = Gravity::new(segments[3].parse()?);
    po.enlarge = parse_bool("enlarge", segments[4])?;
    if let Some(ext) = segments.get(5) {
        po.format = parse_format(ext)?;
    }
    Ok(())
}

/// Dispatch one named option atom onto the record. Repeated options
/// overwrite previous values.
fn apply_url_option(
    po: &mut ProcessingOptions,
    opt: &UrlOption,
    conf: &Config,
) -> Result<(), ProxyError> {
    let args: Vec<&str> = opt.args.iter().map(String::as_str).collect();
    match opt.name.as_str() {
        "resize" | "rs" => set_resize(po, &args),
        "size" | "s" => set_size(po, &args),
        "resizing_type" | "rt" => {
            require_args(&opt.name, &args, 1, 1)?;
            po.resizing_type = args[0].parse()?;
            Ok(())
        }
        "width" | "w" => {
            require_args(&opt.name, &args, 1, 1)?;
            po.width = parse_dimension("width", args[0])?;
            Ok(())
        }
        "height" | "h" => {
            require_args(&opt.name, &args, 1, 1)?;
            po.height = parse_dimension("height", args[0])?;
            Ok(())
        }
        "dpr" => {
            require_args(&opt.name, &args, 1, 1)?;
            let dpr: f64 = parse_float("dpr", args[0])?;
            if dpr <= 0.0 {
                return Err(ProxyError::invalid_option("dpr must be positive"));
            }
            po.dpr = dpr;
            Ok(())
        }
        "enlarge" | "el" => {
            require_args(&opt.name, &args, 1, 1)?;
            po.enlarge = parse_bool("enlarge", args[0])?;
            Ok(())
        }
        "extend" | "ex" => set_extend(po, &args),
        "gravity" | "g" => {
            po.gravity = parse_gravity(&args)?;
            Ok(())
        }
        "crop" | "c" => set_crop(po, &args),
        "padding" | "pd" => set_padding(po, &args),
        "trim" | "t" => set_trim(po, &args),
        "quality" | "q" => {
            require_args(&opt.name, &args, 1, 1)?;
            let quality: u8 = parse_int("quality", args[0])?;
            if !(1..=100).contains(&quality) {
                return Err(ProxyError::invalid_option("quality must be within 1..100"));
            }
            po.quality = quality;
            Ok(())
        }
        "max_bytes" | "mb" => {
            require_args(&opt.name, &args, 1, 1)?;
            po.max_bytes = parse_int("max_bytes", args[0])?;
            Ok(())
        }
        "background" | "bg" => set_background(po, &args),
        "blur" | "bl" => {
            require_args(&opt.name, &args, 1, 1)?;
            po.blur = parse_sigma("blur", args[0])?;
            Ok(())
        }
        "sharpen" | "sh" => {
            require_args(&opt.name, &args, 1, 1)?;
            po.sharpen = parse_sigma("sharpen", args[0])?;
            Ok(())
        }
        "rotate" | "rot" => {
            require_args(&opt.name, &args, 1, 1)?;
            let angle: i32 = parse_int("rotate", args[0])?;
            if angle % 90 != 0 {
                return Err(ProxyError::invalid_option(
                    "rotation angle must be a multiple of 90",
                ));
            }
            po.rotate = angle;
            Ok(())
        }
        "watermark" | "wm" => set_watermark(po, &args),
        "format" | "f" | "ext" => {
            require_args(&opt.name, &args, 1, 1)?;
            po.format = parse_format(args[0])?;
            Ok(())
        }
        "cachebuster" | "cb" => {
            require_args(&opt.name, &args, 1, 1)?;
            po.cache_buster = args[0].to_string();
            Ok(())
        }
        "strip_metadata" | "sm" => {
            require_args(&opt.name, &args, 1, 1)?;
            po.strip_metadata = parse_bool("strip_metadata", args[0])?;
            Ok(())
        }
        "auto_rotate" | "ar" => {
            require_args(&opt.name, &args, 1, 1)?;
            po.auto_rotate = parse_bool("auto_rotate", args[0])?;
            Ok(())
        }
        "filename" | "fn" => {
            require_args(&opt.name, &args, 1, 1)?;
            po.filename = args[0].to_string();
            Ok(())
        }
        "preset" | "pr" => {
            if args.is_empty() {
                return Err(ProxyError::invalid_option("preset requires at least one name"));
            }
            for name in args {
                apply_preset(po, name, conf)?;
            }
            Ok(())
        }
        other => Err(ProxyError::invalid_option(format!(
            "unknown processing option: {}",
            other
        ))),
    }
}

/// Expand one preset into the record. Presets already applied are skipped
/// silently, which bounds expansion by the number of defined presets.
fn apply_preset(po: &mut ProcessingOptions, name: &str, conf: &Config) -> Result<(), ProxyError> {
    if !po.mark_preset_used(name) {
        return Ok(());
    }
    let value = conf
        .presets
        .map
        .get(name)
        .ok_or_else(|| ProxyError::invalid_option(format!("unknown preset: {}", name)))?;
    let atoms =
        crate::config::presets::parse_preset_atoms(value).map_err(ProxyError::invalid_option)?;
    for atom in &atoms {
        apply_url_option(po, atom, conf)?;
    }
    Ok(())
}

fn set_resize(po: &mut ProcessingOptions, args: &[&str]) -> Result<(), ProxyError> {
    require_args("resize", args, 1, 5)?;
    if !args[0].is_empty() {
        po.resizing_type = args[0].parse()?;
    }
    set_size(po, &args[1..])
}

fn set_size(po: &mut ProcessingOptions, args: &[&str]) -> Result<(), ProxyError> {
    require_args("size", args, 0, 4)?;
    if let Some(w) = args.first().filter(|s| !s.is_empty()) {
        po.width = parse_dimension("width", w)?;
    }
    if let Some(h) = args.get(1).filter(|s| !s.is_empty()) {
        po.height = parse_dimension("height", h)?;
    }
    if let Some(enlarge) = args.get(2).filter(|s| !s.is_empty()) {
        po.enlarge = parse_bool("enlarge", enlarge)?;
    }
    if let Some(extend) = args.get(3).filter(|s| !s.is_empty()) {
        po.extend.enabled = parse_bool("extend", extend)?;
    }
    Ok(())
}

fn set_extend(po: &mut ProcessingOptions, args: &[&str]) -> Result<(), ProxyError> {
    require_args("extend", args, 1, 4)?;
    po.extend.enabled = parse_bool("extend", args[0])?;
    if args.len() > 1 {
        po.extend.gravity = parse_gravity(&args[1..])?;
        if po.extend.gravity.gravity_type == GravityType::Smart {
            return Err(ProxyError::invalid_option(
                "extend does not support smart gravity",
            ));
        }
    }
    Ok(())
}

fn set_crop(po: &mut ProcessingOptions, args: &[&str]) -> Result<(), ProxyError> {
    require_args("crop", args, 2, 5)?;
    po.crop.width = parse_dimension("crop width", args[0])?;
    po.crop.height = parse_dimension("crop height", args[1])?;
    po.crop.gravity = if args.len() > 2 {
        Some(parse_gravity(&args[2..])?)
    } else {
        None
    };
    Ok(())
}

/// CSS shorthand: 1 arg for all sides, 2 for vertical/horizontal,
/// 3 for top/horizontal/bottom, 4 for top/right/bottom/left.
fn set_padding(po: &mut ProcessingOptions, args: &[&str]) -> Result<(), ProxyError> {
    require_args("padding", args, 1, 4)?;
    let values: Vec<u32> = args
        .iter()
        .map(|s| parse_dimension("padding", s))
        .collect::<Result<_, _>>()?;
    let (top, right, bottom, left) = match values.as_slice() {
        [all] => (*all, *all, *all, *all),
        [v, h] => (*v, *h, *v, *h),
        [t, h, b] => (*t, *h, *b, *h),
        [t, r, b, l] => (*t, *r, *b, *l),
        _ => unreachable!("arity checked above"),
    };
    po.padding.top = top;
    po.padding.right = right;
    po.padding.bottom = bottom;
    po.padding.left = left;
    Ok(())
}

fn set_trim(po: &mut ProcessingOptions, args: &[&str]) -> Result<(), ProxyError> {
    require_args("trim", args, 1, 4)?;
    let threshold: f64 = parse_float("trim threshold", args[0])?;
    if threshold < 0.0 {
        return Err(ProxyError::invalid_option("trim threshold must be >= 0"));
    }
    let mut trim = TrimOptions {
        enabled: true,
        threshold,
        ..TrimOptions::default()
    };
    match args.get(1) {
        Some(color) if !color.is_empty() => trim.color = Some(RgbColor::from_hex(color)?),
        _ => trim.smart = true,
    }
    if let Some(eq) = args.get(2).filter(|s| !s.is_empty()) {
        trim.equal_hor = parse_bool("trim equal_hor", eq)?;
    }
    if let Some(eq) = args.get(3).filter(|s| !s.is_empty()) {
        trim.equal_ver = parse_bool("trim equal_ver", eq)?;
    }
    po.trim = trim;
    Ok(())
}

/// `background:` with no usable argument disables flattening; one argument
/// is a hex color; three are a decimal R:G:B triple.
fn set_background(po: &mut ProcessingOptions, args: &[&str]) -> Result<(), ProxyError> {
    match args {
        [] | [""] => {
            po.flatten = false;
            Ok(())
        }
        [hex] => {
            po.background = RgbColor::from_hex(hex)?;
            po.flatten = true;
            Ok(())
        }
        [r, g, b] => {
            po.background = RgbColor {
                r: parse_int("background red", r)?,
                g: parse_int("background green", g)?,
                b: parse_int("background blue", b)?,
            };
            po.flatten = true;
            Ok(())
        }
        _ => Err(ProxyError::invalid_option(
            "background takes a hex color or an R:G:B triple",
        )),
    }
}

fn set_watermark(po: &mut ProcessingOptions, args: &[&str]) -> Result<(), ProxyError> {
    require_args("watermark", args, 1, 5)?;
    let opacity: f64 = parse_float("watermark opacity", args[0])?;
    if !(0.0..=1.0).contains(&opacity) {
        return Err(ProxyError::invalid_option(
            "watermark opacity must be within 0..1",
        ));
    }
    po.watermark.enabled = opacity > 0.0;
    po.watermark.opacity = opacity;
    if args.len() > 1 {
        let upper = args.len().min(4);
        po.watermark.gravity = parse_gravity(&args[1..upper])?;
    }
    if let Some(scale) = args.get(4).filter(|s| !s.is_empty()) {
        let scale: f64 = parse_float("watermark scale", scale)?;
        if scale < 0.0 {
            return Err(ProxyError::invalid_option("watermark scale must be >= 0"));
        }
        po.watermark.scale = scale;
    }
    Ok(())
}

/// Gravity with optional offsets: `type[:x[:y]]`. Focus-point gravity
/// requires both coordinates, relative in `[0, 1]`.
fn parse_gravity(args: &[&str]) -> Result<Gravity, ProxyError> {
    require_args("gravity", args, 1, 3)?;
    let gravity_type: GravityType = args[0].parse()?;
    let mut gravity = Gravity::new(gravity_type);

    if gravity_type == GravityType::FocusPoint {
        if args.len() != 3 {
            return Err(ProxyError::invalid_option(
                "focus-point gravity requires x and y",
            ));
        }
        gravity.x = parse_float("gravity x", args[1])?;
        gravity.y = parse_float("gravity y", args[2])?;
        if !(0.0..=1.0).contains(&gravity.x) || !(0.0..=1.0).contains(&gravity.y) {
            return Err(ProxyError::invalid_option(
                "focus-point coordinates must be within 0..1",
            ));
        }
        return Ok(gravity);
    }

    if let Some(x) = args.get(1).filter(|s| !s.is_empty()) {
        gravity.x = parse_float("gravity x", x)?;
    }
    if let Some(y) = args.get(2).filter(|s| !s.is_empty()) {
        gravity.y = parse_float("gravity y", y)?;
    }
    Ok(gravity)
}

fn apply_client_hints(po: &mut ProcessingOptions, headers: &HeaderMap, conf: &Config) {
    if !conf.negotiation.enable_client_hints {
        return;
    }

    // Explicit URL options always win over headers.
    if po.width == 0 {
        let hinted = header_value(headers, "Width")
            .or_else(|| header_value(headers, "Viewport-Width"))
            .and_then(|v| v.parse::<u32>().ok());
        if let Some(width) = hinted {
            po.width = width;
        }
    }

    if po.dpr == 1.0 {
        if let Some(dpr) = header_value(headers, "DPR").and_then(|v| v.parse::<f64>().ok()) {
            if dpr > 0.0 {
                po.dpr = dpr;
            }
        }
    }
}

fn apply_webp_negotiation(po: &mut ProcessingOptions, headers: &HeaderMap, conf: &Config) {
    if !conf.negotiation.enable_webp_detection && !conf.negotiation.enforce_webp {
        return;
    }
    let accepts_webp = header_value(headers, "Accept")
        .map(|accept| accept.contains("image/webp"))
        .unwrap_or(false);
    if accepts_webp {
        po.prefer_webp = true;
        po.enforce_webp = conf.negotiation.enforce_webp;
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn require_args(name: &str, args: &[&str], min: usize, max: usize) -> Result<(), ProxyError> {
    if args.len() < min || args.len() > max {
        return Err(ProxyError::invalid_option(format!(
            "{} takes {}..{} arguments, got {}",
            name,
            min,
            max,
            args.len()
        )));
    }
    Ok(())
}

fn parse_dimension(name: &str, s: &str) -> Result<u32, ProxyError> {
    s.parse::<u32>()
        .map_err(|_| ProxyError::invalid_option(format!("invalid {}: {}", name, s)))
}

fn parse_int<T: std::str::FromStr>(name: &str, s: &str) -> Result<T, ProxyError> {
    s.parse::<T>()
        .map_err(|_| ProxyError::invalid_option(format!("invalid {}: {}", name, s)))
}

fn parse_float(name: &str, s: &str) -> Result<f64, ProxyError> {
    s.parse::<f64>()
        .map_err(|_| ProxyError::invalid_option(format!("invalid {}: {}", name, s)))
}

fn parse_sigma(name: &str, s: &str) -> Result<f32, ProxyError> {
    let sigma = s
        .parse::<f32>()
        .map_err(|_| ProxyError::invalid_option(format!("invalid {}: {}", name, s)))?;
    if sigma < 0.0 {
        return Err(ProxyError::invalid_option(format!("{} must be >= 0", name)));
    }
    Ok(sigma)
}

fn parse_bool(name: &str, s: &str) -> Result<bool, ProxyError> {
    match s {
        "1" | "t" | "true" => Ok(true),
        "0" | "f" | "false" | "" => Ok(false),
        _ => Err(ProxyError::invalid_option(format!(
            "invalid {}: {}",
            name, s
        ))),
    }
}

fn parse_format(s: &str) -> Result<ImageType, ProxyError> {
    ImageType::from_extension(s)
        .ok_or_else(|| ProxyError::invalid_option(format!("unknown format: {}", s)))
}
