//! Translation of opaque job settings into animate request parameters.

use serde_json::Value;

use crate::models::animation::AnimateParams;
use crate::models::job::AnimationSettings;
use crate::services::animate::AnimateError;

/// Build the request parameters for one job.
///
/// Empty strings and missing fields are omitted, numeric fields are parsed
/// explicitly and `individual_frames` is always requested.
pub fn build_params(image: &str, settings: &AnimationSettings) -> Result<AnimateParams, AnimateError> {
    let motion_prompt = non_empty_str(settings, "motion_prompt")
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| AnimateError::InvalidParams("motion_prompt is required".to_string()))?;

    if image.is_empty() {
        return Err(AnimateError::InvalidParams("initial image is required".to_string()));
    }

    let params = AnimateParams {
        motion_prompt,
        initial_image: image.to_string(),
        final_image: non_empty_str(settings, "final_image"),
        model: non_empty_str(settings, "model"),
        image_type: non_empty_str(settings, "image_type"),
        margin_ratio_mode: non_empty_str(settings, "margin_ratio_mode"),
        pixel_art_filter: non_empty_str(settings, "pixel_art_filter").filter(|f| f != "none"),
        frames: int_field(settings, "frames"),
        frame_size: int_field(settings, "frame_size"),
        duration: float_field(settings, "duration"),
        margin_ratio: float_field(settings, "margin_ratio"),
        looped: bool_field(settings, "loop"),
        crop: bool_field(settings, "crop"),
        augment_prompt: bool_field(settings, "augment_prompt"),
        gif: bool_field(settings, "gif"),
        individual_frames: true,
        spritesheet_with_background: bool_field(settings, "spritesheet_with_background"),
    };

    tracing::debug!(params = ?params, "Built animate params");
    Ok(params)
}

fn non_empty_str(settings: &AnimationSettings, key: &str) -> Option<String> {
    match settings.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn int_field(settings: &AnimationSettings, key: &str) -> Option<i64> {
    match settings.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => parse_leading_int(s.trim()),
        _ => None,
    }
}

fn float_field(settings: &AnimationSettings, key: &str) -> Option<f64> {
    match settings.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_leading_float(s.trim()),
        _ => None,
    }
}

fn bool_field(settings: &AnimationSettings, key: &str) -> Option<bool> {
    match settings.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.parse::<bool>().ok(),
        _ => None,
    }
}

/// Integer prefix of a form value, so "36" and "36 frames" both give 36.
fn parse_leading_int(s: &str) -> Option<i64> {
    let end = s
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s[..end].parse().ok()
}

/// Longest float prefix of a form value, so "2.5" and "2.5s" both give 2.5.
fn parse_leading_float(s: &str) -> Option<f64> {
    let candidate = s
        .char_indices()
        .find(|&(_, c)| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')))
        .map(|(i, _)| &s[..i])
        .unwrap_or(s);

    (1..=candidate.len())
        .rev()
        .find_map(|end| candidate[..end].parse::<f64>().ok())
        .filter(|f| f.is_finite())
}
