//! Stock shader source assembly
//!
//! Stock shaders are named `{Mask}_{Paint}` with optional `_PAD` /
//! `_REFLECT` / `_REPEAT` and `_AlphaTest` suffixes. Rather than shipping
//! one WGSL file per name, sources are assembled from a shared scaffold
//! plus per-mask and per-paint snippets selected by decomposing the name.
//!
//! Constant layout (four vec4 slots, set through `set_shader_constant`):
//! slots 0 and 1 carry the analytic mask parameters (outer and inner
//! primitive sizes), slot 2 carries paint parameters (radial focus).
//! Unit 0 is always the mask/content texture and unit 1 the paint texture
//! (gradient LUT or pattern); the combined shaders repurpose unit 1 for
//! their second content texture, which is why they only pair with solid
//! paints.

/// Shared scaffold: vertex stage, bindings, uniform layout
const WGSL_COMMON: &str = r#"
struct Globals {
    projection: mat4x4<f32>,
    transform: mat4x4<f32>,
    consts: array<vec4<f32>, 4>,
};

@group(0) @binding(0) var<uniform> globals: Globals;
@group(1) @binding(0) var tex0: texture_2d<f32>;
@group(1) @binding(1) var samp0: sampler;
@group(1) @binding(2) var tex1: texture_2d<f32>;
@group(1) @binding(3) var samp1: sampler;

struct VertexIn {
    @location(0) pos: vec2<f32>,
    @location(1) color: vec4<f32>,
    @location(2) tex0: vec2<f32>,
    @location(3) tex1: vec2<f32>,
};

struct VertexOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) color: vec4<f32>,
    @location(1) tc0: vec2<f32>,
    @location(2) tc1: vec2<f32>,
};

@vertex
fn vs_main(v: VertexIn) -> VertexOut {
    var out: VertexOut;
    let world = globals.transform * vec4<f32>(v.pos, 0.0, 1.0);
    out.pos = globals.projection * world;
    out.color = v.color;
    out.tc0 = v.tex0;
    out.tc1 = v.tex1;
    return out;
}
"#;

/// Shared rounded-rect coverage helper (arc lengths of zero degrade to a
/// plain analytic rect)
const WGSL_RRECT_FN: &str = r#"
fn rrect_cov(tc: vec2<f32>, half_size: vec2<f32>, arc: vec2<f32>) -> f32 {
    let boxed = clamp(min(half_size.x - abs(tc.x), half_size.y - abs(tc.y)) + 0.5, 0.0, 1.0);
    if (arc.x < 0.0005 || arc.y < 0.0005) {
        return boxed;
    }
    let q = abs(tc) - (half_size - arc);
    let p = max(q, vec2<f32>(0.0)) / arc;
    let d = (dot(p, p) - 1.0) * 0.5 * length(arc);
    return min(clamp(0.5 - d, 0.0, 1.0), boxed);
}
"#;

const WGSL_ELLIPSE_FN: &str = r#"
fn ellipse_cov(tc: vec2<f32>, radii: vec2<f32>) -> f32 {
    if (radii.x <= 0.0 || radii.y <= 0.0) {
        return 0.0;
    }
    let p = tc / radii;
    let d = (dot(p, p) - 1.0) * 0.5 * min(radii.x, radii.y);
    return clamp(0.5 - d, 0.0, 1.0);
}
"#;

/// Coverage snippets, one per mask family. Each defines
/// `fn coverage(v: VertexOut) -> vec4<f32>` returning a premultiplied
/// coverage/content value.
fn mask_snippet(mask: &str) -> Option<String> {
    let body = match mask {
        "Solid" | "AlphaOne" => {
            r#"
fn coverage(v: VertexOut) -> vec4<f32> {
    return vec4<f32>(1.0);
}
"#
        }
        "Texture" => {
            r#"
fn coverage(v: VertexOut) -> vec4<f32> {
    return textureSample(tex0, samp0, v.tc0);
}
"#
        }
        "AlphaTexture" => {
            r#"
fn coverage(v: VertexOut) -> vec4<f32> {
    return vec4<f32>(textureSample(tex0, samp0, v.tc0).r);
}
"#
        }
        "AlphaTextureDifference" => {
            r#"
fn coverage(v: VertexOut) -> vec4<f32> {
    let a = textureSample(tex0, samp0, v.tc0).r;
    return vec4<f32>(clamp(2.0 * a - 1.0, 0.0, 1.0));
}
"#
        }
        // Pgram coverage comes from the ramp/wrap texture; the outline
        // variant samples it twice (inner span in tc1, so these shaders
        // never pair with textured paints)
        "FillPgram" => {
            r#"
fn coverage(v: VertexOut) -> vec4<f32> {
    return vec4<f32>(textureSample(tex0, samp0, v.tc0).r);
}
"#
        }
        "DrawPgram" => {
            r#"
fn coverage(v: VertexOut) -> vec4<f32> {
    let outer = textureSample(tex0, samp0, v.tc0).r;
    let inner = textureSample(tex0, samp0, v.tc1).r;
    return vec4<f32>(clamp(outer - inner, 0.0, 1.0));
}
"#
        }
        "FillCircle" => {
            r#"
fn coverage(v: VertexOut) -> vec4<f32> {
    let d = length(v.tc0) - globals.consts[0].x;
    return vec4<f32>(clamp(0.5 - d, 0.0, 1.0));
}
"#
        }
        "DrawCircle" => {
            r#"
fn coverage(v: VertexOut) -> vec4<f32> {
    let d = length(v.tc0);
    let outer = clamp(0.5 - (d - globals.consts[0].x), 0.0, 1.0);
    let inner = clamp(0.5 - (d - globals.consts[0].y), 0.0, 1.0);
    return vec4<f32>(outer - inner);
}
"#
        }
        "FillEllipse" => {
            r#"
fn coverage(v: VertexOut) -> vec4<f32> {
    return vec4<f32>(ellipse_cov(v.tc0, globals.consts[0].xy));
}
"#
        }
        "DrawEllipse" => {
            r#"
fn coverage(v: VertexOut) -> vec4<f32> {
    let outer = ellipse_cov(v.tc0, globals.consts[0].xy);
    let inner = ellipse_cov(v.tc0, globals.consts[1].xy);
    return vec4<f32>(outer - inner);
}
"#
        }
        "FillRoundRect" => {
            r#"
fn coverage(v: VertexOut) -> vec4<f32> {
    return vec4<f32>(rrect_cov(v.tc0, globals.consts[0].xy, globals.consts[0].zw));
}
"#
        }
        "DrawRoundRect" => {
            r#"
fn coverage(v: VertexOut) -> vec4<f32> {
    let outer = rrect_cov(v.tc0, globals.consts[0].xy, globals.consts[0].zw);
    let inner = rrect_cov(v.tc0, globals.consts[1].xy, globals.consts[1].zw);
    return vec4<f32>(outer - inner);
}
"#
        }
        "DrawSemiRoundRect" => {
            r#"
fn coverage(v: VertexOut) -> vec4<f32> {
    let outer = rrect_cov(v.tc0, globals.consts[0].xy, globals.consts[0].zw);
    let inner = rrect_cov(v.tc0, globals.consts[1].xy, vec2<f32>(0.0));
    return vec4<f32>(outer - inner);
}
"#
        }
        _ => return None,
    };
    Some(format!("{WGSL_RRECT_FN}\n{WGSL_ELLIPSE_FN}\n{body}"))
}

/// Paint snippets. Each defines `fn paint(v: VertexOut) -> vec4<f32>`
/// returning a premultiplied paint color. `spread` applies only to
/// old-paint-style shaders; new-style shaders pad inside the LUT sampler.
fn paint_snippet(paint: &str, spread: Option<&str>) -> Option<String> {
    let spread_fn = match spread {
        None | Some("PAD") => "fn spread(t: f32) -> f32 { return clamp(t, 0.0, 1.0); }",
        Some("REFLECT") => {
            "fn spread(t: f32) -> f32 { let m = abs(t % 2.0); return 1.0 - abs(m - 1.0); }"
        }
        Some("REPEAT") => "fn spread(t: f32) -> f32 { return fract(t); }",
        Some(_) => return None,
    };
    let body = match paint {
        "Color" => {
            r#"
fn paint(v: VertexOut) -> vec4<f32> {
    return v.color;
}
"#
        }
        "LinearGradient" => {
            r#"
fn paint(v: VertexOut) -> vec4<f32> {
    let t = spread(v.tc1.x);
    return textureSample(tex1, samp1, vec2<f32>(t, 0.5)) * v.color.a;
}
"#
        }
        "RadialGradient" => {
            r#"
fn paint(v: VertexOut) -> vec4<f32> {
    let fx = globals.consts[2].x;
    let denom = max(globals.consts[2].y, 0.0001);
    let dx = v.tc1.x - fx;
    let t = spread(length(vec2<f32>(dx, v.tc1.y)) / denom);
    return textureSample(tex1, samp1, vec2<f32>(t, 0.5)) * v.color.a;
}
"#
        }
        "ImagePattern" => {
            r#"
fn paint(v: VertexOut) -> vec4<f32> {
    return textureSample(tex1, samp1, fract(v.tc1)) * v.color.a;
}
"#
        }
        _ => return None,
    };
    Some(format!("{spread_fn}\n{body}"))
}

fn fragment_main(alpha_test: bool) -> &'static str {
    if alpha_test {
        r#"
@fragment
fn fs_main(v: VertexOut) -> @location(0) vec4<f32> {
    let c = coverage(v) * paint(v);
    if (c.a <= 0.0) {
        discard;
    }
    return c;
}
"#
    } else {
        r#"
@fragment
fn fs_main(v: VertexOut) -> @location(0) vec4<f32> {
    return coverage(v) * paint(v);
}
"#
    }
}

/// Self-contained special shaders that do not follow the mask/paint grid
fn special_shader_body(name: &str) -> Option<&'static str> {
    Some(match name {
        // region mask on unit 0 times glyph coverage on unit 1
        "Super_Color" => {
            r#"
@fragment
fn fs_main(v: VertexOut) -> @location(0) vec4<f32> {
    let region = textureSample(tex0, samp0, v.tc0).r;
    let glyph = textureSample(tex1, samp1, v.tc1).r;
    return v.color * (region * glyph);
}
"#
        }
        // subpixel text: per-channel coverage from the LCD scratch buffer
        "LCD_Color" => {
            r#"
@fragment
fn fs_main(v: VertexOut) -> @location(0) vec4<f32> {
    let c = textureSample(tex0, samp0, v.tc0).rgb;
    let a = (c.r + c.g + c.b) / 3.0;
    return vec4<f32>(v.color.rgb * c, v.color.a * a);
}
"#
        }
        // RGBA content on unit 1 modulated by an alpha mask on unit 0
        "MaskTexture" => {
            r#"
@fragment
fn fs_main(v: VertexOut) -> @location(0) vec4<f32> {
    let mask = textureSample(tex0, samp0, v.tc0).r;
    let img = textureSample(tex1, samp1, v.tc1);
    return img * v.color * mask;
}
"#
        }
        // mask interpolation: coverage below one half is treated as zero,
        // above as a ramp (difference masks from incremental renders)
        "MaskInterpolateTexture" => {
            r#"
@fragment
fn fs_main(v: VertexOut) -> @location(0) vec4<f32> {
    let a = textureSample(tex0, samp0, v.tc0).r;
    let mask = clamp(2.0 * a - 1.0, 0.0, 1.0);
    let img = textureSample(tex1, samp1, v.tc1);
    return img * v.color * mask;
}
"#
        }
        // planar video: luma on unit 0, chroma on units 1 and 2
        "YCbCr" => {
            r#"
@group(1) @binding(4) var tex2: texture_2d<f32>;
@group(1) @binding(5) var samp2: sampler;

@fragment
fn fs_main(v: VertexOut) -> @location(0) vec4<f32> {
    let luma_scale = globals.consts[0].xy;
    let chroma_scale = globals.consts[0].zw;
    let y = textureSample(tex0, samp0, v.tc0 * luma_scale).r;
    let cb = textureSample(tex1, samp1, v.tc0 * chroma_scale).r - 0.5;
    let cr = textureSample(tex2, samp2, v.tc0 * chroma_scale).r - 0.5;
    let rgb = vec3<f32>(
        y + 1.402 * cr,
        y - 0.344136 * cb - 0.714136 * cr,
        y + 1.772 * cb,
    );
    return vec4<f32>(clamp(rgb, vec3<f32>(0.0), vec3<f32>(1.0)), 1.0) * v.color;
}
"#
        }
        // planar video with an alpha plane on unit 3
        "YCbCrAlpha" => {
            r#"
@group(1) @binding(4) var tex2: texture_2d<f32>;
@group(1) @binding(5) var samp2: sampler;
@group(1) @binding(6) var tex3: texture_2d<f32>;
@group(1) @binding(7) var samp3: sampler;

@fragment
fn fs_main(v: VertexOut) -> @location(0) vec4<f32> {
    let luma_scale = globals.consts[0].xy;
    let chroma_scale = globals.consts[0].zw;
    let y = textureSample(tex0, samp0, v.tc0 * luma_scale).r;
    let cb = textureSample(tex1, samp1, v.tc0 * chroma_scale).r - 0.5;
    let cr = textureSample(tex2, samp2, v.tc0 * chroma_scale).r - 0.5;
    let a = textureSample(tex3, samp3, v.tc0 * luma_scale).r;
    let rgb = vec3<f32>(
        y + 1.402 * cr,
        y - 0.344136 * cb - 0.714136 * cr,
        y + 1.772 * cb,
    );
    return vec4<f32>(clamp(rgb, vec3<f32>(0.0), vec3<f32>(1.0)) * a, a) * v.color;
}
"#
        }
        _ => return None,
    })
}

/// Assemble WGSL for a stock shader name, or `None` if the name does not
/// decompose into known mask/paint/suffix parts
pub fn stock_shader_source(name: &str) -> Option<String> {
    if let Some(body) = special_shader_body(name) {
        return Some(format!("{WGSL_COMMON}\n{body}"));
    }
    let mut base = name;
    let alpha_test = if let Some(stripped) = base.strip_suffix("_AlphaTest") {
        base = stripped;
        true
    } else {
        false
    };
    let mut spread = None;
    for s in ["PAD", "REFLECT", "REPEAT"] {
        if let Some(stripped) = base.strip_suffix(&format!("_{s}")) {
            base = stripped;
            spread = Some(s);
            break;
        }
    }
    let (mask, paint) = base.split_once('_')?;
    let mask_src = mask_snippet(mask)?;
    let paint_src = paint_snippet(paint, spread)?;
    Some(format!(
        "{WGSL_COMMON}\n{mask_src}\n{paint_src}\n{}",
        fragment_main(alpha_test)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_stock_names_assemble() {
        let masks = [
            "Solid",
            "Texture",
            "AlphaOne",
            "AlphaTexture",
            "AlphaTextureDifference",
            "FillPgram",
            "DrawPgram",
            "FillCircle",
            "DrawCircle",
            "FillEllipse",
            "DrawEllipse",
            "FillRoundRect",
            "DrawRoundRect",
            "DrawSemiRoundRect",
        ];
        let paints = ["Color", "LinearGradient", "RadialGradient", "ImagePattern"];
        for m in masks {
            for p in paints {
                let name = format!("{m}_{p}");
                assert!(stock_shader_source(&name).is_some(), "missing {name}");
                assert!(
                    stock_shader_source(&format!("{name}_AlphaTest")).is_some(),
                    "missing {name}_AlphaTest"
                );
            }
        }
    }

    #[test]
    fn test_spread_suffixed_names_assemble() {
        for s in ["PAD", "REFLECT", "REPEAT"] {
            let name = format!("Solid_LinearGradient_{s}");
            assert!(stock_shader_source(&name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn test_special_shaders_assemble() {
        for name in [
            "Super_Color",
            "LCD_Color",
            "MaskTexture",
            "MaskInterpolateTexture",
            "YCbCr",
            "YCbCrAlpha",
        ] {
            assert!(stock_shader_source(name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn test_unknown_name_rejected() {
        assert!(stock_shader_source("Bogus_Color").is_none());
        assert!(stock_shader_source("Solid_Bogus").is_none());
        assert!(stock_shader_source("NoUnderscore").is_none());
    }

    #[test]
    fn test_alpha_test_emits_discard() {
        let src = stock_shader_source("Texture_Color_AlphaTest").unwrap();
        assert!(src.contains("discard"));
        let plain = stock_shader_source("Texture_Color").unwrap();
        assert!(!plain.contains("discard"));
    }
}
