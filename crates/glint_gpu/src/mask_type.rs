//! Mask types and shader-slot key packing
//!
//! Every draw op pairs a mask type (how per-pixel coverage is produced)
//! with a paint type (how covered pixels are colored). The pair, plus the
//! paint option bits, selects a stock shader out of a flat slot array.

use glint_core::{Paint, PaintType};

/// How per-pixel coverage is produced by a stock shader
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MaskType {
    /// Full coverage everywhere
    Solid,
    /// Coverage modulates an RGBA content texture on unit 0
    Texture,
    /// Alpha mask forced to full coverage (used for masked-pixel draws)
    AlphaOne,
    /// Alpha-channel coverage texture on unit 0
    AlphaTexture,
    /// Alpha coverage sampled as a difference (mask interpolation)
    AlphaTextureDiff,
    /// Analytic filled parallelogram
    FillPgram,
    /// Analytic parallelogram outline
    DrawPgram,
    /// Analytic filled circle
    FillCircle,
    /// Analytic circle outline
    DrawCircle,
    /// Analytic filled ellipse
    FillEllipse,
    /// Analytic ellipse outline
    DrawEllipse,
    /// Analytic filled rounded rectangle
    FillRoundRect,
    /// Analytic rounded-rectangle outline
    DrawRoundRect,
    /// Outline whose inner edge degenerated to a parallelogram
    DrawSemiRoundRect,
}

/// Per-variant table entry backing the `MaskType` accessors
struct MaskTypeInfo {
    name: &'static str,
    /// For DRAW variants, the FILL variant used when the stroke is wide
    /// enough that the hole closes up
    fill_type: Option<MaskType>,
    /// New-style shaders take the paint transform per vertex and need no
    /// spread-method suffix; old-style shaders bake the spread into the
    /// shader name
    new_paint_style: bool,
}

impl MaskType {
    /// Number of mask types; bounds the shader slot arrays
    pub const COUNT: usize = 14;

    fn info(&self) -> &'static MaskTypeInfo {
        use MaskType::*;
        match self {
            Solid => &MaskTypeInfo {
                name: "Solid",
                fill_type: None,
                new_paint_style: false,
            },
            Texture => &MaskTypeInfo {
                name: "Texture",
                fill_type: None,
                new_paint_style: false,
            },
            AlphaOne => &MaskTypeInfo {
                name: "AlphaOne",
                fill_type: None,
                new_paint_style: true,
            },
            AlphaTexture => &MaskTypeInfo {
                name: "AlphaTexture",
                fill_type: None,
                new_paint_style: true,
            },
            AlphaTextureDiff => &MaskTypeInfo {
                name: "AlphaTextureDifference",
                fill_type: None,
                new_paint_style: true,
            },
            FillPgram => &MaskTypeInfo {
                name: "FillPgram",
                fill_type: None,
                new_paint_style: true,
            },
            DrawPgram => &MaskTypeInfo {
                name: "DrawPgram",
                fill_type: Some(FillPgram),
                new_paint_style: true,
            },
            FillCircle => &MaskTypeInfo {
                name: "FillCircle",
                fill_type: None,
                new_paint_style: true,
            },
            DrawCircle => &MaskTypeInfo {
                name: "DrawCircle",
                fill_type: Some(FillCircle),
                new_paint_style: true,
            },
            FillEllipse => &MaskTypeInfo {
                name: "FillEllipse",
                fill_type: None,
                new_paint_style: true,
            },
            DrawEllipse => &MaskTypeInfo {
                name: "DrawEllipse",
                fill_type: Some(FillEllipse),
                new_paint_style: true,
            },
            FillRoundRect => &MaskTypeInfo {
                name: "FillRoundRect",
                fill_type: None,
                new_paint_style: true,
            },
            DrawRoundRect => &MaskTypeInfo {
                name: "DrawRoundRect",
                fill_type: Some(FillRoundRect),
                new_paint_style: true,
            },
            DrawSemiRoundRect => &MaskTypeInfo {
                name: "DrawSemiRoundRect",
                fill_type: None,
                new_paint_style: true,
            },
        }
    }

    /// Shader-name fragment for this mask type
    pub fn name(&self) -> &'static str {
        self.info().name
    }

    /// For DRAW variants, the FILL variant to degrade to when the stroke
    /// covers the whole primitive
    pub fn fill_type(&self) -> Option<MaskType> {
        self.info().fill_type
    }

    /// Whether shaders for this mask take a per-vertex paint transform
    /// (making the spread-method shader-name suffix unnecessary)
    pub fn new_paint_style(&self) -> bool {
        self.info().new_paint_style
    }

    /// Index into the shader slot arrays; mask bits sit above the four
    /// paint bits (`paint_type << 2 | paint_option`)
    pub fn code(&self) -> u32 {
        use MaskType::*;
        match self {
            Solid => 0,
            Texture => 1,
            AlphaOne => 2,
            AlphaTexture => 3,
            AlphaTextureDiff => 4,
            FillPgram => 5,
            DrawPgram => 6,
            FillCircle => 7,
            DrawCircle => 8,
            FillEllipse => 9,
            DrawEllipse => 10,
            FillRoundRect => 11,
            DrawRoundRect => 12,
            DrawSemiRoundRect => 13,
        }
    }

    /// Flat shader-slot index for this mask paired with a paint
    pub fn slot_index(&self, paint_type: PaintType, paint_option: u32) -> usize {
        ((self.code() << 4) | (paint_type.code() << 2) | paint_option) as usize
    }

    /// Stock shader name for this mask/paint pair, e.g.
    /// `Solid_LinearGradient_REFLECT` or `FillRoundRect_Color_AlphaTest`
    pub fn shader_name(&self, paint: &Paint, alpha_test: bool) -> String {
        let mut name = format!("{}_{}", self.name(), paint.paint_type().name());
        if !self.new_paint_style() {
            if let Some(g) = paint.gradient() {
                name.push_str(g.spread.name_suffix());
            }
        }
        if alpha_test {
            name.push_str("_AlphaTest");
        }
        name
    }
}

/// Total number of shader slots per array (mask bits above four paint bits)
pub const SHADER_SLOTS: usize = MaskType::COUNT << 4;

#[cfg(test)]
mod tests {
    use super::*;
    use glint_core::{Color, Gradient, GradientStop, Paint, Point, SpreadMethod};

    fn linear(spread: SpreadMethod) -> Paint {
        Paint::LinearGradient {
            start: Point::ZERO,
            end: Point::new(1.0, 0.0),
            gradient: Gradient::new(
                vec![
                    GradientStop {
                        offset: 0.0,
                        color: Color::BLACK,
                    },
                    GradientStop {
                        offset: 1.0,
                        color: Color::WHITE,
                    },
                ],
                spread,
                false,
            ),
        }
    }

    #[test]
    fn test_slot_indices_unique_and_in_range() {
        use MaskType::*;
        let all = [
            Solid,
            Texture,
            AlphaOne,
            AlphaTexture,
            AlphaTextureDiff,
            FillPgram,
            DrawPgram,
            FillCircle,
            DrawCircle,
            FillEllipse,
            DrawEllipse,
            FillRoundRect,
            DrawRoundRect,
            DrawSemiRoundRect,
        ];
        let mut seen = std::collections::HashSet::new();
        for m in all {
            for pt in [
                glint_core::PaintType::Color,
                glint_core::PaintType::LinearGradient,
                glint_core::PaintType::RadialGradient,
                glint_core::PaintType::ImagePattern,
            ] {
                for opt in 0..3 {
                    let idx = m.slot_index(pt, opt);
                    assert!(idx < SHADER_SLOTS);
                    assert!(seen.insert(idx), "slot collision at {idx}");
                }
            }
        }
    }

    #[test]
    fn test_old_style_name_carries_spread() {
        let p = linear(SpreadMethod::Reflect);
        assert_eq!(
            MaskType::Solid.shader_name(&p, false),
            "Solid_LinearGradient_REFLECT"
        );
    }

    #[test]
    fn test_new_style_name_omits_spread() {
        let p = linear(SpreadMethod::Reflect);
        assert_eq!(
            MaskType::FillRoundRect.shader_name(&p, false),
            "FillRoundRect_LinearGradient"
        );
    }

    #[test]
    fn test_alpha_test_suffix() {
        let p = Paint::Color(Color::RED);
        assert_eq!(
            MaskType::Texture.shader_name(&p, true),
            "Texture_Color_AlphaTest"
        );
    }

    #[test]
    fn test_draw_fill_fallbacks() {
        assert_eq!(MaskType::DrawCircle.fill_type(), Some(MaskType::FillCircle));
        assert_eq!(
            MaskType::DrawRoundRect.fill_type(),
            Some(MaskType::FillRoundRect)
        );
        assert_eq!(MaskType::DrawSemiRoundRect.fill_type(), None);
        assert_eq!(MaskType::Solid.fill_type(), None);
    }
}
