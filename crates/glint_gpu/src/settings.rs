//! Tunables for the rendering core
//!
//! Every knob has a compiled-in default and an environment-variable
//! override, resolved once when the context is created. Settings are owned
//! by the context instance rather than read from globals so that two
//! contexts in one process can be tuned independently.

use tracing::warn;

fn env_f32(name: &str, default: f32) -> f32 {
    match std::env::var(name) {
        Ok(v) => match v.parse::<f32>() {
            Ok(n) => n,
            Err(_) => {
                warn!(var = name, value = %v, "ignoring unparseable override");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_u32(name: &str, default: u32) -> u32 {
    match std::env::var(name) {
        Ok(v) => match v.parse::<u32>() {
            Ok(n) => n,
            Err(_) => {
                warn!(var = name, value = %v, "ignoring unparseable override");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Per-context rendering configuration
#[derive(Clone, Debug)]
pub struct GraphicsSettings {
    /// Edge size of the rect/oval prim ramp textures
    pub prim_texture_size: u32,
    /// Half-pixel padding applied to analytic prim quads so the
    /// antialiased fringe is not clipped by the geometry edge. Stored
    /// negated (an outward offset along the inward corner direction).
    pub fringe_factor: f32,
    /// Gamma applied to solid text colors on the LCD path
    pub lcd_gamma: f32,
    /// Whether the combined mask-plus-glyph shader may be used when a
    /// glyph-cache texture is the mask
    pub super_shader: bool,
    /// Cap on cached mask texels across all entries
    pub mask_cache_pixel_budget: u64,
}

impl Default for GraphicsSettings {
    fn default() -> Self {
        Self {
            prim_texture_size: 128,
            fringe_factor: -0.5,
            lcd_gamma: 1.4,
            super_shader: true,
            mask_cache_pixel_budget: 4 * 1024 * 1024,
        }
    }
}

impl GraphicsSettings {
    /// Defaults overlaid with `GLINT_*` environment overrides
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            prim_texture_size: env_u32("GLINT_PRIM_TEXTURE_SIZE", d.prim_texture_size),
            // the override is expressed as a positive pad amount
            fringe_factor: -env_f32("GLINT_SHADER_PAD", -d.fringe_factor),
            lcd_gamma: env_f32("GLINT_LCD_GAMMA", d.lcd_gamma),
            super_shader: env_bool("GLINT_SUPER_SHADER", d.super_shader),
            mask_cache_pixel_budget: env_u32(
                "GLINT_MASK_CACHE_PIXELS",
                d.mask_cache_pixel_budget as u32,
            ) as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = GraphicsSettings::default();
        assert_eq!(s.prim_texture_size, 128);
        assert_eq!(s.fringe_factor, -0.5);
        assert_eq!(s.mask_cache_pixel_budget, 4 * 1024 * 1024);
    }

    #[test]
    fn test_env_parsers() {
        assert_eq!(env_f32("GLINT_TEST_UNSET_VAR", 1.25), 1.25);
        assert_eq!(env_u32("GLINT_TEST_UNSET_VAR", 7), 7);
        assert!(env_bool("GLINT_TEST_UNSET_VAR", true));
    }
}
