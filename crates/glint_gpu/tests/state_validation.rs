//! State mirror behavior against the recording device: batching, minimal
//! device traffic, flush-before-transition, and shader slot management.

use glint_core::{Color, CompositeMode, Paint, Rectangle};
use glint_gpu::device::PixelFormat;
use glint_gpu::trace::{TraceDevice, TraceEvent};
use glint_gpu::{
    AaMode, Device, DeviceMode, FontStrike, GlyphBitmap, GlyphRun, GraphicsSettings,
    PositionedGlyph, ShaderContext, ShaderGraphics, TargetId,
};

fn new_context() -> (ShaderContext<TraceDevice>, TargetId) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let mut ctx = ShaderContext::new(TraceDevice::new(), GraphicsSettings::default());
    let target = ctx
        .device_mut()
        .create_render_target(256, 256, false)
        .unwrap();
    ctx.device_mut().take_events();
    (ctx, target)
}

fn draw_counts(events: &[TraceEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            TraceEvent::DrawQuads(n) => Some(*n),
            _ => None,
        })
        .collect()
}

fn shader_creations(events: &[TraceEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            TraceEvent::CreateShader(name) => Some(name.as_str()),
            _ => None,
        })
        .collect()
}

#[test]
fn identical_fills_batch_into_one_draw() {
    let (mut ctx, target) = new_context();
    let mut g = ShaderGraphics::new(&mut ctx, target).unwrap();
    g.set_antialiased(false);
    g.fill_rect(10.0, 10.0, 20.0, 20.0).unwrap();
    g.fill_rect(40.0, 10.0, 20.0, 20.0).unwrap();
    g.flush();

    let events = g.context().device_mut().take_events();
    // both quads land in a single submission
    assert_eq!(draw_counts(&events), vec![12]);
}

#[test]
fn redundant_state_is_not_resent() {
    let (mut ctx, target) = new_context();
    let mut g = ShaderGraphics::new(&mut ctx, target).unwrap();
    g.set_antialiased(false);
    for i in 0..3 {
        g.fill_rect(i as f32 * 30.0, 0.0, 20.0, 20.0).unwrap();
    }
    g.flush();

    let dev = g.context().device_mut();
    assert_eq!(dev.count(|e| matches!(e, TraceEvent::BindTarget(_))), 1);
    assert_eq!(dev.count(|e| matches!(e, TraceEvent::BindShader(_))), 1);
    assert_eq!(dev.count(|e| matches!(e, TraceEvent::SetTransform(_))), 1);
    assert_eq!(dev.count(|e| matches!(e, TraceEvent::SetClip(_))), 1);
    assert_eq!(dev.count(|e| matches!(e, TraceEvent::SetComposite(_))), 1);
    assert_eq!(dev.count(|e| matches!(e, TraceEvent::SetProjection)), 1);
}

#[test]
fn composite_change_flushes_pending_batch() {
    let (mut ctx, target) = new_context();
    let mut g = ShaderGraphics::new(&mut ctx, target).unwrap();
    g.set_antialiased(false);
    g.fill_rect(0.0, 0.0, 10.0, 10.0).unwrap();
    g.set_composite_mode(CompositeMode::Add);
    g.fill_rect(20.0, 0.0, 10.0, 10.0).unwrap();
    g.flush();

    let events = g.context().device_mut().take_events();
    assert_eq!(draw_counts(&events), vec![6, 6]);
    // the first batch is submitted before the composite transition
    let first_draw = events
        .iter()
        .position(|e| matches!(e, TraceEvent::DrawQuads(_)))
        .unwrap();
    let add = events
        .iter()
        .position(|e| matches!(e, TraceEvent::SetComposite(CompositeMode::Add)))
        .unwrap();
    assert!(first_draw < add);
}

#[test]
fn clip_change_flushes_pending_batch() {
    let (mut ctx, target) = new_context();
    let mut g = ShaderGraphics::new(&mut ctx, target).unwrap();
    g.set_antialiased(false);
    g.set_clip_rect(Some(Rectangle::new(0, 0, 100, 100)));
    g.fill_rect(0.0, 0.0, 10.0, 10.0).unwrap();
    g.set_clip_rect(None);
    g.fill_rect(20.0, 0.0, 10.0, 10.0).unwrap();
    g.flush();

    let events = g.context().device_mut().take_events();
    assert_eq!(draw_counts(&events), vec![6, 6]);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, TraceEvent::SetClip(_)))
            .count(),
        2
    );
}

#[test]
fn shader_change_invalidates_transform() {
    let (mut ctx, target) = new_context();
    let tex = ctx
        .device_mut()
        .create_texture(PixelFormat::Rgba8, 8, 8)
        .unwrap();
    ctx.device_mut().take_events();

    let mut g = ShaderGraphics::new(&mut ctx, target).unwrap();
    // both ops run in user space under the identity transform
    g.fill_quad(0.0, 0.0, 10.0, 10.0).unwrap();
    g.draw_texture(tex, 20.0, 0.0, 8.0, 8.0).unwrap();
    g.flush();

    let dev = g.context().device_mut();
    // the transform did not change, but the program switch loses the
    // uniform, so it is sent once per shader
    assert_eq!(dev.count(|e| matches!(e, TraceEvent::BindShader(_))), 2);
    assert_eq!(dev.count(|e| matches!(e, TraceEvent::SetTransform(_))), 2);
}

#[test]
fn shader_slots_are_created_once() {
    let (mut ctx, target) = new_context();
    let mut g = ShaderGraphics::new(&mut ctx, target).unwrap();
    g.set_antialiased(false);
    for _ in 0..4 {
        g.fill_rect(0.0, 0.0, 10.0, 10.0).unwrap();
        g.flush();
    }
    let events = g.context().device_mut().take_events();
    assert_eq!(shader_creations(&events), vec!["Solid_Color"]);
}

#[test]
fn invalid_shader_slot_is_recreated() {
    let (mut ctx, target) = new_context();
    let mut g = ShaderGraphics::new(&mut ctx, target).unwrap();
    g.set_antialiased(false);
    g.fill_rect(0.0, 0.0, 10.0, 10.0).unwrap();
    g.flush();

    g.context()
        .device_mut()
        .invalidate_shaders_named("Solid_Color");
    g.fill_rect(0.0, 0.0, 10.0, 10.0).unwrap();
    g.flush();

    let events = g.context().device_mut().take_events();
    assert_eq!(
        shader_creations(&events),
        vec!["Solid_Color", "Solid_Color"]
    );
}

#[test]
fn small_and_large_rects_pick_different_strategies() {
    let (mut ctx, target) = new_context();
    let mut g = ShaderGraphics::new(&mut ctx, target).unwrap();

    // small antialiased rect rides the ramp texture
    g.fill_rect(5.0, 5.0, 6.0, 6.0).unwrap();
    g.flush();
    let events = g.context().device_mut().take_events();
    assert!(shader_creations(&events).contains(&"Texture_Color"));
    assert!(events
        .iter()
        .any(|e| matches!(e, TraceEvent::CreateTexture(_))));

    // a large rect switches to the analytic shader, no new textures
    g.fill_rect(5.0, 5.0, 180.0, 120.0).unwrap();
    g.flush();
    let events = g.context().device_mut().take_events();
    assert!(shader_creations(&events).contains(&"FillRoundRect_Color"));
    assert!(!events
        .iter()
        .any(|e| matches!(e, TraceEvent::CreateTexture(_))));
}

#[test]
fn gradient_paint_selects_suffixed_shader() {
    use glint_core::{Gradient, GradientStop, Point, SpreadMethod};

    let (mut ctx, target) = new_context();
    let mut g = ShaderGraphics::new(&mut ctx, target).unwrap();
    g.set_antialiased(false);
    let gradient = Gradient::new(
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
        SpreadMethod::Reflect,
        false,
    );
    g.set_paint(Paint::LinearGradient {
        start: Point::ZERO,
        end: Point::new(100.0, 0.0),
        gradient,
    });
    g.fill_rect(0.0, 0.0, 50.0, 50.0).unwrap();
    g.flush();

    let events = g.context().device_mut().take_events();
    // Solid is an old-style mask, so the spread lands in the name
    assert!(shader_creations(&events).contains(&"Solid_LinearGradient_REFLECT"));
    // the gradient LUT is bound on the paint unit
    assert!(events
        .iter()
        .any(|e| matches!(e, TraceEvent::BindTexture(1, Some(_)))));
}

#[test]
fn clear_composites_with_src() {
    let (mut ctx, target) = new_context();
    let mut g = ShaderGraphics::new(&mut ctx, target).unwrap();
    g.clear(Color::BLACK).unwrap();

    let events = g.context().device_mut().take_events();
    assert_eq!(draw_counts(&events), vec![6]);
    assert!(events
        .iter()
        .any(|e| matches!(e, TraceEvent::SetComposite(CompositeMode::Src))));
}

#[test]
fn device_mode_switch_rebinds_everything() {
    let (mut ctx, target) = new_context();
    {
        let mut g = ShaderGraphics::new(&mut ctx, target).unwrap();
        g.set_antialiased(false);
        g.fill_rect(0.0, 0.0, 10.0, 10.0).unwrap();
        g.flush();
    }
    ctx.set_device_mode(DeviceMode::ThreeD);
    {
        let mut g = ShaderGraphics::new(&mut ctx, target).unwrap();
        g.set_antialiased(false);
        g.fill_rect(0.0, 0.0, 10.0, 10.0).unwrap();
        g.flush();
    }
    let dev = ctx.device_mut();
    assert_eq!(
        dev.count(|e| matches!(e, TraceEvent::SetDeviceParameters(DeviceMode::ThreeD))),
        1
    );
    assert_eq!(dev.count(|e| matches!(e, TraceEvent::BindTarget(_))), 2);
    assert_eq!(dev.count(|e| matches!(e, TraceEvent::SetProjection)), 2);
}

#[test]
fn target_switch_revalidates_projection() {
    let (mut ctx, target_a) = new_context();
    let target_b = ctx
        .device_mut()
        .create_render_target(64, 64, false)
        .unwrap();
    ctx.device_mut().take_events();

    {
        let mut g = ShaderGraphics::new(&mut ctx, target_a).unwrap();
        g.set_antialiased(false);
        g.fill_rect(0.0, 0.0, 10.0, 10.0).unwrap();
        g.flush();
    }
    {
        let mut g = ShaderGraphics::new(&mut ctx, target_b).unwrap();
        g.set_antialiased(false);
        g.fill_rect(0.0, 0.0, 10.0, 10.0).unwrap();
        g.flush();
    }
    let dev = ctx.device_mut();
    assert_eq!(dev.count(|e| matches!(e, TraceEvent::BindTarget(_))), 2);
    assert_eq!(dev.count(|e| matches!(e, TraceEvent::SetProjection)), 2);
}

#[test]
fn disposed_context_draws_are_silent_noops() {
    let (mut ctx, target) = new_context();
    ctx.dispose();
    ctx.device_mut().take_events();
    let mut g = ShaderGraphics::new(&mut ctx, target).unwrap();
    assert!(g.fill_quad(0.0, 0.0, 10.0, 10.0).is_ok());
    assert!(g.fill_rect(0.0, 0.0, 10.0, 10.0).is_ok());
    assert!(g.draw_line(0.0, 0.0, 10.0, 10.0).is_ok());
    assert!(g.clear(Color::WHITE).is_ok());
    g.flush();
    let dev = ctx.device_mut();
    assert_eq!(dev.count(|e| matches!(e, TraceEvent::DrawQuads(_))), 0);
    assert_eq!(dev.count(|e| matches!(e, TraceEvent::CreateTexture(_))), 0);
}

#[test]
fn complex_paint_texture_is_reclaimed_on_failed_validation() {
    use glint_core::{Gradient, GradientStop, Point, SpreadMethod};

    let (mut ctx, target) = new_context();
    // too many stops for the LUT shaders, so the fill evaluates on the
    // CPU and uploads a per-call texture
    let stops = (0..16)
        .map(|i| GradientStop {
            offset: i as f32 / 15.0,
            color: Color::lerp(Color::BLACK, Color::WHITE, i as f32 / 15.0),
        })
        .collect();
    let gradient = Gradient::new(stops, SpreadMethod::Pad, false);
    let mut g = ShaderGraphics::new(&mut ctx, target).unwrap();
    g.set_paint(Paint::LinearGradient {
        start: Point::ZERO,
        end: Point::new(50.0, 0.0),
        gradient,
    });

    // the target goes away before the draw, so validation fails after
    // the paint texture was created
    g.context().device_mut().dispose_render_target(target);
    let baseline = g.context().device_mut().live_textures();
    assert!(g.fill_rect(0.0, 0.0, 40.0, 40.0).is_err());
    assert_eq!(g.context().device_mut().live_textures(), baseline);
}

#[test]
fn lcd_text_wipes_its_scratch_area_before_blitting() {
    let (mut ctx, target) = new_context();
    let strike = FontStrike {
        font_id: 1,
        size: 12.0,
        aa_mode: AaMode::Lcd,
    };
    // LCD atlas texels are three subpixel samples wide
    let bitmap = GlyphBitmap {
        width: 9,
        height: 4,
        left: 0.0,
        top: -4.0,
        data: vec![255; 36],
    };
    let (cache, device) = ctx.glyph_cache_mut(AaMode::Lcd);
    cache.register(device, &strike, 42, &bitmap).unwrap();
    ctx.device_mut().take_events();

    let run = GlyphRun {
        strike,
        glyphs: vec![PositionedGlyph {
            glyph_id: 42,
            x: 0.0,
            y: 0.0,
        }],
    };
    let mut g = ShaderGraphics::new(&mut ctx, target).unwrap();
    g.draw_glyph_run(&run, 20.0, 30.0).unwrap();

    // three submissions: the solid quad zeroing the touched scratch area,
    // the glyph blit, and the final composite onto the target
    let events = g.context().device_mut().take_events();
    assert_eq!(draw_counts(&events), vec![6, 6, 6]);
    let shaders = shader_creations(&events);
    assert!(shaders.contains(&"Solid_Color"));
    assert!(shaders.contains(&"Texture_Color"));
    assert!(shaders.contains(&"LCD_Color"));
}

#[test]
fn dispose_releases_every_resource() {
    let (mut ctx, target) = new_context();
    {
        let mut g = ShaderGraphics::new(&mut ctx, target).unwrap();
        g.fill_rect(5.0, 5.0, 6.0, 6.0).unwrap();
        g.fill_rect(5.0, 5.0, 180.0, 120.0).unwrap();
        g.flush();
    }
    ctx.dispose();
    let dev = ctx.device_mut();
    // only the render target's backing texture survives the context
    assert_eq!(dev.live_textures(), 1);
    assert_eq!(dev.live_shaders(), 0);
}
