//! Shape mask caching through the full graphics stack: the render-count
//! threshold, cross-rep sharing, deferred disposal, budget limits, and
//! recovery from invalidation and lost surfaces.

use glint_core::{Affine2D, Shape};
use glint_gpu::trace::{TraceDevice, TraceEvent};
use glint_gpu::{
    Device, GpuError, GraphicsSettings, ShaderContext, ShaderGraphics, TargetId, TextureId,
};

fn new_context_with(settings: GraphicsSettings) -> (ShaderContext<TraceDevice>, TargetId) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let mut ctx = ShaderContext::new(TraceDevice::new(), settings);
    let target = ctx
        .device_mut()
        .create_render_target(256, 256, false)
        .unwrap();
    ctx.device_mut().take_events();
    (ctx, target)
}

fn new_context() -> (ShaderContext<TraceDevice>, TargetId) {
    new_context_with(GraphicsSettings::default())
}

fn star() -> Shape {
    let mut p = glint_core::Path::new();
    p.move_to(30.0, 5.0);
    p.line_to(40.0, 25.0);
    p.line_to(60.0, 28.0);
    p.line_to(45.0, 42.0);
    p.line_to(50.0, 62.0);
    p.line_to(30.0, 52.0);
    p.line_to(10.0, 62.0);
    p.line_to(15.0, 42.0);
    p.line_to(0.0, 28.0);
    p.line_to(20.0, 25.0);
    p.close();
    Shape::Path(p)
}

fn render_once(
    ctx: &mut ShaderContext<TraceDevice>,
    target: TargetId,
    rep: &mut glint_gpu::CachingShapeRep,
    shape: &Shape,
) -> Result<(), GpuError> {
    render_with(ctx, target, rep, shape, &Affine2D::IDENTITY)
}

fn render_with(
    ctx: &mut ShaderContext<TraceDevice>,
    target: TargetId,
    rep: &mut glint_gpu::CachingShapeRep,
    shape: &Shape,
    xform: &Affine2D,
) -> Result<(), GpuError> {
    let mut g = ShaderGraphics::new(ctx, target)?;
    g.set_transform(*xform);
    g.fill_shape(Some(rep), shape)?;
    g.flush();
    Ok(())
}

fn uploads(events: &[TraceEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, TraceEvent::UploadTexture(_)))
        .count()
}

fn created_textures(events: &[TraceEvent]) -> Vec<TextureId> {
    events
        .iter()
        .filter_map(|e| match e {
            TraceEvent::CreateTexture(t) => Some(*t),
            _ => None,
        })
        .collect()
}

#[test]
fn mask_is_cached_on_second_render() {
    let (mut ctx, target) = new_context();
    let mut rep = ctx.create_shape_rep();
    let shape = star();

    render_once(&mut ctx, target, &mut rep, &shape).unwrap();
    assert!(!rep.has_cached_entry());
    assert!(ctx.mask_cache().is_empty());

    render_once(&mut ctx, target, &mut rep, &shape).unwrap();
    assert!(rep.has_cached_entry());
    assert_eq!(ctx.mask_cache().len(), 1);
    assert!(ctx.mask_cache().total_pixels() > 0);
    ctx.device_mut().take_events();

    // the third render reuses the cached texture, nothing new is uploaded
    render_once(&mut ctx, target, &mut rep, &shape).unwrap();
    let events = ctx.device_mut().take_events();
    assert_eq!(uploads(&events), 0);
    assert!(created_textures(&events).is_empty());
}

#[test]
fn equivalent_rep_shares_cached_mask_immediately() {
    let (mut ctx, target) = new_context();
    let mut rep1 = ctx.create_shape_rep();
    let shape = star();
    render_once(&mut ctx, target, &mut rep1, &shape).unwrap();
    render_once(&mut ctx, target, &mut rep1, &shape).unwrap();
    assert_eq!(ctx.mask_cache().len(), 1);
    ctx.device_mut().take_events();

    // a second node drawing the same geometry hits on its first render
    let mut rep2 = ctx.create_shape_rep();
    render_once(&mut ctx, target, &mut rep2, &shape).unwrap();
    assert!(rep2.has_cached_entry());
    assert_eq!(ctx.mask_cache().len(), 1);
    let events = ctx.device_mut().take_events();
    assert_eq!(uploads(&events), 0);
    assert!(created_textures(&events).is_empty());
}

#[test]
fn transform_changes_restart_the_render_count() {
    let (mut ctx, target) = new_context();
    let mut rep = ctx.create_shape_rep();
    let shape = star();
    let rot_a = Affine2D::rotation(0.3);
    let rot_b = Affine2D::rotation(0.8);

    // two renders, but never twice under the same linear transform
    render_with(&mut ctx, target, &mut rep, &shape, &rot_a).unwrap();
    render_with(&mut ctx, target, &mut rep, &shape, &rot_b).unwrap();
    assert!(!rep.has_cached_entry());
    assert!(ctx.mask_cache().is_empty());

    // once the transform settles, the usual threshold applies
    render_with(&mut ctx, target, &mut rep, &shape, &rot_b).unwrap();
    assert!(rep.has_cached_entry());
    assert_eq!(ctx.mask_cache().len(), 1);
}

#[test]
fn translated_reps_share_one_cached_mask() {
    let (mut ctx, target) = new_context();
    let shape = star();
    let t1 = Affine2D::translation(10.0, 5.0);
    let mut rep1 = ctx.create_shape_rep();
    render_with(&mut ctx, target, &mut rep1, &shape, &t1).unwrap();
    render_with(&mut ctx, target, &mut rep1, &shape, &t1).unwrap();
    assert_eq!(ctx.mask_cache().len(), 1);
    ctx.device_mut().take_events();

    // the same geometry at another translation rides the cached mask
    let t2 = Affine2D::translation(90.0, 40.0);
    let mut rep2 = ctx.create_shape_rep();
    render_with(&mut ctx, target, &mut rep2, &shape, &t2).unwrap();
    assert!(rep2.has_cached_entry());
    assert_eq!(ctx.mask_cache().len(), 1);
    let events = ctx.device_mut().take_events();
    assert_eq!(uploads(&events), 0);
    assert!(created_textures(&events).is_empty());

    // both reps hold a reference, so the entry outlives either one alone
    drop(rep1);
    ctx.drain_disposer();
    assert_eq!(ctx.mask_cache().len(), 1);
    drop(rep2);
    ctx.drain_disposer();
    assert!(ctx.mask_cache().is_empty());
}

#[test]
fn dropped_reps_release_through_the_disposer() {
    let (mut ctx, target) = new_context();
    let shape = star();
    let mut rep1 = ctx.create_shape_rep();
    render_once(&mut ctx, target, &mut rep1, &shape).unwrap();
    render_once(&mut ctx, target, &mut rep1, &shape).unwrap();
    let mut rep2 = ctx.create_shape_rep();
    render_once(&mut ctx, target, &mut rep2, &shape).unwrap();
    assert_eq!(ctx.mask_cache().len(), 1);
    ctx.device_mut().take_events();

    // still referenced by rep2, so the entry survives rep1
    drop(rep1);
    ctx.drain_disposer();
    assert_eq!(ctx.mask_cache().len(), 1);

    drop(rep2);
    ctx.drain_disposer();
    assert_eq!(ctx.mask_cache().len(), 0);
    assert_eq!(ctx.mask_cache().total_pixels(), 0);
    let events = ctx.device_mut().take_events();
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, TraceEvent::DisposeTexture(_)))
            .count(),
        1
    );
}

#[test]
fn tiny_budget_blocks_caching() {
    let (mut ctx, target) = new_context_with(GraphicsSettings {
        mask_cache_pixel_budget: 10,
        ..GraphicsSettings::default()
    });
    let mut rep = ctx.create_shape_rep();
    let shape = star();
    for _ in 0..4 {
        render_once(&mut ctx, target, &mut rep, &shape).unwrap();
    }
    assert!(!rep.has_cached_entry());
    assert!(ctx.mask_cache().is_empty());
}

#[test]
fn invalidation_discards_and_recaches() {
    let (mut ctx, target) = new_context();
    let mut rep = ctx.create_shape_rep();
    let shape = star();
    render_once(&mut ctx, target, &mut rep, &shape).unwrap();
    render_once(&mut ctx, target, &mut rep, &shape).unwrap();
    assert_eq!(ctx.mask_cache().len(), 1);
    ctx.device_mut().take_events();

    rep.invalidation_handle().invalidate();
    render_once(&mut ctx, target, &mut rep, &shape).unwrap();
    // the stale entry is released and this render went uncached
    assert!(!rep.has_cached_entry());
    assert_eq!(ctx.mask_cache().len(), 0);
    let events = ctx.device_mut().take_events();
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, TraceEvent::DisposeTexture(_)))
            .count(),
        1
    );

    // the threshold counter restarted, so one more render recaches
    render_once(&mut ctx, target, &mut rep, &shape).unwrap();
    assert!(rep.has_cached_entry());
    assert_eq!(ctx.mask_cache().len(), 1);
}

#[test]
fn lost_surface_triggers_rerasterization() {
    let (mut ctx, target) = new_context();
    let mut rep = ctx.create_shape_rep();
    let shape = star();
    render_once(&mut ctx, target, &mut rep, &shape).unwrap();
    ctx.device_mut().take_events();
    render_once(&mut ctx, target, &mut rep, &shape).unwrap();
    let events = ctx.device_mut().take_events();
    // the only texture created during the caching render is the mask
    let cached_tex = created_textures(&events)[0];

    ctx.device_mut().lose_surface(cached_tex);
    render_once(&mut ctx, target, &mut rep, &shape).unwrap();
    assert!(!rep.has_cached_entry());
    let events = ctx.device_mut().take_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, TraceEvent::DisposeTexture(t) if *t == cached_tex)));
}

#[test]
fn empty_shape_draws_nothing() {
    let (mut ctx, target) = new_context();
    let mut rep = ctx.create_shape_rep();
    let shape = Shape::rect(0.0, 0.0, 0.0, 0.0);
    render_once(&mut ctx, target, &mut rep, &shape).unwrap();
    let events = ctx.device_mut().take_events();
    assert!(!events.iter().any(|e| matches!(e, TraceEvent::DrawQuads(_))));
    assert!(ctx.mask_cache().is_empty());
}
