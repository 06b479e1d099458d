//! Mesh sync demo
//!
//! Builds a small in-memory scene, runs two sync frames (the second after a
//! few edits) and logs what the resource registry did.
//!
//! Usage: `sync_app [config.toml|config.ron]`

use std::sync::Arc;

use mesh_sync::foundation::logging;
use mesh_sync::prelude::*;
use mesh_sync::scene::InstancerData;
use nalgebra::Vector3;

const REPR: &str = "refined";

fn cube_topology(scheme: SubdivScheme) -> MeshTopology {
    MeshTopology::new(
        scheme,
        vec![4; 6],
        vec![0, 1, 3, 2, 2, 3, 5, 4, 4, 5, 7, 6, 6, 7, 1, 0, 1, 7, 5, 3, 6, 0, 2, 4],
    )
}

fn cube_points(scale: f32) -> Vec<Vector3<f32>> {
    let h = 0.5 * scale;
    vec![
        Vector3::new(-h, -h, h),
        Vector3::new(h, -h, h),
        Vector3::new(-h, h, h),
        Vector3::new(h, h, h),
        Vector3::new(-h, h, -h),
        Vector3::new(h, h, -h),
        Vector3::new(-h, -h, -h),
        Vector3::new(h, -h, -h),
    ]
}

fn build_scene() -> MemoryDelegate {
    let mut delegate = MemoryDelegate::new();

    // three identical cubes share topology and vertex data
    for i in 0..3 {
        delegate.insert_mesh(
            format!("/world/cube{i}"),
            MeshData::new(cube_topology(SubdivScheme::CatmullClark))
                .with_primvar("points", Interpolation::Vertex, Value::Vec3fArray(cube_points(1.0))),
        );
    }

    delegate.insert_mesh(
        "/world/smooth",
        MeshData::new(cube_topology(SubdivScheme::CatmullClark))
            .with_display_style(DisplayStyle::default().with_refine_level(2))
            .with_primvar("points", Interpolation::Vertex, Value::Vec3fArray(cube_points(2.0)))
            .with_primvar("displayColor", Interpolation::Constant, Value::Vec3f(Vector3::new(0.8, 0.7, 0.5))),
    );

    delegate.insert_mesh(
        "/world/pentagon",
        MeshData::new(MeshTopology::new(SubdivScheme::CatmullClark, vec![5], vec![0, 1, 2, 3, 4]))
            .with_material("/looks/ptex")
            .with_primvar(
                "points",
                Interpolation::Vertex,
                Value::Vec3fArray(vec![
                    Vector3::new(0.0, 1.0, 0.0),
                    Vector3::new(0.95, 0.31, 0.0),
                    Vector3::new(0.59, -0.81, 0.0),
                    Vector3::new(-0.59, -0.81, 0.0),
                    Vector3::new(-0.95, 0.31, 0.0),
                ]),
            )
            .with_primvar("st", Interpolation::FaceVarying, Value::FloatArray(vec![0.0, 0.25, 0.5, 0.75, 1.0])),
    );

    delegate.insert_mesh(
        "/world/instanced",
        MeshData::new(cube_topology(SubdivScheme::Loop))
            .with_instancer("/world/instancer")
            .with_primvar("points", Interpolation::Vertex, Value::Vec3fArray(cube_points(0.5))),
    );
    delegate.insert_instancer(
        "/world/instancer",
        InstancerData {
            count: 4,
            primvars: vec![("scale".to_string(), Value::FloatArray(vec![1.0, 1.5, 2.0, 2.5]))],
        },
    );

    delegate
}

fn run_frame(index: &mut RenderIndex, delegate: &MemoryDelegate, frame: usize) -> Result<(), SyncError> {
    let reports = index.sync_all(delegate, REPR);
    let failed = reports.iter().filter(|report| !report.is_ok()).count();
    let warnings: usize = reports.iter().map(|report| report.warnings.len()).sum();

    let summary = index.commit()?;
    log::info!(
        "Frame {}: {} prims synced ({} failed, {} warnings); {} sources, {} uploads, {} computations, {} entries collected",
        frame,
        reports.len(),
        failed,
        warnings,
        summary.sources_resolved,
        summary.buffers_uploaded,
        summary.computations_executed,
        summary.entries_collected
    );
    Ok(())
}

fn load_config() -> Result<ApplicationConfig, Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => ApplicationConfig::load_from_file(&path)?,
        None => ApplicationConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    logging::init_with_level(&config.logging.level);
    log::info!("Sync config: {:?}", config.sync);

    let mut delegate = build_scene();
    let mut index = RenderIndex::new(config.sync);
    index.insert_material("/looks/ptex", Arc::new(Material::new().with_ptex(true).with_tag("ptex")));
    for path in [
        "/world/cube0",
        "/world/cube1",
        "/world/cube2",
        "/world/smooth",
        "/world/pentagon",
        "/world/instanced",
    ] {
        index.insert_mesh(path);
    }

    run_frame(&mut index, &delegate, 1)?;

    // deform one cube and bump the refine level of another
    if let Some(cube) = delegate.mesh_mut("/world/cube1") {
        cube.set_primvar("points", Interpolation::Vertex, Value::Vec3fArray(cube_points(1.25)));
    }
    index.mark_rprim_dirty("/world/cube1", DirtyBits::DIRTY_POINTS);
    if let Some(cube) = delegate.mesh_mut("/world/cube2") {
        cube.display_style = DisplayStyle::default().with_refine_level(1);
    }
    index.mark_rprim_dirty("/world/cube2", DirtyBits::DIRTY_DISPLAY_STYLE);

    run_frame(&mut index, &delegate, 2)?;

    let stats = index.registry().stats();
    log::info!(
        "Registry: {} allocations, {} updates, {} migrations, {} sources, {} computations, {} commits",
        stats.allocations,
        stats.updates,
        stats.migrations,
        stats.sources,
        stats.computations,
        stats.commits
    );
    log::info!("Batch version: {}", index.change_tracker().batch_version());
    Ok(())
}
