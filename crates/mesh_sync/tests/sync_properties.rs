//! End-to-end sync behavior through the public API

use std::sync::Arc;

use mesh_sync::prelude::*;
use mesh_sync::scene::draw_item::slot;
use mesh_sync::sync::{DirtyBits, WarningKind};
use mesh_sync::tokens;
use nalgebra::Vector3;

fn cube_topology() -> MeshTopology {
    MeshTopology::new(
        SubdivScheme::CatmullClark,
        vec![4; 6],
        vec![0, 1, 3, 2, 2, 3, 5, 4, 4, 5, 7, 6, 6, 7, 1, 0, 1, 7, 5, 3, 6, 0, 2, 4],
    )
}

fn cube_points() -> Vec<Vector3<f32>> {
    vec![
        Vector3::new(-0.5, -0.5, 0.5),
        Vector3::new(0.5, -0.5, 0.5),
        Vector3::new(-0.5, 0.5, 0.5),
        Vector3::new(0.5, 0.5, 0.5),
        Vector3::new(-0.5, 0.5, -0.5),
        Vector3::new(0.5, 0.5, -0.5),
        Vector3::new(-0.5, -0.5, -0.5),
        Vector3::new(0.5, -0.5, -0.5),
    ]
}

fn cube(points: Vec<Vector3<f32>>) -> MeshData {
    MeshData::new(cube_topology())
        .with_primvar(tokens::POINTS, Interpolation::Vertex, Value::Vec3fArray(points))
        .with_material("/looks/cube")
}

fn serial_index() -> RenderIndex {
    RenderIndex::new(SyncConfig::default().with_parallel_sync(false))
}

#[test]
fn test_identical_topologies_share_one_instance() {
    let mut delegate = MemoryDelegate::new();
    delegate.insert_mesh("/a", cube(cube_points()));
    delegate.insert_mesh("/b", cube(cube_points()));

    let mut index = RenderIndex::new(SyncConfig::default());
    index.insert_mesh("/a");
    index.insert_mesh("/b");
    let reports = index.sync_all(&delegate, "refined");
    assert!(reports.iter().all(SyncReport::is_ok));

    let a = index.mesh_by_path("/a").expect("mesh a");
    let b = index.mesh_by_path("/b").expect("mesh b");
    assert_eq!(a.topology_id(), b.topology_id());
    let (ta, tb) = (a.topology().expect("topology a"), b.topology().expect("topology b"));
    assert!(Arc::ptr_eq(ta, tb));

    // identical points and topology land in one shared vertex range
    let (va, vb) = (
        a.shared_data().range(slot::VERTEX_PRIMVAR).expect("vertex a"),
        b.shared_data().range(slot::VERTEX_PRIMVAR).expect("vertex b"),
    );
    assert!(Arc::ptr_eq(va, vb));
    assert!(index.commit().is_ok());
}

#[test]
fn test_resync_without_dirty_bits_does_no_work() {
    let mut delegate = MemoryDelegate::new();
    delegate.insert_mesh("/cube", cube(cube_points()));

    let mut index = serial_index();
    index.insert_mesh("/cube");
    index.sync_all(&delegate, "refined");
    index.commit().expect("first commit");
    let before = index.registry().stats();

    index.mark_rprim_dirty("/cube", DirtyBits::DIRTY_VISIBILITY);
    let reports = index.sync_all(&delegate, "refined");
    assert_eq!(reports.len(), 1);

    let after = index.registry().stats();
    assert_eq!(before.allocations, after.allocations);
    assert_eq!(before.updates, after.updates);
    assert_eq!(before.sources, after.sources);
    assert_eq!(before.computations, after.computations);
}

#[test]
fn test_insufficient_points_blank_the_prim() {
    let mut delegate = MemoryDelegate::new();
    delegate.insert_mesh(
        "/cube",
        cube(cube_points()[..3].to_vec())
            .with_primvar("faceIds", Interpolation::Uniform, Value::IntArray(vec![0, 1, 2, 3, 4, 5])),
    );

    let mut index = serial_index();
    let key = index.insert_mesh("/cube");
    let reports = index.sync_all(&delegate, "refined");

    let report = &reports[0];
    assert!(matches!(
        report.error,
        Some(SyncError::InsufficientPoints { found: 3, expected: 8, .. })
    ));
    let mesh = index.mesh(key).expect("mesh");
    assert!(mesh.shared_data().range(slot::VERTEX_PRIMVAR).is_none());
    assert!(mesh.shared_data().range(slot::ELEMENT_PRIMVAR).is_none());

    // scene bits are still cleared; the next edit re-evaluates from scratch
    assert!(!index.change_tracker().rprim_dirty_bits(key).intersects(DirtyBits::ALL_SCENE_DIRTY_BITS));

    delegate
        .mesh_mut("/cube")
        .expect("cube")
        .set_primvar(tokens::POINTS, Interpolation::Vertex, Value::Vec3fArray(cube_points()));
    index.mark_rprim_dirty("/cube", DirtyBits::DIRTY_POINTS);
    let reports = index.sync_all(&delegate, "refined");
    assert!(reports[0].is_ok());
    assert!(index.mesh(key).expect("mesh").shared_data().range(slot::VERTEX_PRIMVAR).is_some());
}

#[test]
fn test_long_primvar_is_truncated() {
    let colors = vec![Vector3::new(1.0_f32, 0.0, 0.0); 10];
    let mut delegate = MemoryDelegate::new();
    delegate.insert_mesh(
        "/cube",
        cube(cube_points()).with_primvar("displayColor", Interpolation::Vertex, Value::Vec3fArray(colors)),
    );

    let mut index = serial_index();
    let key = index.insert_mesh("/cube");
    let reports = index.sync_all(&delegate, "refined");
    index.commit().expect("commit");

    let warnings: Vec<_> = reports[0].warnings_for("displayColor").collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, WarningKind::Truncated { found: 10, expected: 8 });

    let mesh = index.mesh(key).expect("mesh");
    let range = mesh.shared_data().range(slot::VERTEX_PRIMVAR).expect("vertex range");
    let color = range.resource("displayColor").expect("displayColor buffer");
    assert_eq!(color.num_elements(), 8);
}

#[test]
fn test_ptex_material_salts_topology_hash() {
    let mut delegate = MemoryDelegate::new();
    delegate.insert_mesh("/cube", cube(cube_points()));

    let mut index = serial_index();
    let key = index.insert_mesh("/cube");
    index.sync_all(&delegate, "refined");

    let mesh = index.mesh(key).expect("mesh");
    assert!(!mesh.use_quad_indices());
    let old_id = mesh.topology_id();
    let old_topology = Arc::clone(mesh.topology().expect("topology"));
    let old_hash = old_topology.compute_hash();

    index.insert_material("/looks/cube", Arc::new(Material::new().with_ptex(true)));
    index.sync_all(&delegate, "refined");

    let mesh = index.mesh(key).expect("mesh");
    assert!(mesh.use_quad_indices());
    assert_ne!(mesh.topology_id(), old_id);
    // the salt changes the id, not the shared value
    assert_eq!(old_topology.compute_hash(), old_hash);
    assert_eq!(mesh.topology().expect("topology").compute_hash(), old_hash);
}

#[test]
fn test_refine_level_change_schedules_subdivision() {
    let mut delegate = MemoryDelegate::new();
    delegate.insert_mesh("/cube", cube(cube_points()));

    let mut index = serial_index();
    let key = index.insert_mesh("/cube");
    index.sync_all(&delegate, "refined");
    assert!(!index.registry().pending_source_names().iter().any(|name| name == tokens::OSD_TOPOLOGY));
    index.commit().expect("coarse commit");

    let coarse = index.mesh(key).expect("mesh");
    assert_eq!(coarse.topology().expect("topology").refine_level(), 0);
    let coarse_id = coarse.topology_id();

    delegate.mesh_mut("/cube").expect("cube").display_style = DisplayStyle::default().with_refine_level(2);
    index.mark_rprim_dirty("/cube", DirtyBits::DIRTY_DISPLAY_STYLE);
    let reports = index.sync_all(&delegate, "refined");
    assert!(reports[0].is_ok());

    let refined = index.mesh(key).expect("mesh");
    assert_eq!(refined.topology().expect("topology").refine_level(), 2);
    assert_ne!(refined.topology_id(), coarse_id);
    assert!(index.registry().pending_source_names().iter().any(|name| name == tokens::OSD_TOPOLOGY));
    assert!(index.commit().is_ok());
}

#[test]
fn test_gpu_flat_normals_land_in_element_range() {
    let mut delegate = MemoryDelegate::new();
    delegate.insert_mesh("/cube", cube(cube_points()));

    let mut index = RenderIndex::new(SyncConfig::default().with_parallel_sync(false).with_gpu_compute(true));
    let key = index.insert_mesh("/cube");
    let reports = index.sync_all(&delegate, "hull");
    assert!(reports[0].is_ok());
    index.commit().expect("commit");

    let mesh = index.mesh(key).expect("mesh");
    let element = mesh.shared_data().range(slot::ELEMENT_PRIMVAR).expect("element range");
    let normals = element.resource(tokens::PACKED_FLAT_NORMALS).expect("flat normals");
    assert_eq!(normals.num_elements(), 6);
}

#[test]
fn test_parallel_sync_matches_serial() {
    let mut delegate = MemoryDelegate::new();
    for i in 0..16 {
        delegate.insert_mesh(format!("/cube{i}"), cube(cube_points()));
    }

    let mut parallel = RenderIndex::new(SyncConfig::default().with_parallel_sync(true));
    let mut serial = serial_index();
    for i in 0..16 {
        parallel.insert_mesh(&format!("/cube{i}"));
        serial.insert_mesh(&format!("/cube{i}"));
    }
    assert_eq!(parallel.sync_all(&delegate, "refined").len(), 16);
    assert_eq!(serial.sync_all(&delegate, "refined").len(), 16);

    let first = parallel.mesh_by_path("/cube0").expect("cube0").topology().cloned().expect("topology");
    for i in 1..16 {
        let mesh = parallel.mesh_by_path(&format!("/cube{i}")).expect("cube");
        assert!(Arc::ptr_eq(mesh.topology().expect("topology"), &first));
    }
    assert_eq!(
        parallel.mesh_by_path("/cube3").map(Mesh::topology_id),
        serial.mesh_by_path("/cube3").map(Mesh::topology_id)
    );
    assert!(parallel.commit().is_ok());
}

fn unit_quad(scheme: SubdivScheme) -> MeshData {
    let points = vec![
        Vector3::new(0.0_f32, 0.0, 0.0),
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(1.0, 1.0, 0.0),
        Vector3::new(0.0, 1.0, 0.0),
    ];
    MeshData::new(MeshTopology::new(scheme, vec![4], vec![0, 1, 2, 3]))
        .with_primvar(tokens::POINTS, Interpolation::Vertex, Value::Vec3fArray(points))
}

#[test]
fn test_unused_normals_leave_no_pending_bits() {
    let mut delegate = MemoryDelegate::new();
    delegate.insert_mesh("/none", unit_quad(SubdivScheme::None));
    delegate.insert_mesh("/bilinear", unit_quad(SubdivScheme::Bilinear));
    delegate.insert_mesh(
        "/flat",
        cube(cube_points()).with_display_style(DisplayStyle::default().with_refine_level(2).with_flat_shading(true)),
    );

    let mut index = serial_index();
    let keys: Vec<_> = ["/none", "/bilinear", "/flat"].iter().map(|path| index.insert_mesh(path)).collect();
    let reports = index.sync_all(&delegate, "refined");
    assert!(reports.iter().all(SyncReport::is_ok));

    for key in keys {
        assert_eq!(index.change_tracker().rprim_dirty_bits(key) - DirtyBits::VARYING, DirtyBits::empty());
    }
    assert!(index.sync_all(&delegate, "refined").is_empty());
}

#[test]
fn test_unrelated_edit_keeps_uncomputed_normals_range_shared() {
    let mut delegate = MemoryDelegate::new();
    delegate.insert_mesh("/a", unit_quad(SubdivScheme::None));
    delegate.insert_mesh("/b", unit_quad(SubdivScheme::None));

    let mut index = serial_index();
    index.insert_mesh("/a");
    index.insert_mesh("/b");
    index.sync_all(&delegate, "refined");
    index.commit().expect("first commit");
    let before = index.registry().stats();

    let shared = |index: &RenderIndex| {
        let a = index.mesh_by_path("/a").expect("mesh a").shared_data().range(slot::VERTEX_PRIMVAR).cloned();
        let b = index.mesh_by_path("/b").expect("mesh b").shared_data().range(slot::VERTEX_PRIMVAR).cloned();
        matches!((a, b), (Some(a), Some(b)) if Arc::ptr_eq(&a, &b))
    };
    assert!(shared(&index));

    index.mark_rprim_dirty("/a", DirtyBits::DIRTY_VISIBILITY);
    let reports = index.sync_all(&delegate, "refined");
    assert_eq!(reports.len(), 1);
    index.commit().expect("second commit");

    assert!(shared(&index));
    let after = index.registry().stats();
    assert_eq!(before.updates, after.updates);
    assert_eq!(before.sources, after.sources);
}
