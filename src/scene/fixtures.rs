//! Test scenes shared by the unit tests.

use nalgebra::{Matrix4, Point3, Translation3};

use super::{MemoryScene, MeshId, SceneHost, SkeletonId};

pub(crate) const BODY_VERTICES: [[f32; 3]; 4] = [
    [0.0, 0.0, 1.0],
    [0.5, 0.0, 1.5],
    [-0.5, 0.0, 1.5],
    [0.2, 0.0, 1.5],
];

pub(crate) const FACE_VERTICES: [[f32; 3]; 3] = [[0.0, 0.0, 1.7], [0.02, 0.0, 1.7], [0.6, 0.0, 1.5]];

/// `Rig` with a `spine` root and the four arm joints.
///
/// Heads: `shoulder.l` (0.1, 0, 1.5), `upperarm.l` (0.25, 0, 1.5), mirrored on the right.
pub(crate) fn rig_scene() -> (MemoryScene, SkeletonId) {
    let mut scene = MemoryScene::new();
    let skeleton = scene.add_skeleton("Rig", Matrix4::identity());
    let joints: [(&str, Option<&str>, [f32; 3]); 5] = [
        ("spine", None, [0.0, 0.0, 1.4]),
        ("shoulder.l", Some("spine"), [0.1, 0.0, 0.1]),
        ("upperarm.l", Some("shoulder.l"), [0.15, 0.0, 0.0]),
        ("shoulder.r", Some("spine"), [-0.1, 0.0, 0.1]),
        ("upperarm.r", Some("shoulder.r"), [-0.15, 0.0, 0.0]),
    ];
    for (name, parent, [x, y, z]) in joints {
        scene
            .add_joint(
                skeleton,
                name,
                parent,
                Translation3::new(x, y, z).to_homogeneous(),
            )
            .expect("fixture joint");
    }
    (scene, skeleton)
}

fn points<const N: usize>(raw: [[f32; 3]; N]) -> Vec<Point3<f32>> {
    raw.iter().map(|[x, y, z]| Point3::new(*x, *y, *z)).collect()
}

fn influence(joint: &str) -> Vec<(String, f32)> {
    vec![(joint.to_string(), 1.0)]
}

/// `Body`: no blend shapes, one vertex per arm joint plus one on the spine.
pub(crate) fn add_body(scene: &mut MemoryScene, skeleton: SkeletonId) -> MeshId {
    let data = scene.add_mesh_data(
        "BodyData",
        points(BODY_VERTICES),
        vec![
            influence("spine"),
            influence("upperarm.l"),
            influence("upperarm.r"),
            influence("shoulder.l"),
        ],
    );
    let mesh = scene.add_mesh_object("Body", data);
    scene.bind(mesh, skeleton).expect("fixture binding");
    mesh
}

/// `Face`: `Basis`, `Smile` and `Blink`. The expression shapes only move spine-bound vertices.
pub(crate) fn add_face(scene: &mut MemoryScene, skeleton: SkeletonId) -> MeshId {
    let base = points(FACE_VERTICES);
    let data = scene.add_mesh_data(
        "FaceData",
        base.clone(),
        vec![influence("spine"), influence("spine"), influence("upperarm.l")],
    );
    let mesh = scene.add_mesh_object("Face", data);
    scene.bind(mesh, skeleton).expect("fixture binding");

    let mut smile = base.clone();
    smile[0] += nalgebra::Vector3::new(0.0, 0.05, 0.01);
    let mut blink = base.clone();
    blink[1] += nalgebra::Vector3::new(0.0, 0.0, -0.01);

    scene.add_blend_shape(mesh, "Basis", base).expect("basis");
    scene.add_blend_shape(mesh, "Smile", smile).expect("smile");
    scene.add_blend_shape(mesh, "Blink", blink).expect("blink");
    mesh
}

/// Offset `Flex` applies to the `upperarm.l`-bound vertex of `Face`.
pub(crate) const FLEX_DELTA: [f32; 3] = [0.0, 0.0, 0.05];

/// Appends `Flex` to `Face`, the one shape that moves a vertex on the rotated arm.
pub(crate) fn add_flex_shape(scene: &mut MemoryScene, face: MeshId) {
    let mut flex = points(FACE_VERTICES);
    let [x, y, z] = FLEX_DELTA;
    flex[2] += nalgebra::Vector3::new(x, y, z);
    scene.add_blend_shape(face, "Flex", flex).expect("flex");
}

pub(crate) fn max_distance(a: &[Point3<f32>], b: &[Point3<f32>]) -> f32 {
    assert_eq!(a.len(), b.len(), "vertex count differs");
    a.iter()
        .zip(b)
        .map(|(left, right)| (left - right).norm())
        .fold(0.0, f32::max)
}
