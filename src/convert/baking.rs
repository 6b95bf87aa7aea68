use super::types::ConversionPhase;
use crate::error::ConvertError;
use crate::scene::{BindingId, MeshId, SceneHost, SkeletonId};
use crate::{log_debug, log_info};

/// A mesh whose posed shape has been baked into its base geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct BakedMesh {
    pub mesh: MeshId,
    pub mesh_name: String,
    /// The live binding left on the mesh after baking.
    pub binding: BindingId,
}

fn mesh_failure(mesh_name: &str, phase: ConversionPhase, reason: impl ToString) -> ConvertError {
    ConvertError::PerMesh {
        mesh: mesh_name.to_string(),
        phase,
        reason: reason.to_string(),
    }
}

/// Gives `mesh` its own copy of its geometry when other objects share it.
pub(super) fn fork_shared_data(
    host: &mut impl SceneHost,
    mesh: MeshId,
    mesh_name: &str,
    phase: ConversionPhase,
) -> Result<(), ConvertError> {
    let users = host
        .mesh_data_users(mesh)
        .map_err(|source| mesh_failure(mesh_name, phase, source))?;
    if users > 1 {
        log_info!(
            "Making mesh data single-user for '{}' (current users: {})",
            mesh_name,
            users
        );
        host.make_mesh_data_single_user(mesh)
            .map_err(|source| mesh_failure(mesh_name, phase, source))?;
    }
    Ok(())
}

/// Bakes the current pose into a mesh without blend shapes.
///
/// Shared geometry is copied first so sibling objects keep their data. A
/// duplicate of the skin binding is applied permanently; the original stays
/// live and becomes an identity deformation once the rest pose is committed.
///
/// # Errors
///
/// [`ConvertError::PerMesh`] when the mesh has no binding to `skeleton` or
/// the host refuses the ownership fork or the apply.
pub fn bake_pose_into_mesh(
    host: &mut impl SceneHost,
    skeleton: SkeletonId,
    mesh: MeshId,
) -> Result<BakedMesh, ConvertError> {
    let phase = ConversionPhase::PreCommitCapture;
    let mesh_name = host
        .mesh_name(mesh)
        .map_err(|source| ConvertError::host("mesh_name", format!("{:?}", mesh), source))?;
    log_info!("Processing mesh '{}' without shape keys...", mesh_name);

    let binding = host
        .find_binding(mesh, skeleton)
        .map_err(|source| mesh_failure(&mesh_name, phase, source))?
        .ok_or_else(|| mesh_failure(&mesh_name, phase, "no skin binding to the skeleton"))?;

    fork_shared_data(host, mesh, &mesh_name, phase)?;

    let duplicate = host
        .duplicate_skin_binding(mesh, binding)
        .map_err(|source| mesh_failure(&mesh_name, phase, source))?;
    log_debug!("Duplicated binding {:?} as {:?}", binding, duplicate);
    host.apply_binding_permanently(mesh, duplicate)
        .map_err(|source| {
            mesh_failure(
                &mesh_name,
                phase,
                format!(
                    "{}; duplicated binding {:?} was left on the mesh and must be removed by hand",
                    source, duplicate
                ),
            )
        })?;
    log_info!("Successfully baked mesh '{}' without shape keys", mesh_name);

    Ok(BakedMesh {
        mesh,
        mesh_name,
        binding,
    })
}

/// Post-commit check that the original binding survived the bake.
pub fn finalize_baked_mesh(
    host: &impl SceneHost,
    skeleton: SkeletonId,
    baked: &BakedMesh,
) -> Result<(), ConvertError> {
    let phase = ConversionPhase::PostCommitRebuild;
    let current = host
        .find_binding(baked.mesh, skeleton)
        .map_err(|source| mesh_failure(&baked.mesh_name, phase, source))?;
    if current != Some(baked.binding) {
        return Err(mesh_failure(
            &baked.mesh_name,
            phase,
            "original skin binding is no longer attached",
        ));
    }
    Ok(())
}
