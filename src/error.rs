use thiserror::Error;

use crate::convert::ConversionPhase;
use crate::scene::HostError;

/// Preconditions checked before any scene mutation. Nothing needs rolling back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please select a valid skeleton.")]
    NoSkeleton,

    #[error("No meshes are bound to skeleton '{skeleton}'.")]
    NoBoundMeshes { skeleton: String },

    #[error(
        "No valid joints specified for skeleton '{skeleton}'. Run bone detection first or specify joints manually."
    )]
    NoResolvedJoints { skeleton: String },
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A single mesh failed; the rest of the batch keeps going.
    #[error("mesh '{mesh}' failed during {phase}: {reason}")]
    PerMesh {
        mesh: String,
        phase: ConversionPhase,
        reason: String,
    },

    #[error("ordering violation: cannot move from {from} to {to}")]
    OrderingViolation {
        from: ConversionPhase,
        to: ConversionPhase,
    },

    #[error("host rejected {operation} on '{target}': {source}")]
    HostOperation {
        operation: &'static str,
        target: String,
        #[source]
        source: HostError,
    },

    #[error("transform chain of joint '{joint}' is not invertible")]
    NonInvertibleTransform { joint: String },

    #[error("skeleton '{skeleton}' is already being converted")]
    SkeletonBusy { skeleton: String },
}

impl ConvertError {
    pub(crate) fn host(operation: &'static str, target: impl Into<String>, source: HostError) -> Self {
        ConvertError::HostOperation {
            operation,
            target: target.into(),
            source,
        }
    }
}
