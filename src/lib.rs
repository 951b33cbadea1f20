// Visibility-aware spray path planning
pub mod geometry;
pub mod kernel;
pub mod patch;
pub mod section;
pub mod config;
pub mod surface_visibility;
pub mod planes;
pub mod path;
pub mod extraction;
pub mod units;
pub mod trajectory;
pub mod path_visibility;
pub mod processor;
pub mod render;

// Re-export commonly used types
pub use geometry::{BoundingBox, Plane, Point3D, Triangle, Vector3D};
pub use kernel::{PatchRef, SectionCurve, Shape, SurfacePatch};
pub use patch::{MeshPatch, PatchError};
pub use config::SprayConfig;
pub use path::{ConnectionPath, IntegratedTrajectory, PathPoint, PointKind, SprayPath};
pub use path_visibility::{PathVisibilityInfo, SurfaceLayer};
pub use surface_visibility::PatchVisibility;
pub use planes::CuttingPlane;
pub use processor::SprayProcessor;

/// Main result type for the planner
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the planner
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No model loaded or model has no surface patches")]
    EmptyModel,

    #[error("No visible surface patches along the spray direction")]
    NoVisiblePatches,

    #[error("Bounding box of the working patch set is void")]
    VoidBoundingBox,

    #[error("No cutting planes available")]
    NoCuttingPlanes,

    #[error("No spray paths available")]
    NoPaths,

    #[error("Stage called out of order: {0}")]
    StageOrder(String),

    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
