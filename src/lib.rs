pub mod anchors;
pub mod cancel;
pub mod eigen;
pub mod error;
pub mod force;
pub mod freeviz;
pub mod heuristics;
pub mod projection;

pub use anchors::{Anchor, AnchorSet, RestraintMode};
pub use cancel::CancelToken;
pub use eigen::{EigenProjection, EigenProjector, EigenProjectorBuilder, ProjectionSource};
pub use error::{ErrorKind, FreeVizError, Result};
pub use force::{ForceLaw, ForceOptimizer, Implementation, OptimizerConfig, StepResult};
pub use freeviz::{
    FreeViz, FreeVizBuilder, OptimizeReport, OptimizeStatus, PlateauDetector, Progress,
    DEFAULT_SWEEP_BUDGET,
};
pub use heuristics::{
    rank_by_signal_to_noise, AttributeRankingCache, ClassBalancedLayout, RankedAttributes,
};
pub use projection::{project, ProjectionDataProvider, ProjectionInput, ScaledData};
