use thiserror::Error;

/// Broad classes of failure.
///
/// `Data` and `Numeric` errors never leave an [`AnchorSet`](crate::anchors::AnchorSet)
/// half-updated; interactive callers can treat them as "nothing changed, skip this frame".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Data,
    Numeric,
}

#[derive(Debug, Error)]
pub enum FreeVizError {
    #[error("no data")]
    NoData,

    #[error("no attributes are shown")]
    NoAttributes,

    #[error("no valid examples remain after removing examples with missing values")]
    NoValidExamples,

    #[error("a discrete class variable is required")]
    DiscreteClassRequired,

    #[error("at least two classes must be present, found {0}")]
    SingleClass(usize),

    #[error("attribute `{0}` is not known to the data provider")]
    UnknownAttribute(String),

    #[error("duplicate anchor label `{0}`")]
    DuplicateLabel(String),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("singular matrix: {0}")]
    SingularMatrix(String),

    #[error("all gradient components are zero")]
    ZeroGradient,

    #[error("all anchors lie at the origin")]
    DegenerateAnchors,

    #[error("data provider failed: {0}")]
    Provider(#[from] anyhow::Error),
}

impl FreeVizError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FreeVizError::NoData
            | FreeVizError::NoAttributes
            | FreeVizError::NoValidExamples
            | FreeVizError::DiscreteClassRequired
            | FreeVizError::SingleClass(_)
            | FreeVizError::UnknownAttribute(_)
            | FreeVizError::DuplicateLabel(_)
            | FreeVizError::DimensionMismatch { .. }
            | FreeVizError::Provider(_) => ErrorKind::Data,
            FreeVizError::SingularMatrix(_)
            | FreeVizError::ZeroGradient
            | FreeVizError::DegenerateAnchors => ErrorKind::Numeric,
        }
    }
}

pub type Result<T> = std::result::Result<T, FreeVizError>;
