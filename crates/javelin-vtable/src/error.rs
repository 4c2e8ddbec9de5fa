use thiserror::Error;

pub type Result<T> = std::result::Result<T, VtableError>;

/// Internal-consistency failures of a table build.
///
/// Both variants signal a defect upstream of this crate (a cyclic interface
/// graph the analysis should have rejected, or a lowering-order bug), never a
/// user-program error. There is no transient failure mode: a build that hits
/// one is abandoned whole, since every table can depend on any other.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum VtableError {
    #[error("merge depth exceeded while folding dispatch tables near {class}")]
    MergeDepthExceeded { class: String },
    #[error("re-entrant resolution of dispatch table for {class}")]
    ReentrantResolution { class: String },
}
