//! Report form module
//!
//! The submission side of the flow: which video is attached, where it was
//! taken, and how the finished report leaves the form.

pub mod form;
pub mod location;
pub mod submit;

pub use form::{InputMode, ReportForm, SelectionOutcome};
pub use location::{Coordinates, FixedLocation, LocationError, LocationProvider, NoLocation};
pub use submit::{
    DryRunSubmitter, ProgressReporter, Report, ReportSubmitter, SubmissionReceipt, SubmitError,
    UploadProgress,
};
