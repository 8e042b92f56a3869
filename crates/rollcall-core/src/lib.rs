//! rollcall-core: Attendance records, capture sessions and export.
//!
//! Everything here is pure: no I/O, no timers. Persistence lives in
//! `rollcall-store`, the timer/recognizer wiring in `rollcall-engine`.

pub mod export;
pub mod filter;
pub mod session;
pub mod summary;
pub mod types;

pub use export::{serialize, ExportError, ExportFormat, ExportName, ExportPayload};
pub use filter::{MethodFilter, RecordFilter};
pub use session::{
    CaptureSession, CaptureState, ResolveEffect, SessionConfig, SessionSnapshot, SessionToken,
    TickEffect,
};
pub use summary::AttendanceSummary;
pub use types::{
    AttendanceRecord, Identity, Method, ParseError, RecognitionOutcome, Status, ValidationError,
};
