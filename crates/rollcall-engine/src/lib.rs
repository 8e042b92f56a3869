//! rollcall-engine: Drives capture sessions from real timers and a recognizer.

pub mod driver;
pub mod recognizer;

pub use driver::CaptureDriver;
pub use recognizer::{CaptureContext, FixedRecognizer, Recognizer, RecognizerError};
