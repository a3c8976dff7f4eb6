//! Pipeline stages for one conversion request.
//!
//! Each submodule implements exactly one step of the request lifecycle and is
//! testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! workspace ──▶ engine ──▶ locate ──▶ store
//! (scratch dir)  (soffice)  (scan dir)  (data/YYYYMMDD)
//! ```
//!
//! 1. [`workspace`]: create and remove `<tmp>/work_<uuid>`
//! 2. [`engine`]: run the converter and classify its outcome; the only
//!    stage that spawns processes
//! 3. [`locate`]: find the produced file among whatever the engine left
//! 4. [`store`]: copy the result into durable, date-partitioned storage
//!    and resolve download identifiers back to files

pub mod engine;
pub mod locate;
pub mod store;
pub mod workspace;
