//! Stand-ins for the certificate and NFC providers. Both hand back a
//! [`Task`] so a real provider can replace them without touching callers.

pub mod certificate;
pub mod nfc;
pub mod task;

pub use certificate::{CertificateIssuer, CertificateRequest, SimulatedCertificateIssuer};
pub use nfc::{SimulatedTagReader, TagReader};
pub use task::{Task, TaskStatus};
