//! Admin and upload-test front ends, usable against a local store or a
//! remote server through [`RemoteClient`].

pub mod admin;
pub mod remote;
pub mod upload;

pub use admin::{AdminView, Chip, ChipState, FixedCheckbox, Modal, Notice, NoticeKind};
pub use remote::RemoteClient;
pub use upload::{FileSelection, ResultModal, SubmitOutcome, UploadTestView};
