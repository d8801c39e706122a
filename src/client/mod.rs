//! Studio client side of the gateway.
//!
//! The gallery and offline queue live in a local [`StateStore`](crate::storage::StateStore);
//! [`Studio`] ties them to a [`GenerationBackend`].
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod gallery;
mod queue;
mod studio;

pub use gallery::{Gallery, SavedImage, StorageInfo};
pub use queue::OfflineQueue;
pub use studio::{
    profile_session_id, GenerationBackend, HttpBackend, ReplayReport, Studio, SubmitMode,
    SubmitOutcome,
};
