//! Static content host for the money-transfer page
//!
//! Serves one HTML document at `/` and `/index.html` and answers 404 for
//! everything else. The port is held through a [`PortLease`] for as long as
//! the [`HostHandle`] lives, and released by [`HostHandle::stop`].

pub mod error;
pub mod lease;
pub mod server;
pub mod static_files;

pub use error::{HostError, HostResult};
pub use lease::PortLease;
pub use server::{HostConfig, HostHandle};
pub use static_files::StaticDocument;

/// Port the host listens on unless told otherwise
pub const DEFAULT_PORT: u16 = 3000;

/// The transfer page shipped with this crate
pub const DEFAULT_DOCUMENT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/assets/transfer-page.html");
