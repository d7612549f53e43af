//! # eyephoto-meta
//!
//! Metadata for eye photos stored as JPEG: a person name, free-text fields, overlay
//! position and scale, brightness/contrast, orientation and a few capture flags, kept in
//! both the EXIF tags and the XMP packet of the file.
//!
//! ## Quick Start
//!
//! The write coordinator is the main entry point. Writes return immediately and are
//! applied in the background, one at a time per file, coalescing to the latest value:
//!
//! ```rust,no_run
//! use eyephoto_meta::config::{Config, SharedConfig};
//! use eyephoto_meta::coordinator::WriteCoordinator;
//! use eyephoto_meta::reconciler::JpegMetadataStore;
//! use eyephoto_meta::record::RightLeft;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // The write policy lives in the config and is re-read before every write
//!     let config = SharedConfig::new(Config::load(Some("config.json".as_ref()))?);
//!     let coordinator = WriteCoordinator::new(
//!         JpegMetadataStore,
//!         config.clone(),
//!         tokio::runtime::Handle::current(),
//!     );
//!
//!     let path = Path::new("eye.jpg");
//!     let mut record = coordinator.read(path).unwrap_or_default();
//!     record.right_left = Some(RightLeft::Left);
//!     record.x_center = Some(0.5);
//!     coordinator.write(path, record);
//!
//!     coordinator.flush_all().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Lower-Level Usage
//!
//! The reconciler reads and writes synchronously, without any scheduling:
//!
//! ```rust,no_run
//! use eyephoto_meta::config::WritePolicy;
//! use eyephoto_meta::reconciler::{read_record, write_record};
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let path = Path::new("eye.jpg");
//!
//!     // `None` for files that are not JPEGs
//!     let mut record = read_record(path).unwrap_or_default();
//!     record.title = Some("Right eye".into());
//!
//!     let outcome = write_record(path, &record, WritePolicy::PacketAndTags)?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```
//!
//! ## Where fields are stored
//!
//! | Field | EXIF | XMP |
//! |-------|------|-----|
//! | title | ImageDescription, XPTitle | `dc:title`, app namespace |
//! | description | | `dc:description`, app namespace |
//! | subject | XPSubject | `dc:subject`, app namespace |
//! | comment | UserComment, XPComment | `exif:UserComment`, app namespace |
//! | person | | MS Photo region `PersonDisplayName`, app namespace |
//! | orientation | Orientation | app namespace |
//! | everything else | | app namespace only |
//!
//! ## Modules
//!
//! - [`coordinator`] — Non-blocking, coalescing per-file write scheduling
//! - [`reconciler`] — Merging both stores into one record and writing it back
//! - [`record`] — The metadata record and its text encodings
//! - [`exif`] — EXIF tag store reading and writing
//! - [`xmp`] — XMP packet parsing, editing and serialization
//! - [`rewrite`] — Temp-file-and-rename file replacement
//! - [`container`] — JPEG detection and file collection
//! - [`config`] — Configuration types and loading/saving

pub mod config;
pub mod container;
pub mod coordinator;
pub mod error;
pub mod exif;
pub mod reconciler;
pub mod record;
pub mod rewrite;
pub mod xmp;

pub use error::{MetadataError, Result};
