//! tracksync library - keeps a local music folder in step with a remote
//! library or playlist.

pub mod artwork;
pub mod catalog;
pub mod cleanup;
pub mod error;
pub mod loudness;
pub mod matcher;
pub mod models;
pub mod normalize;
pub mod postprocess;
pub mod progress;
pub mod safety;
pub mod source;
pub mod sync;
pub mod tags;
pub mod track;
