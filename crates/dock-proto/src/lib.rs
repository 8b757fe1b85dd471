//! Types shared by the background daemon and every page: the wire protocol,
//! the snapshot data model, dock settings and the small data-shaping helpers
//! (title convention, icon resolution) both sides agree on.

pub mod config;
pub mod icon;
pub mod platform;
pub mod protocol;
pub mod settings;
pub mod title;
