//! Page side of the bookmark dock: the per-page state machine, its render
//! model, and the connection to the background daemon.

pub mod client;
pub mod controller;
pub mod geometry;
pub mod host;
pub mod layout;
pub mod menu;
pub mod view;
