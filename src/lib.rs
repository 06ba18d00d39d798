//! PaintFX: raster pixmap transforms, colour effects and an undoable
//! command layer for a paint program's document.
//!
//! * `pixmap`, `color`, `geometry` and `dimensions` are the data model.
//! * `ops` holds the pure image operations (transform engine, effects, wash,
//!   shapes, autocrop, text).
//! * `commands` wraps them as undoable `Command`s recorded by
//!   `components::history::HistoryManager`.
//! * `components::tools` turns pointer gestures into commands.

#![allow(clippy::too_many_arguments)]

#[macro_use]
pub mod logger;

pub mod cli;
pub mod color;
pub mod commands;
pub mod components;
pub mod config;
pub mod dimensions;
pub mod document;
pub mod geometry;
pub mod io;
pub mod ops;
pub mod pixmap;
pub mod selection;
