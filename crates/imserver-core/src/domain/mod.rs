//! Domain types for the input-method server.
//!
//! This module contains pure data and rules with no I/O.
//!
//! # What lives here? (for beginners)
//!
//! - **`geometry`** – integer points and rectangles in screen coordinates.
//! - **`toolbar`** – the *global toolbar id*. Every input context numbers its
//!   own toolbars from 0, so two widgets in two applications can both say
//!   "toolbar 5". The server makes the id globally unique by pairing the
//!   local number with the identity of the connection it came from.
//! - **`widget_state`** – the attribute snapshot a widget pushes whenever its
//!   focus, text or toolbar changes, with typed accessors that report absence
//!   through `Option` instead of an error.

pub mod geometry;
pub mod toolbar;
pub mod widget_state;
