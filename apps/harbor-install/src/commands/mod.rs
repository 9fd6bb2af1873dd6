//! Command modules for harbor-install.
//!
//! - [`install`] - Acquire the Harbor compiler and put it on PATH
//! - [`uninstall`] - Remove the installed binary

pub mod install;
pub mod uninstall;
