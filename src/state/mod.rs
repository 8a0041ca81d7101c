//! State module for tracking harvest progress
//!
//! # Components
//!
//! - `WalkStop`: why a single page walk ended
//! - `ParentStatus`: whether a parent's child walk has completed (`unused`/`done`)

mod parent_status;
mod walk_stop;

// Re-export main types
pub use parent_status::ParentStatus;
pub use walk_stop::WalkStop;
