//! # Prelude
//!
//! Contains definitions that are useful to have global
//!
//! ## Examples
//!
//! ```
//! use treeseq::prelude::*;
//! ```

pub use crate::newtypes::*;
pub use crate::tables::*;
pub use crate::traits::*;
pub use crate::tree_position::*;
pub use crate::trees::*;
pub use crate::treeseq::*;
