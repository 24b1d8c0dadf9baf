//! MockupFE: place overlay marks on a base image, heal painted regions and
//! export a flattened mockup at native resolution.

pub mod logger;

pub mod canvas;
pub mod cli;
pub mod error;
pub mod io;
pub mod ops;
pub mod project;
pub mod settings;
pub mod viewport;

pub use canvas::{HoleMask, PixelBuffer, Region};
pub use error::{EditError, EditResult};
pub use project::EditorSession;
