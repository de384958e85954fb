//! Secure multi-file composition: path jail, formats, reference resolver.

pub mod format;
pub mod jail;
pub mod resolver;

pub use format::DocFormat;
pub use jail::PathJail;
pub use resolver::{dump, load, load_with, Document, REF_KEY};
