//! Serialized module images and compiled method bodies.
//!
//! The host hands the load hook one serialized module at a time. A module
//! image is a flat container of named methods ([`ModuleImage`]); each method
//! carries a descriptor string and an encoded body ([`MethodBody`]) with a
//! tiny or fat header, the instruction bytes and an optional exception
//! handler section.
//!
//! Bodies are owned exclusively by the transformation currently rewriting
//! them and round-trip byte-exactly when left unmodified, so the interceptor
//! can re-encode a module after patching a single method without disturbing
//! the rest.

mod body;
mod module;

pub use body::{ExceptionHandler, MethodBody, MethodBodyFlags, SectionFlags};
pub use module::{MethodEntry, ModuleImage, MODULE_FORMAT_VERSION, MODULE_MAGIC};
