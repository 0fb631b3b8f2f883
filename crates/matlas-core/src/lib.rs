//! matlas core: resource model, identities, secrets and validation.

pub mod alert;
pub mod error;
pub mod ir;
pub mod resources;
pub mod secret;
pub mod validation;

pub use alert::*;
pub use error::{Error, ErrorKind, Result};
pub use ir::*;
pub use resources::*;
pub use secret::{digest_hex, Secret, MASKED_SENTINEL};
pub use validation::*;
