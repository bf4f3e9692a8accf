pub mod error;
pub mod hash;
pub mod id;
pub mod types;
pub mod uri;
