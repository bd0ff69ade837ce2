pub mod backend;
pub mod binding;
pub mod policy;
pub mod token;
