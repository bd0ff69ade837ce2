pub mod binder;

pub use binder::{BindError, Binding, ResponseBinder, hash_output};
