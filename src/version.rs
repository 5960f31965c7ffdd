/// Version of the software, as declared in the package manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
