mod args;
mod classpath;
mod spec;

pub use args::{legacy_jvm_arguments, substitute, substitute_all, PlaceholderValues};
pub use classpath::{build_classpath, extract_natives, safe_path_str, Classpath};
pub use spec::{compose, ComposeOptions, Composition, LaunchSpec};
