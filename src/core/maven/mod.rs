mod artifact;

pub use artifact::{compare_versions, LibraryKey, MavenArtifact};

/// Default repository for libraries that only carry a coordinate.
pub const MOJANG_LIBRARIES: &str = "https://libraries.minecraft.net";
