mod chain;
mod manifest;
pub mod rules;
mod version_file;

pub use chain::{
    load_chain, load_merged, merge_chain, DescriptorSource, InMemorySource, LocalDirSource,
    RemoteSource,
};
pub use manifest::{LatestVersions, VersionEntry, VersionManifest, VERSION_MANIFEST_URL};
pub use rules::{evaluate, OsRule, Rule, RuleAction};
pub use version_file::{
    ArgumentEntry, ArgumentValue, Arguments, AssetIndexRef, ExtractRules, FileDownload,
    JavaVersionInfo, LibraryDownloads, LibraryRef, VersionDescriptor, VersionDownloads,
};
