use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::core::error::ManifestError;

/// Represents a fully parsed Maven coordinate.
///
/// Supported formats:
///   `groupId:artifactId:version`
///   `groupId:artifactId:version:classifier`
///   `groupId:artifactId:version:classifier@packaging`
///   `groupId:artifactId:version@packaging`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MavenArtifact {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub classifier: Option<String>,
    /// File extension / packaging type. Defaults to `"jar"`.
    pub packaging: String,
}

/// Identity of a library independent of its version: two libraries with the
/// same key are duplicates of each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LibraryKey {
    pub group_id: String,
    pub artifact_id: String,
    pub classifier: Option<String>,
}

impl fmt::Display for LibraryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.classifier {
            Some(c) => write!(f, "{}:{}:{}", self.group_id, self.artifact_id, c),
            None => write!(f, "{}:{}", self.group_id, self.artifact_id),
        }
    }
}

impl MavenArtifact {
    /// Parse a Maven coordinate string.
    ///
    /// # Examples
    /// ```
    /// use interface_engine::core::maven::MavenArtifact;
    ///
    /// let a = MavenArtifact::parse("net.sf.jopt-simple:jopt-simple:5.0.4").unwrap();
    /// assert_eq!(a.group_id, "net.sf.jopt-simple");
    /// ```
    pub fn parse(coord: &str) -> Result<Self, ManifestError> {
        // Split off @packaging first
        let (coord_part, packaging_override) = if let Some(idx) = coord.rfind('@') {
            (&coord[..idx], Some(&coord[idx + 1..]))
        } else {
            (coord, None)
        };

        let parts: Vec<&str> = coord_part.split(':').collect();
        if parts.iter().any(|p| p.trim().is_empty()) {
            return Err(ManifestError::InvalidCoordinate(coord.to_string()));
        }

        let packaging = packaging_override.unwrap_or("jar").to_string();
        match parts.len() {
            3 => Ok(Self {
                group_id: parts[0].to_string(),
                artifact_id: parts[1].to_string(),
                version: parts[2].to_string(),
                classifier: None,
                packaging,
            }),
            4 => Ok(Self {
                group_id: parts[0].to_string(),
                artifact_id: parts[1].to_string(),
                version: parts[2].to_string(),
                classifier: Some(parts[3].to_string()),
                packaging,
            }),
            _ => Err(ManifestError::InvalidCoordinate(coord.to_string())),
        }
    }

    /// Construct the group path portion (`net/sf/jopt-simple`).
    pub fn group_path(&self) -> String {
        self.group_id.replace('.', "/")
    }

    /// Build the artifact filename.
    ///
    /// `artifactId-version[-classifier].packaging`
    pub fn filename(&self) -> String {
        match &self.classifier {
            Some(c) => format!(
                "{}-{}-{}.{}",
                self.artifact_id, self.version, c, self.packaging
            ),
            None => format!("{}-{}.{}", self.artifact_id, self.version, self.packaging),
        }
    }

    /// Construct the full URL for this artifact under the given repository base.
    ///
    /// Template:
    /// `<repo>/<group_path>/<artifact_id>/<version>/<filename>`
    pub fn url(&self, repo_base: &str) -> String {
        let base = repo_base.trim_end_matches('/');
        format!(
            "{}/{}/{}/{}/{}",
            base,
            self.group_path(),
            self.artifact_id,
            self.version,
            self.filename()
        )
    }

    /// Return a copy with a different classifier (e.g. a native variant).
    pub fn with_classifier(&self, classifier: &str) -> Self {
        let mut clone = self.clone();
        clone.classifier = Some(classifier.to_string());
        clone
    }

    pub fn key(&self) -> LibraryKey {
        LibraryKey {
            group_id: self.group_id.clone(),
            artifact_id: self.artifact_id.clone(),
            classifier: self.classifier.clone(),
        }
    }

    /// Order two artifacts by their version strings.
    pub fn cmp_version(&self, other: &Self) -> Ordering {
        compare_versions(&self.version, &other.version)
    }
}

impl fmt::Display for MavenArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.classifier {
            Some(c) => write!(
                f,
                "{}:{}:{}:{}",
                self.group_id, self.artifact_id, self.version, c
            ),
            None => write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version),
        }
    }
}

fn parse_numeric_version_parts(raw: &str) -> Vec<u32> {
    raw.split(|c: char| !c.is_ascii_digit())
        .filter(|segment| !segment.is_empty())
        .filter_map(|segment| segment.parse::<u32>().ok())
        .collect()
}

/// Compare version strings by their numeric segments (`3.3.10 > 3.3.9`).
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let a_parts = parse_numeric_version_parts(a);
    let b_parts = parse_numeric_version_parts(b);

    let max_len = a_parts.len().max(b_parts.len());
    for idx in 0..max_len {
        let a_val = a_parts.get(idx).copied().unwrap_or(0);
        let b_val = b_parts.get(idx).copied().unwrap_or(0);
        match a_val.cmp(&b_val) {
            Ordering::Equal => continue,
            non_eq => return non_eq,
        }
    }

    // Deterministic tiebreaker for versions with identical numeric parts.
    a.cmp(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_coordinate() {
        let a = MavenArtifact::parse("net.sf.jopt-simple:jopt-simple:5.0.4").unwrap();
        assert_eq!(a.group_id, "net.sf.jopt-simple");
        assert_eq!(a.artifact_id, "jopt-simple");
        assert_eq!(a.version, "5.0.4");
        assert_eq!(a.classifier, None);
        assert_eq!(a.packaging, "jar");
    }

    #[test]
    fn parse_with_classifier() {
        let a = MavenArtifact::parse("org.lwjgl:lwjgl:3.3.3:natives-windows").unwrap();
        assert_eq!(a.classifier, Some("natives-windows".to_string()));
        assert_eq!(a.key().to_string(), "org.lwjgl:lwjgl:natives-windows");
    }

    #[test]
    fn parse_rejects_short_and_blank_coordinates() {
        assert!(MavenArtifact::parse("org.lwjgl:lwjgl").is_err());
        assert!(MavenArtifact::parse("org.lwjgl::3.3.3").is_err());
    }

    #[test]
    fn url_construction() {
        let a = MavenArtifact::parse("net.sf.jopt-simple:jopt-simple:5.0.4").unwrap();
        let url = a.url("https://libraries.minecraft.net/");
        assert_eq!(
            url,
            "https://libraries.minecraft.net/net/sf/jopt-simple/jopt-simple/5.0.4/jopt-simple-5.0.4.jar"
        );
    }

    #[test]
    fn versions_compare_numerically() {
        assert_eq!(compare_versions("3.3.10", "3.3.9"), Ordering::Greater);
        assert_eq!(compare_versions("2.0", "1.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.0", "1.0.0"), Ordering::Less);
        assert_eq!(compare_versions("9.7.1", "9.7.1"), Ordering::Equal);
    }
}
