// ─── Argument Templates ───
// `${name}` substitution for JVM and game argument templates.

use std::collections::BTreeMap;

use crate::core::error::CompositionError;
use crate::core::version::{ArgumentEntry, ArgumentValue, Rule};

/// Values available to `${name}` placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceholderValues {
    values: BTreeMap<String, String>,
}

impl PlaceholderValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

/// Replace every `${name}` in `template`. Text without a closing brace is
/// kept as-is; a known-shaped placeholder with no value is an error.
pub fn substitute(template: &str, values: &PlaceholderValues) -> Result<String, CompositionError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };

        let name = &after[..end];
        match values.get(name) {
            Some(value) => out.push_str(value),
            None => {
                return Err(CompositionError::UnresolvedPlaceholder {
                    placeholder: name.to_string(),
                    argument: template.to_string(),
                })
            }
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

pub fn substitute_all(
    templates: &[String],
    values: &PlaceholderValues,
) -> Result<Vec<String>, CompositionError> {
    templates.iter().map(|t| substitute(t, values)).collect()
}

/// JVM arguments for documents that declare none (pre-1.13).
pub fn legacy_jvm_arguments() -> Vec<ArgumentEntry> {
    let plain = |arg: &str| ArgumentEntry::Plain(arg.to_string());
    vec![
        ArgumentEntry::Conditional {
            rules: vec![Rule::allow().for_os("osx")],
            value: ArgumentValue::Single("-XstartOnFirstThread".into()),
        },
        ArgumentEntry::Conditional {
            rules: vec![Rule::allow().for_os("windows")],
            value: ArgumentValue::Single(
                "-XX:HeapDumpPath=MojangTricksIntelDriversForPerformance_javaw.exe_minecraft.exe.heapdump"
                    .into(),
            ),
        },
        ArgumentEntry::Conditional {
            rules: vec![Rule::allow().for_arch("x86")],
            value: ArgumentValue::Single("-Xss1M".into()),
        },
        plain("-Djava.library.path=${natives_directory}"),
        plain("-Dminecraft.launcher.brand=${launcher_name}"),
        plain("-Dminecraft.launcher.version=${launcher_version}"),
        plain("-cp"),
        plain("${classpath}"),
    ]
}
