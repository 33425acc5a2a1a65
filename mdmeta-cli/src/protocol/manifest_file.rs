//! Manifest loading from YAML, JSON, or TOML files.
//!
//! A manifest document is either an ordered list of stage entries or a
//! name-keyed mapping; for mappings, document order is preserved and the
//! key becomes the stage name.

use std::path::Path;

use anyhow::{Context, Result, bail};

use mdmeta_protocol::{Manifest, ManifestEntry};

pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let manifest = match ext.as_str() {
        "yaml" | "yml" => from_yaml(&content)?,
        "json" => from_json(&content)?,
        "toml" => from_toml(&content)?,
        other => bail!(
            "Unsupported manifest format '.{}' (expected .yaml, .yml, .json, or .toml)",
            other
        ),
    };
    Ok(manifest)
}

fn from_yaml(content: &str) -> Result<Manifest> {
    let doc: serde_yaml::Value = serde_yaml::from_str(content).context("Invalid YAML manifest")?;
    match doc {
        serde_yaml::Value::Sequence(items) => {
            let entries = items
                .into_iter()
                .map(|v| serde_yaml::from_value::<ManifestEntry>(v).map_err(Into::into))
                .collect::<Result<Vec<_>>>()?;
            Ok(Manifest::from_entries(entries)?)
        }
        serde_yaml::Value::Mapping(map) => {
            let pairs = map
                .into_iter()
                .map(|(key, value)| {
                    let name = key
                        .as_str()
                        .map(str::to_string)
                        .context("Manifest mapping keys must be strings")?;
                    let entry: ManifestEntry = serde_yaml::from_value(value)?;
                    Ok((name, entry))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Manifest::from_named(pairs)?)
        }
        _ => bail!("Manifest must be a list of stages or a name-keyed mapping"),
    }
}

fn from_json(content: &str) -> Result<Manifest> {
    let doc: serde_json::Value = serde_json::from_str(content).context("Invalid JSON manifest")?;
    match doc {
        serde_json::Value::Array(items) => {
            let entries = items
                .into_iter()
                .map(|v| serde_json::from_value::<ManifestEntry>(v).map_err(Into::into))
                .collect::<Result<Vec<_>>>()?;
            Ok(Manifest::from_entries(entries)?)
        }
        serde_json::Value::Object(map) => {
            let pairs = map
                .into_iter()
                .map(|(name, value)| {
                    let entry: ManifestEntry = serde_json::from_value(value)?;
                    Ok((name, entry))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Manifest::from_named(pairs)?)
        }
        _ => bail!("Manifest must be a list of stages or a name-keyed mapping"),
    }
}

fn from_toml(content: &str) -> Result<Manifest> {
    let doc: toml::Value = toml::from_str(content).context("Invalid TOML manifest")?;
    match doc {
        toml::Value::Array(items) => {
            let entries = items
                .into_iter()
                .map(|v| ManifestEntry::deserialize_from(v))
                .collect::<Result<Vec<_>>>()?;
            Ok(Manifest::from_entries(entries)?)
        }
        toml::Value::Table(map) => {
            // A TOML table of tables is the name-keyed form; `[[stages]]`
            // arrays also arrive as a single-key table.
            if map.len() == 1 {
                if let Some((_, toml::Value::Array(items))) = map.iter().next() {
                    let entries = items
                        .iter()
                        .cloned()
                        .map(ManifestEntry::deserialize_from)
                        .collect::<Result<Vec<_>>>()?;
                    return Ok(Manifest::from_entries(entries)?);
                }
            }
            let pairs = map
                .into_iter()
                .map(|(name, value)| Ok((name, ManifestEntry::deserialize_from(value)?)))
                .collect::<Result<Vec<_>>>()?;
            Ok(Manifest::from_named(pairs)?)
        }
        _ => bail!("Manifest must be a list of stages or a name-keyed mapping"),
    }
}

trait DeserializeFromToml: Sized {
    fn deserialize_from(value: toml::Value) -> Result<Self>;
}

impl DeserializeFromToml for ManifestEntry {
    fn deserialize_from(value: toml::Value) -> Result<Self> {
        Ok(value.try_into()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn load(dir: &TempDir, name: &str, content: &str) -> Manifest {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        load_manifest(&path).unwrap()
    }

    #[test]
    fn yaml_list_form() {
        let dir = TempDir::new().unwrap();
        let manifest = load(
            &dir,
            "m.yaml",
            "- name: eq\n  stage_role: equilibration\n  files:\n    mdin: eq.in\n- name: prod\n  mdin: prod.in\n",
        );
        assert_eq!(manifest.entries.len(), 2);
        assert_eq!(manifest.entries[0].name.as_deref(), Some("eq"));
        assert_eq!(
            manifest.entries[1].paths.mdin,
            Some(std::path::PathBuf::from("prod.in"))
        );
    }

    #[test]
    fn yaml_mapping_preserves_order_and_fills_names() {
        let dir = TempDir::new().unwrap();
        let manifest = load(
            &dir,
            "m.yml",
            "zeta:\n  mdin: z.in\nalpha:\n  mdin: a.in\n",
        );
        let names: Vec<_> = manifest
            .entries
            .iter()
            .map(|e| e.name.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn json_mapping_form() {
        let dir = TempDir::new().unwrap();
        let manifest = load(
            &dir,
            "m.json",
            r#"{"prod": {"stage_role": "production", "files": {"mdin": "prod.in"}, "gaps": 2.5}}"#,
        );
        assert_eq!(manifest.entries.len(), 1);
        assert!(matches!(
            manifest.entries[0].gaps,
            Some(mdmeta_protocol::GapSpec::Expected(g)) if g == 2.5
        ));
    }

    #[test]
    fn toml_stage_array_form() {
        let dir = TempDir::new().unwrap();
        let manifest = load(
            &dir,
            "m.toml",
            "[[stages]]\nname = \"eq\"\nmdin = \"eq.in\"\n\n[[stages]]\nname = \"prod\"\nmdin = \"prod.in\"\n",
        );
        assert_eq!(manifest.entries.len(), 2);
        assert_eq!(manifest.entries[1].name.as_deref(), Some("prod"));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.csv");
        std::fs::write(&path, "name\n").unwrap();
        assert!(load_manifest(&path).is_err());
    }
}
