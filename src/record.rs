use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// The two record families served by the hub. Each kind has its own root
/// directory, its own store and its own reload schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Template,
    App,
}

impl RecordKind {
    pub const ALL: [RecordKind; 2] = [RecordKind::Template, RecordKind::App];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Template => "template",
            RecordKind::App => "app",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            RecordKind::Template => "templates",
            RecordKind::App => "apps",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "template" | "templates" => Ok(RecordKind::Template),
            "app" | "apps" => Ok(RecordKind::App),
            other => Err(format!(
                "unknown record kind '{}', expected 'templates' or 'apps'",
                other
            )),
        }
    }
}

/// Summary of a record used by list and search results. Compose files and
/// install scripts stay out of bulk listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub category: String,
    pub author: String,
    pub version: String,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Common view over templates and apps.
///
/// Implementors are plain data parsed from one JSON file each; the scanner
/// and store only ever need these accessors.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: RecordKind;

    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn category(&self) -> &str;
    fn metadata(&self) -> RecordMetadata;

    /// Whether name, description or category contains `needle`.
    /// `needle` must already be lowercased.
    fn matches(&self, needle: &str) -> bool {
        [self.name(), self.description(), self.category()]
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
    }

    /// Records without an id or a name never make it into a snapshot.
    fn is_complete(&self) -> bool {
        !self.id().is_empty() && !self.name().is_empty()
    }
}

/// System requirements a template declares for its compose stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateRequirements {
    #[serde(skip_serializing_if = "is_zero")]
    #[serde(deserialize_with = "null_as_default")]
    pub min_memory_mb: u64,
    #[serde(skip_serializing_if = "is_zero")]
    #[serde(deserialize_with = "null_as_default")]
    pub min_disk_gb: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(deserialize_with = "null_as_default")]
    pub ports: Vec<u16>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(deserialize_with = "null_as_default")]
    pub notes: Vec<String>,
}

impl TemplateRequirements {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

/// Reads an explicit `null` as the field's default. Hub files written by
/// other tooling carry `null` for empty maps and lists.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A deployable Docker Compose template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Template {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub icon: String,
    #[serde(deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(deserialize_with = "null_as_default")]
    pub author: String,
    #[serde(deserialize_with = "null_as_default")]
    pub version: String,
    #[serde(deserialize_with = "null_as_default")]
    pub compose: String,
    #[serde(deserialize_with = "null_as_default")]
    pub variables: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "TemplateRequirements::is_empty")]
    #[serde(deserialize_with = "null_as_default")]
    pub requirements: TemplateRequirements,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(deserialize_with = "null_as_default")]
    pub screenshots: Vec<String>,
}

impl Record for Template {
    const KIND: RecordKind = RecordKind::Template;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn category(&self) -> &str {
        &self.category
    }

    fn metadata(&self) -> RecordMetadata {
        RecordMetadata {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            icon: self.icon.clone(),
            category: self.category.clone(),
            author: self.author.clone(),
            version: self.version.clone(),
            updated_at: self.updated_at,
        }
    }
}

/// An add-on installed onto the NAS host itself rather than as a container stack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct App {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub icon: String,
    #[serde(deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(deserialize_with = "null_as_default")]
    pub author: String,
    #[serde(deserialize_with = "null_as_default")]
    pub version: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(deserialize_with = "null_as_default")]
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(deserialize_with = "null_as_default")]
    pub packages: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(deserialize_with = "null_as_default")]
    pub services: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    #[serde(deserialize_with = "null_as_default")]
    pub min_nas_version: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(deserialize_with = "null_as_default")]
    pub screenshots: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    #[serde(deserialize_with = "null_as_default")]
    pub install_script: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    #[serde(deserialize_with = "null_as_default")]
    pub uninstall_script: String,
}

impl Record for App {
    const KIND: RecordKind = RecordKind::App;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn category(&self) -> &str {
        &self.category
    }

    fn metadata(&self) -> RecordMetadata {
        RecordMetadata {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            icon: self.icon.clone(),
            category: self.category.clone(),
            author: self.author.clone(),
            version: self.version.clone(),
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_parses_all_fields() {
        let json = r#"{
            "id": "jellyfin",
            "name": "Jellyfin",
            "description": "Free media server",
            "icon": "jellyfin.svg",
            "category": "media",
            "author": "hub",
            "version": "10.8.13",
            "compose": "services:\n  jellyfin:\n    image: jellyfin/jellyfin\n",
            "variables": {"MEDIA_PATH": "/srv/media"},
            "requirements": {"min_memory_mb": 2048, "ports": [8096], "notes": ["needs GPU for transcoding"]},
            "created_at": "2024-01-02T03:04:05Z",
            "updated_at": "2024-02-03T04:05:06Z",
            "tags": ["video", "streaming"]
        }"#;
        let tpl: Template = serde_json::from_str(json).unwrap();
        assert_eq!(tpl.id, "jellyfin");
        assert_eq!(tpl.variables.get("MEDIA_PATH").map(String::as_str), Some("/srv/media"));
        assert_eq!(tpl.requirements.min_memory_mb, 2048);
        assert_eq!(tpl.requirements.min_disk_gb, 0);
        assert_eq!(tpl.requirements.ports, vec![8096]);
        assert_eq!(tpl.tags, vec!["video", "streaming"]);
        assert!(tpl.screenshots.is_empty());
        assert_eq!(
            tpl.updated_at.map(|t| t.to_rfc3339()),
            Some("2024-02-03T04:05:06+00:00".to_string())
        );
        assert!(tpl.is_complete());
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let app: App = serde_json::from_str(r#"{"id": "nut"}"#).unwrap();
        assert_eq!(app.id, "nut");
        assert_eq!(app.name, "");
        assert!(app.created_at.is_none());
        assert!(app.packages.is_empty());
        assert!(!app.is_complete());
    }

    #[test]
    fn test_null_fields_read_as_empty() {
        let tpl: Template = serde_json::from_str(
            r#"{
                "id": "gitea",
                "name": "Gitea",
                "description": null,
                "category": "dev",
                "variables": null,
                "requirements": null,
                "created_at": null,
                "tags": null,
                "screenshots": null
            }"#,
        )
        .unwrap();
        assert_eq!(tpl.description, "");
        assert!(tpl.variables.is_empty());
        assert!(tpl.requirements.is_empty());
        assert!(tpl.tags.is_empty());
        assert!(tpl.is_complete());

        let req: TemplateRequirements =
            serde_json::from_str(r#"{"min_memory_mb": null, "ports": null, "notes": ["x"]}"#)
                .unwrap();
        assert_eq!(req.min_memory_mb, 0);
        assert_eq!(req.notes, vec!["x"]);

        let app: App = serde_json::from_str(
            r#"{"id": "nut", "name": "NUT", "dependencies": null, "install_script": null}"#,
        )
        .unwrap();
        assert!(app.dependencies.is_empty());
        assert_eq!(app.install_script, "");
    }

    #[test]
    fn test_optional_fields_omitted_when_empty() {
        let app = App {
            id: "nut".into(),
            name: "Network UPS Tools".into(),
            ..App::default()
        };
        let value = serde_json::to_value(&app).unwrap();
        assert!(value.get("install_script").is_none());
        assert!(value.get("tags").is_none());
        assert_eq!(value["updated_at"], serde_json::Value::Null);

        let tpl = Template {
            id: "x".into(),
            name: "X".into(),
            ..Template::default()
        };
        let value = serde_json::to_value(&tpl).unwrap();
        assert!(value.get("requirements").is_none());
        assert!(value.get("variables").is_some());
    }

    #[test]
    fn test_metadata_projection_drops_payload() {
        let tpl = Template {
            id: "gitea".into(),
            name: "Gitea".into(),
            category: "dev".into(),
            version: "1.21".into(),
            compose: "services: {}".into(),
            ..Template::default()
        };
        let meta = tpl.metadata();
        assert_eq!(meta.id, "gitea");
        assert_eq!(meta.category, "dev");
        assert_eq!(meta.version, "1.21");
        let value = serde_json::to_value(&meta).unwrap();
        assert!(value.get("compose").is_none());
    }

    #[test]
    fn test_matches_is_case_insensitive_over_three_fields() {
        let app = App {
            id: "a".into(),
            name: "Media Server".into(),
            description: "Streams things".into(),
            category: "Entertainment".into(),
            author: "media corp".into(),
            ..App::default()
        };
        assert!(app.matches("media"));
        assert!(app.matches("streams"));
        assert!(app.matches("entertain"));
        // author is not searched
        assert!(!app.matches("corp"));
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("templates".parse::<RecordKind>(), Ok(RecordKind::Template));
        assert_eq!("App".parse::<RecordKind>(), Ok(RecordKind::App));
        assert!("plugins".parse::<RecordKind>().is_err());
        assert_eq!(RecordKind::App.to_string(), "app");
        assert_eq!(RecordKind::Template.plural(), "templates");
    }
}
