use serde::{Deserialize, Serialize};

use crate::schema::SectionSchema;

/// Wire identity of the built-in PRF form.
pub const PRF_TEMPLATE_ID: &str = "prf";
pub const PRF_TEMPLATE_VERSION: u32 = 1;

/// Which schema registry governs a document.
///
/// The fixed PRF kind is compiled in; a dynamic form is bound to a fetched
/// template id + version. A new template version is a new key — templates
/// never change shape in place.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TemplateKey {
    Prf,
    Dynamic { template_id: String, version: u32 },
}

impl TemplateKey {
    pub fn template_id(&self) -> &str {
        match self {
            TemplateKey::Prf => PRF_TEMPLATE_ID,
            TemplateKey::Dynamic { template_id, .. } => template_id,
        }
    }

    pub fn version(&self) -> u32 {
        match self {
            TemplateKey::Prf => PRF_TEMPLATE_VERSION,
            TemplateKey::Dynamic { version, .. } => *version,
        }
    }
}

/// One independently editable slice of a document.
///
/// Immutable once loaded; registries never change shape mid-session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionDescriptor {
    pub key: String,
    pub schema: SectionSchema,
    pub label: String,
    pub order: u32,
}

/// A remotely defined form: an ordered section list plus a version marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub version: u32,
    pub sections: Vec<SectionDescriptor>,
}

impl Template {
    pub fn key(&self) -> TemplateKey {
        TemplateKey::Dynamic {
            template_id: self.id.clone(),
            version: self.version,
        }
    }

    pub fn has_section(&self, key: &str) -> bool {
        self.sections.iter().any(|s| s.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, FieldSchema};

    #[test]
    fn prf_key_wire_identity() {
        assert_eq!(TemplateKey::Prf.template_id(), "prf");
        assert_eq!(TemplateKey::Prf.version(), 1);
    }

    #[test]
    fn dynamic_key_carries_id_and_version() {
        let key = TemplateKey::Dynamic {
            template_id: "incident-debrief".into(),
            version: 3,
        };
        assert_eq!(key.template_id(), "incident-debrief");
        assert_eq!(key.version(), 3);
    }

    #[test]
    fn template_deserializes_wire_shape() {
        let json = r#"{
            "id": "T1",
            "version": 2,
            "sections": [
                {
                    "key": "crew",
                    "schema": { "fields": [
                        { "name": "lead", "required": true, "kind": { "type": "text" } }
                    ]},
                    "label": "Crew",
                    "order": 10
                }
            ]
        }"#;

        let template: Template = serde_json::from_str(json).unwrap();
        assert_eq!(template.id, "T1");
        assert_eq!(template.version, 2);
        assert_eq!(template.sections.len(), 1);
        assert_eq!(template.sections[0].key, "crew");
        assert_eq!(template.sections[0].order, 10);
        assert!(template.has_section("crew"));
        assert!(!template.has_section("vitals"));
    }

    #[test]
    fn template_key_round_trips_through_serde() {
        let key = TemplateKey::Dynamic {
            template_id: "T1".into(),
            version: 2,
        };
        let json = serde_json::to_string(&key).unwrap();
        let back: TemplateKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, back);
    }

    #[test]
    fn section_descriptor_schema_round_trips() {
        let descriptor = SectionDescriptor {
            key: "vitals".into(),
            schema: SectionSchema::new(vec![FieldSchema {
                name: "pulse".into(),
                label: None,
                required: true,
                kind: FieldKind::Number {
                    min: Some(0.0),
                    max: Some(300.0),
                    integer: false,
                },
            }]),
            label: "Vital signs".into(),
            order: 40,
        };

        let json = serde_json::to_string(&descriptor).unwrap();
        let back: SectionDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(descriptor, back);
    }
}
