//! Section registries: the compiled-in PRF form and fetched dynamic templates.

use std::collections::BTreeMap;

use crate::models::template::{SectionDescriptor, Template, TemplateKey};

use super::{FieldKind, FieldSchema, SectionSchema};

/// Ordered, immutable mapping from section key to descriptor.
///
/// One registry per template/version; never reshaped mid-session.
#[derive(Debug)]
pub struct SchemaRegistry {
    key: TemplateKey,
    sections: Vec<SectionDescriptor>,
    index: BTreeMap<String, usize>,
}

impl SchemaRegistry {
    fn build(key: TemplateKey, mut sections: Vec<SectionDescriptor>) -> Self {
        sections.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.key.cmp(&b.key)));
        let index = sections
            .iter()
            .enumerate()
            .map(|(position, descriptor)| (descriptor.key.clone(), position))
            .collect();
        Self {
            key,
            sections,
            index,
        }
    }

    /// The fixed Patient Report Form registry.
    pub fn prf() -> Self {
        Self::build(TemplateKey::Prf, prf_sections())
    }

    /// Registry for a fetched dynamic-form template.
    pub fn from_template(template: &Template) -> Self {
        Self::build(template.key(), template.sections.clone())
    }

    pub fn template_key(&self) -> &TemplateKey {
        &self.key
    }

    /// Descriptors in navigation order.
    pub fn describe(&self) -> &[SectionDescriptor] {
        &self.sections
    }

    pub fn resolve(&self, section_key: &str) -> Option<&SectionDescriptor> {
        self.index
            .get(section_key)
            .map(|position| &self.sections[*position])
    }

    pub fn contains(&self, section_key: &str) -> bool {
        self.index.contains_key(section_key)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

// ── PRF section definitions ─────────────────────────────────────────────────

fn text(name: &str) -> FieldSchema {
    FieldSchema {
        name: name.into(),
        label: None,
        required: false,
        kind: FieldKind::Text {
            min_len: 0,
            max_len: Some(2000),
            pattern: None,
        },
    }
}

fn required_text(name: &str) -> FieldSchema {
    FieldSchema {
        required: true,
        ..text(name)
    }
}

fn number(name: &str, min: f64, max: f64, required: bool) -> FieldSchema {
    FieldSchema {
        name: name.into(),
        label: None,
        required,
        kind: FieldKind::Number {
            min: Some(min),
            max: Some(max),
            integer: false,
        },
    }
}

fn integer(name: &str, min: f64, max: f64) -> FieldSchema {
    FieldSchema {
        name: name.into(),
        label: None,
        required: false,
        kind: FieldKind::Number {
            min: Some(min),
            max: Some(max),
            integer: true,
        },
    }
}

fn boolean(name: &str) -> FieldSchema {
    FieldSchema {
        name: name.into(),
        label: None,
        required: false,
        kind: FieldKind::Boolean,
    }
}

fn choice(name: &str, options: &[&str], required: bool) -> FieldSchema {
    FieldSchema {
        name: name.into(),
        label: None,
        required,
        kind: FieldKind::Choice {
            options: options.iter().map(|o| o.to_string()).collect(),
        },
    }
}

fn text_list(name: &str) -> FieldSchema {
    FieldSchema {
        name: name.into(),
        label: None,
        required: false,
        kind: FieldKind::List {
            item: Box::new(FieldKind::Text {
                min_len: 1,
                max_len: Some(500),
                pattern: None,
            }),
            max_items: Some(50),
        },
    }
}

fn section(key: &str, label: &str, order: u32, fields: Vec<FieldSchema>) -> SectionDescriptor {
    SectionDescriptor {
        key: key.into(),
        schema: SectionSchema::new(fields),
        label: label.into(),
        order,
    }
}

fn prf_sections() -> Vec<SectionDescriptor> {
    vec![
        section(
            "patient-details",
            "Patient details",
            10,
            vec![
                required_text("name"),
                text("date-of-birth"),
                integer("age", 0.0, 130.0),
                choice("sex", &["male", "female", "other", "unknown"], false),
                FieldSchema {
                    name: "nhs-number".into(),
                    label: None,
                    required: false,
                    kind: FieldKind::Text {
                        min_len: 0,
                        max_len: None,
                        pattern: Some(r"^\d{10}$".into()),
                    },
                },
                text("address"),
            ],
        ),
        section(
            "incident-information",
            "Incident information",
            20,
            vec![
                required_text("location"),
                text("incident-number"),
                text("date"),
                choice(
                    "category",
                    &["medical", "trauma", "obstetric", "psychiatric", "other"],
                    false,
                ),
            ],
        ),
        section(
            "primary-survey",
            "Primary survey",
            30,
            vec![
                choice("airway", &["clear", "obstructed", "managed"], true),
                boolean("catastrophic-haemorrhage"),
                text("breathing"),
                text("circulation"),
                text("disability"),
                text("exposure"),
            ],
        ),
        section(
            "vital-signs",
            "Vital signs",
            40,
            vec![
                number("pulse", 0.0, 300.0, true),
                number("respiration-rate", 0.0, 99.0, true),
                number("systolic-bp", 0.0, 300.0, false),
                number("spo2", 0.0, 100.0, false),
                integer("gcs", 3.0, 15.0),
                number("temperature", 25.0, 45.0, false),
            ],
        ),
        section(
            "injuries",
            "Injuries",
            50,
            vec![text_list("injuries"), text("description")],
        ),
        section(
            "mechanism-of-injury",
            "Mechanism of injury",
            60,
            vec![
                choice(
                    "mechanism",
                    &["fall", "road-traffic-collision", "assault", "burn", "other"],
                    false,
                ),
                text("details"),
            ],
        ),
        section(
            "respiratory-distress",
            "Respiratory distress",
            70,
            vec![
                boolean("present"),
                choice("severity", &["mild", "moderate", "severe"], false),
                text_list("interventions"),
            ],
        ),
        section(
            "medication-administration",
            "Medication administration",
            80,
            vec![text_list("administered"), text("notes")],
        ),
        section(
            "intravenous-therapy",
            "Intravenous therapy",
            90,
            vec![
                text("access-site"),
                text("fluid"),
                number("volume-ml", 0.0, 5000.0, false),
            ],
        ),
        section(
            "inventory",
            "Inventory",
            100,
            vec![text_list("items-used")],
        ),
        section(
            "past-medical-history",
            "Past medical history",
            110,
            vec![text("history"), text("allergies"), text("medications")],
        ),
        section("notes", "Notes", 120, vec![text("narrative")]),
        section(
            "patient-handover",
            "Patient handover",
            130,
            vec![
                required_text("receiving-clinician"),
                text("handover-time"),
                boolean("sbar-given"),
            ],
        ),
        section(
            "transportation",
            "Transportation",
            140,
            vec![
                choice(
                    "destination",
                    &["hospital", "treated-on-scene", "refused", "other"],
                    true,
                ),
                choice("mode", &["ambulance", "air", "own-transport"], false),
            ],
        ),
    ]
}
