//! Chain template registry.
//!
//! Each anchor type maps to an ordered list of preparation steps. The
//! registry is built once, validated, and shared immutably with the
//! generator. Lookups never fail: unknown types resolve to the "other"
//! template and report a [`TemplateFallbackInfo`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::step::TemplateFallbackInfo;
use crate::anchor::AnchorType;
use crate::error::ValidationError;

/// Template type every registry must contain.
pub const FALLBACK_TEMPLATE: &str = "other";

/// One preparation step of a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStepTemplate {
    pub id: String,
    pub name: String,
    pub duration_minutes: i64,
    #[serde(default = "default_true")]
    pub is_required: bool,
    #[serde(default)]
    pub can_skip_when_late: bool,
    /// Final pre-departure step.
    #[serde(default)]
    pub is_exit_gate: bool,
}

fn default_true() -> bool {
    true
}

/// Ordered steps for one anchor type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTemplate {
    pub anchor_type: String,
    pub steps: Vec<ChainStepTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prep_duration_minutes: Option<i64>,
}

impl ChainTemplate {
    pub fn total_minutes(&self) -> i64 {
        self.steps.iter().map(|s| s.duration_minutes).sum()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.anchor_type.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "anchor_type".to_string(),
                message: "template anchor type is empty".to_string(),
            });
        }
        if self.steps.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: format!("templates.{}.steps", self.anchor_type),
                message: "template has no steps".to_string(),
            });
        }
        if let Some(step) = self.steps.iter().find(|s| s.duration_minutes <= 0) {
            return Err(ValidationError::InvalidValue {
                field: format!("templates.{}.{}", self.anchor_type, step.id),
                message: format!("duration must be positive, got {}", step.duration_minutes),
            });
        }
        if self.steps.iter().filter(|s| s.is_exit_gate).count() > 1 {
            return Err(ValidationError::InvalidValue {
                field: format!("templates.{}", self.anchor_type),
                message: "more than one exit-gate step".to_string(),
            });
        }
        Ok(())
    }
}

/// Result of a registry lookup.
#[derive(Debug, Clone)]
pub struct TemplateLookup<'a> {
    pub template: &'a ChainTemplate,
    /// Requested type when the fallback template was used.
    pub fallback: Option<String>,
}

impl TemplateLookup<'_> {
    pub fn fallback_info(&self) -> Option<TemplateFallbackInfo> {
        self.fallback.as_ref().map(|requested| TemplateFallbackInfo {
            requested_type: requested.clone(),
            used_type: self.template.anchor_type.clone(),
        })
    }
}

/// Immutable anchor-type → template map.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, ChainTemplate>,
    fallback: ChainTemplate,
}

impl TemplateRegistry {
    /// Build a registry from explicit templates.
    ///
    /// # Errors
    /// Returns an error if a template is invalid or "other" is missing.
    pub fn new(templates: Vec<ChainTemplate>) -> Result<Self, ValidationError> {
        let mut map = BTreeMap::new();
        for template in templates {
            template.validate()?;
            map.insert(template.anchor_type.trim().to_ascii_lowercase(), template);
        }
        let fallback = map
            .remove(FALLBACK_TEMPLATE)
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "templates".to_string(),
                message: format!("registry must define a '{FALLBACK_TEMPLATE}' template"),
            })?;
        Ok(Self {
            templates: map,
            fallback,
        })
    }

    /// Registry with the built-in templates.
    pub fn builtin() -> Self {
        let templates = builtin_templates()
            .into_iter()
            .filter(|t| t.anchor_type != FALLBACK_TEMPLATE)
            .map(|t| (t.anchor_type.clone(), t))
            .collect();
        Self {
            templates,
            fallback: other_template(),
        }
    }

    /// Built-in templates with `overrides` replacing or adding types.
    ///
    /// # Errors
    /// Returns an error if any override is invalid.
    pub fn with_overrides(overrides: Vec<ChainTemplate>) -> Result<Self, ValidationError> {
        let mut templates = builtin_templates();
        for template in overrides {
            let key = template.anchor_type.trim().to_ascii_lowercase();
            templates.retain(|t| t.anchor_type != key);
            templates.push(template);
        }
        Self::new(templates)
    }

    /// Template for `anchor_type`, falling back to "other".
    pub fn get_chain_template(&self, anchor_type: &AnchorType) -> TemplateLookup<'_> {
        let key = anchor_type.as_str().to_ascii_lowercase();
        if key == FALLBACK_TEMPLATE {
            return TemplateLookup {
                template: &self.fallback,
                fallback: None,
            };
        }
        match self.templates.get(&key) {
            Some(template) => TemplateLookup {
                template,
                fallback: None,
            },
            None => TemplateLookup {
                template: &self.fallback,
                fallback: Some(key),
            },
        }
    }

    pub fn get(&self, anchor_type: &str) -> Option<&ChainTemplate> {
        let key = anchor_type.trim().to_ascii_lowercase();
        if key == FALLBACK_TEMPLATE {
            Some(&self.fallback)
        } else {
            self.templates.get(&key)
        }
    }

    /// All templates, fallback last.
    pub fn templates(&self) -> impl Iterator<Item = &ChainTemplate> {
        self.templates.values().chain(std::iter::once(&self.fallback))
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn step(id: &str, name: &str, minutes: i64, required: bool, skippable: bool) -> ChainStepTemplate {
    ChainStepTemplate {
        id: id.to_string(),
        name: name.to_string(),
        duration_minutes: minutes,
        is_required: required,
        can_skip_when_late: skippable,
        is_exit_gate: false,
    }
}

fn exit_gate(minutes: i64) -> ChainStepTemplate {
    ChainStepTemplate {
        is_exit_gate: true,
        ..step("exit-gate", "Final check & leave", minutes, true, false)
    }
}

fn template(anchor_type: &str, steps: Vec<ChainStepTemplate>) -> ChainTemplate {
    ChainTemplate {
        anchor_type: anchor_type.to_string(),
        steps,
        prep_duration_minutes: None,
    }
}

/// Built-in templates for every known anchor type.
pub fn builtin_templates() -> Vec<ChainTemplate> {
    let wake = || step("wake", "Wake up & bathroom", 10, true, false);
    let dress = || step("dress", "Get dressed", 10, true, false);
    let shower = || step("shower", "Shower", 15, false, true);
    let breakfast = || step("breakfast", "Breakfast", 15, false, true);

    let lecture_steps = || {
        vec![
            wake(),
            shower(),
            dress(),
            breakfast(),
            step("pack", "Pack bag & notes", 10, true, false),
            exit_gate(5),
        ]
    };

    vec![
        template("class", lecture_steps()),
        template("lecture", lecture_steps()),
        ChainTemplate {
            prep_duration_minutes: Some(30),
            ..template(
                "seminar",
                vec![
                    wake(),
                    shower(),
                    dress(),
                    breakfast(),
                    step("readings", "Review readings", 20, false, true),
                    step("pack", "Pack bag & notes", 10, true, false),
                    exit_gate(5),
                ],
            )
        },
        ChainTemplate {
            prep_duration_minutes: Some(45),
            ..template(
                "workshop",
                vec![
                    wake(),
                    dress(),
                    breakfast(),
                    step("materials", "Gather materials", 15, true, false),
                    step("pack", "Pack bag", 5, true, false),
                    exit_gate(5),
                ],
            )
        },
        template(
            "exam",
            vec![
                wake(),
                shower(),
                dress(),
                step("breakfast", "Breakfast", 20, true, false),
                step("review", "Quick review", 20, false, true),
                step("pack", "Pack ID & pens", 5, true, false),
                exit_gate(5),
            ],
        ),
        template(
            "meeting",
            vec![
                wake(),
                dress(),
                step("agenda", "Review agenda", 15, false, true),
                step("pack", "Pack laptop", 5, true, false),
                exit_gate(5),
            ],
        ),
        template(
            "appointment",
            vec![
                wake(),
                dress(),
                step("documents", "Gather documents", 10, true, false),
                exit_gate(5),
            ],
        ),
        template(
            "work",
            vec![
                wake(),
                shower(),
                dress(),
                breakfast(),
                step("lunch", "Pack lunch", 10, false, true),
                exit_gate(5),
            ],
        ),
        other_template(),
    ]
}

fn other_template() -> ChainTemplate {
    template(
        FALLBACK_TEMPLATE,
        vec![
            step("wake", "Wake up & bathroom", 10, true, false),
            step("dress", "Get dressed", 10, true, false),
            step("breakfast", "Breakfast", 15, false, true),
            step("pack", "Pack bag", 5, true, false),
            exit_gate(5),
        ],
    )
}
