// Workflow Context - Flattened event data conditions and templates read from

use chrono::{DateTime, Utc};
use relay_shared::Contact;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use uuid::Uuid;

static PLACEHOLDER: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\{\{([^}]+)\}\}").expect("placeholder pattern"));

// Field names used by definitions saved before the current vocabulary.
const LEGACY_SUBJECT_FIELD: &str = "email_subject_contains";
const LEGACY_TAGS_FIELD: &str = "contact_tag";

/// Field → value view over an event payload plus contact enrichment.
///
/// Top-level payload keys are kept as-is; nested objects are also exposed
/// under dotted keys (`email_data.subject`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventContext {
    fields: BTreeMap<String, Value>,
}

impl EventContext {
    pub fn from_payload(payload: &Value) -> Self {
        let mut context = Self::default();
        if let Value::Object(map) = payload {
            for (key, value) in map {
                context.flatten_into(key, value);
            }
        }
        context.derive_email_fields();
        context
    }

    fn flatten_into(&mut self, key: &str, value: &Value) {
        self.fields.insert(key.to_string(), value.clone());
        if let Value::Object(map) = value {
            for (child, nested) in map {
                self.flatten_into(&format!("{}.{}", key, child), nested);
            }
        }
    }

    /// `email_subject` / `email_from_domain`, from either the flat payload
    /// or its `email_data` object.
    fn derive_email_fields(&mut self) {
        let subject = self
            .text("email_subject")
            .or_else(|| self.text("email_data.subject"))
            .or_else(|| self.text("subject"));
        if let Some(subject) = subject {
            self.insert("email_subject", Value::String(subject.clone()));
            self.insert(LEGACY_SUBJECT_FIELD, Value::String(subject));
        }

        let sender = self
            .text("email_data.from_email")
            .or_else(|| self.text("from_email"));
        let domain = sender.and_then(|s| s.rsplit_once('@').map(|(_, d)| d.to_lowercase()));
        if let Some(domain) = domain {
            self.fields
                .entry("email_from_domain".to_string())
                .or_insert(Value::String(domain));
        }
    }

    /// Add the contact-derived fields. `days_since_last_contact` is left
    /// unset when the contact was never contacted.
    pub fn enrich_with_contact(&mut self, contact: &Contact, now: DateTime<Utc>) {
        let tags = Value::Array(contact.tags.iter().cloned().map(Value::String).collect());
        self.insert("lead_stage", Value::String(contact.lead_stage.clone()));
        self.insert("contact_tags", tags.clone());
        self.insert(LEGACY_TAGS_FIELD, tags);
        self.insert("engagement_score", Value::from(contact.engagement_score));
        if let Some(email) = &contact.email {
            self.insert("contact_email", Value::String(email.clone()));
        }
        self.insert("contact_name", Value::String(contact.display_name()));
        if let Some(company) = &contact.company {
            self.insert("company", Value::String(company.clone()));
        }
        if let Some(last) = contact.last_contacted_at {
            let days = (now - last).num_days().max(0);
            self.insert("days_since_last_contact", Value::from(days));
        }
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.fields.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    fn text(&self, key: &str) -> Option<String> {
        self.get(key).and_then(Value::as_str).map(str::to_string)
    }

    /// The contact this event concerns, if the payload names one.
    pub fn contact_id(&self) -> Option<Uuid> {
        self.text("contact_id").and_then(|s| Uuid::parse_str(&s).ok())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Replace `{{path}}` placeholders in every string of `config`.
pub fn render_templates(config: &Value, lookup: &dyn Fn(&str) -> Option<Value>) -> Value {
    match config {
        Value::String(s) => Value::String(replace_template_vars(s, lookup)),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_templates(v, lookup)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| render_templates(v, lookup)).collect())
        }
        _ => config.clone(),
    }
}

/// Unresolved placeholders are left in place.
pub fn replace_template_vars(template: &str, lookup: &dyn Fn(&str) -> Option<Value>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures| {
            let path = caps[1].trim();
            match lookup(path) {
                Some(Value::String(s)) => s,
                Some(Value::Null) | None => caps[0].to_string(),
                Some(other) => other.to_string(),
            }
        })
        .into_owned()
}

/// Follow a dotted path through objects and array indices.
pub fn get_nested_value(json: &Value, path: &str) -> Option<Value> {
    let mut current = json;
    for part in path.split('.') {
        current = match current {
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => current.get(part)?,
        };
    }
    Some(current.clone())
}
