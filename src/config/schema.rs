//! Structural contract of the worker configuration document.
//!
//! Only shape and value domains are checked here; what the values mean is the
//! worker's business.

use super::error::ValidationError;
use serde_yaml::{Mapping, Value};

/// Top-level keys every configuration document must define, in check order.
pub const REQUIRED_KEYS: [&str; 21] = [
    "email",
    "password",
    "disableAntiLock",
    "remote",
    "lessthanTenApplicants",
    "newestPostingsFirst",
    "experienceLevel",
    "jobTypes",
    "date",
    "positions",
    "locations",
    "residentStatus",
    "distance",
    "outputFileDirectory",
    "checkboxes",
    "universityGpa",
    "languages",
    "experience",
    "personalInfo",
    "eeo",
    "uploads",
];

const BOOLEAN_FLAGS: [&str; 5] = [
    "disableAntiLock",
    "remote",
    "lessthanTenApplicants",
    "newestPostingsFirst",
    "residentStatus",
];

/// Groups where the user must pick at least one option.
const MULTI_CHOICE_GROUPS: [&str; 3] = ["experienceLevel", "jobTypes", "date"];

pub const APPROVED_DISTANCES: [i64; 6] = [0, 5, 10, 25, 50, 100];

const CHECKBOX_FLAGS: [&str; 8] = [
    "driversLicence",
    "requireVisa",
    "legallyAuthorized",
    "certifiedProfessional",
    "urgentFill",
    "commute",
    "backgroundCheck",
    "securityClearance",
];

const LANGUAGE_LEVELS: [&str; 4] = [
    "none",
    "conversationnel",
    "professionnel",
    "natif ou bilingue",
];

pub const API_KEY_FIELD: &str = "openaiApiKey";

/// Value shipped in the sample configuration; treated as "no key configured".
pub const PLACEHOLDER_API_KEY: &str = "sk-proj-your-openai-api-key";

/// A configuration document that passed [`validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig {
    doc: Mapping,
}

impl ValidatedConfig {
    pub fn email(&self) -> &str {
        self.doc.get("email").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn positions(&self) -> Vec<String> {
        string_items(self.doc.get("positions"))
    }

    pub fn locations(&self) -> Vec<String> {
        string_items(self.doc.get("locations"))
    }

    pub fn distance(&self) -> i64 {
        self.doc
            .get("distance")
            .and_then(Value::as_i64)
            .unwrap_or_default()
    }

    /// False when the API key is absent or was the shipped placeholder.
    pub fn ai_assist_enabled(&self) -> bool {
        matches!(self.doc.get(API_KEY_FIELD), Some(Value::String(s)) if !s.is_empty())
    }

    pub fn document(&self) -> &Mapping {
        &self.doc
    }

    pub fn into_document(self) -> Mapping {
        self.doc
    }
}

fn string_items(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_sequence)
        .map(|items| items.iter().map(display_value).collect())
        .unwrap_or_default()
}

/// Check a parsed document against the configuration schema.
///
/// On success the document is returned unchanged, except that a placeholder
/// API key is replaced by `null`.
pub fn validate(document: Value) -> Result<ValidatedConfig, ValidationError> {
    let mut doc = match document {
        Value::Mapping(map) => map,
        _ => return Err(ValidationError::type_mismatch("<root>", "a mapping")),
    };

    for key in REQUIRED_KEYS {
        if !doc.contains_key(key) {
            return Err(ValidationError::MissingKey(key.to_string()));
        }
    }

    check_email(&doc)?;
    check_password(&doc)?;
    for flag in BOOLEAN_FLAGS {
        require_bool(&doc, flag, flag)?;
    }
    for group in MULTI_CHOICE_GROUPS {
        check_multi_choice(&doc, group)?;
    }
    check_distance(&doc)?;
    require_non_empty_sequence(&doc, "positions")?;
    require_non_empty_sequence(&doc, "locations")?;

    let uploads = require_mapping(&doc, "uploads")?;
    if !uploads.contains_key("resume") {
        return Err(ValidationError::domain(
            "uploads",
            "must contain a `resume` entry",
        ));
    }

    check_checkboxes(&doc)?;

    match doc.get("universityGpa") {
        Some(Value::Number(_)) => {}
        _ => return Err(ValidationError::type_mismatch("universityGpa", "a number")),
    }

    check_languages(&doc)?;
    check_experience(&doc)?;
    require_filled_entries(&doc, "personalInfo")?;
    require_filled_entries(&doc, "eeo")?;

    normalize_api_key(&mut doc);

    Ok(ValidatedConfig { doc })
}

/// Replace the placeholder API key with the unset sentinel (`null`).
fn normalize_api_key(doc: &mut Mapping) {
    let is_placeholder =
        matches!(doc.get(API_KEY_FIELD), Some(Value::String(s)) if s == PLACEHOLDER_API_KEY);
    if is_placeholder {
        tracing::info!("API key not configured; AI-assisted answers are disabled");
        doc.insert(Value::from(API_KEY_FIELD), Value::Null);
    }
}

fn check_email(doc: &Mapping) -> Result<(), ValidationError> {
    let email = require_str(doc, "email")?;
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(ValidationError::domain(
            "email",
            format!("`{email}` is not a valid email address"),
        ))
    }
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || !domain.contains('.') {
        return false;
    }
    domain.split('.').all(|label| !label.is_empty())
}

fn check_password(doc: &Mapping) -> Result<(), ValidationError> {
    if require_str(doc, "password")?.is_empty() {
        return Err(ValidationError::domain("password", "must not be empty"));
    }
    Ok(())
}

fn check_multi_choice(doc: &Mapping, group: &str) -> Result<(), ValidationError> {
    let options = require_mapping(doc, group)?;
    if options.is_empty() {
        return Err(ValidationError::domain(group, "must not be empty"));
    }
    if !options.values().any(|v| matches!(v, Value::Bool(true))) {
        return Err(ValidationError::domain(
            group,
            "at least one option must be true",
        ));
    }
    Ok(())
}

fn check_distance(doc: &Mapping) -> Result<(), ValidationError> {
    let distance = doc
        .get("distance")
        .and_then(Value::as_i64)
        .ok_or_else(|| ValidationError::type_mismatch("distance", "an integer"))?;
    if APPROVED_DISTANCES.contains(&distance) {
        Ok(())
    } else {
        Err(ValidationError::domain(
            "distance",
            format!("{distance} is not one of {APPROVED_DISTANCES:?}"),
        ))
    }
}

fn check_checkboxes(doc: &Mapping) -> Result<(), ValidationError> {
    let checkboxes = require_mapping(doc, "checkboxes")?;
    if checkboxes.is_empty() {
        return Err(ValidationError::domain("checkboxes", "must not be empty"));
    }
    for flag in CHECKBOX_FLAGS {
        let key = format!("checkboxes.{flag}");
        if !checkboxes.contains_key(flag) {
            return Err(ValidationError::MissingKey(key));
        }
        require_bool(checkboxes, flag, &key)?;
    }
    if !checkboxes.contains_key("degreeCompleted") {
        return Err(ValidationError::MissingKey(
            "checkboxes.degreeCompleted".to_string(),
        ));
    }
    Ok(())
}

fn check_languages(doc: &Mapping) -> Result<(), ValidationError> {
    let languages = require_mapping(doc, "languages")?;
    for (language, level) in languages {
        let key = format!("languages.{}", display_value(language));
        let level = level
            .as_str()
            .ok_or_else(|| ValidationError::type_mismatch(key.clone(), "a string"))?;
        if !LANGUAGE_LEVELS.contains(&level.to_lowercase().as_str()) {
            return Err(ValidationError::domain(
                key,
                format!("`{level}` is not one of {LANGUAGE_LEVELS:?}"),
            ));
        }
    }
    Ok(())
}

fn check_experience(doc: &Mapping) -> Result<(), ValidationError> {
    let experience = require_mapping(doc, "experience")?;
    for (tech, years) in experience {
        if years.as_i64().is_none() {
            return Err(ValidationError::domain(
                format!("experience.{}", display_value(tech)),
                "years of experience must be an integer",
            ));
        }
    }
    if !experience.contains_key("default") {
        return Err(ValidationError::domain(
            "experience",
            "must contain a `default` entry",
        ));
    }
    Ok(())
}

fn require_filled_entries(doc: &Mapping, key: &str) -> Result<(), ValidationError> {
    let entries = require_mapping(doc, key)?;
    if entries.is_empty() {
        return Err(ValidationError::domain(key, "must not be empty"));
    }
    for (name, value) in entries {
        if matches!(value, Value::String(s) if s.is_empty()) {
            return Err(ValidationError::domain(
                format!("{key}.{}", display_value(name)),
                "must not be an empty string",
            ));
        }
    }
    Ok(())
}

fn require_str<'a>(doc: &'a Mapping, key: &str) -> Result<&'a str, ValidationError> {
    doc.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ValidationError::type_mismatch(key, "a string"))
}

fn require_bool(doc: &Mapping, key: &str, label: &str) -> Result<bool, ValidationError> {
    doc.get(key)
        .and_then(Value::as_bool)
        .ok_or_else(|| ValidationError::type_mismatch(label, "a boolean"))
}

fn require_mapping<'a>(doc: &'a Mapping, key: &str) -> Result<&'a Mapping, ValidationError> {
    doc.get(key)
        .and_then(Value::as_mapping)
        .ok_or_else(|| ValidationError::type_mismatch(key, "a mapping"))
}

fn require_non_empty_sequence(doc: &Mapping, key: &str) -> Result<(), ValidationError> {
    let items = doc
        .get(key)
        .and_then(Value::as_sequence)
        .ok_or_else(|| ValidationError::type_mismatch(key, "a list"))?;
    if items.is_empty() {
        return Err(ValidationError::domain(key, "must not be empty"));
    }
    Ok(())
}

/// Render a scalar for messages without YAML document markers.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => "null".to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}
