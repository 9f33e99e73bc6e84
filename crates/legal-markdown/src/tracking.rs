//! Field usage tracking for highlighting and completeness reports.
//!
//! A tracker belongs to one pipeline run. It is cheap to clone (shared
//! state behind an `Arc`). Steps raced against a timeout record into a
//! separate tracker that is absorbed only when they finish in time.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;

use crate::template::value::to_display;

/// Which construct produced a tracked field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MixinKind {
    Variable,
    Helper,
    Conditional,
    Loop,
    Clause,
    CrossReference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldStatus {
    Filled,
    Empty,
    Logic,
}

impl FieldStatus {
    /// CSS class used by highlighted output.
    pub fn css_class(self) -> &'static str {
        match self {
            FieldStatus::Filled => "imported-value",
            FieldStatus::Empty => "missing-value",
            FieldStatus::Logic => "highlight",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedField {
    pub name: String,
    pub value: Option<Value>,
    pub has_logic: bool,
    pub mixin_used: MixinKind,
    pub status: FieldStatus,
    /// Number of times the field was resolved in the document.
    pub occurrences: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldReport {
    pub total: usize,
    pub filled: usize,
    pub empty: usize,
    pub logic: usize,
    pub fields: Vec<TrackedField>,
}

#[derive(Debug, Clone, Default)]
pub struct FieldTracker {
    fields: Arc<Mutex<BTreeMap<String, TrackedField>>>,
}

impl FieldTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one resolution. A value that is absent, `null` or an empty
    /// string makes the field empty; otherwise logic wins over filled.
    pub fn track(
        &self,
        name: &str,
        value: Option<&Value>,
        has_logic: bool,
        mixin_used: MixinKind,
    ) -> FieldStatus {
        let status = Self::status_for(value, has_logic);
        let Ok(mut fields) = self.fields.lock() else {
            return status;
        };
        fields
            .entry(name.to_string())
            .and_modify(|field| {
                field.occurrences += 1;
                field.value = value.cloned();
                field.has_logic |= has_logic;
                field.status = status;
                field.mixin_used = mixin_used;
            })
            .or_insert_with(|| TrackedField {
                name: name.to_string(),
                value: value.cloned(),
                has_logic,
                mixin_used,
                status,
                occurrences: 1,
            });
        status
    }

    pub fn status_for(value: Option<&Value>, has_logic: bool) -> FieldStatus {
        let empty = match value {
            None | Some(Value::Null) => true,
            Some(v) => to_display(v).is_empty(),
        };
        if empty {
            FieldStatus::Empty
        } else if has_logic {
            FieldStatus::Logic
        } else {
            FieldStatus::Filled
        }
    }

    /// Adds `other`'s fields. Occurrences add up; the latest value and
    /// status win.
    pub fn absorb(&self, other: &FieldTracker) {
        if Arc::ptr_eq(&self.fields, &other.fields) {
            return;
        }
        let incoming: Vec<TrackedField> = match other.fields.lock() {
            Ok(fields) => fields.values().cloned().collect(),
            Err(_) => return,
        };
        let Ok(mut fields) = self.fields.lock() else {
            return;
        };
        for field in incoming {
            fields
                .entry(field.name.clone())
                .and_modify(|existing| {
                    existing.occurrences += field.occurrences;
                    existing.value = field.value.clone();
                    existing.has_logic |= field.has_logic;
                    existing.status = field.status;
                    existing.mixin_used = field.mixin_used;
                })
                .or_insert(field);
        }
    }

    pub fn get(&self, name: &str) -> Option<TrackedField> {
        self.fields.lock().ok()?.get(name).cloned()
    }

    pub fn clear(&self) {
        if let Ok(mut fields) = self.fields.lock() {
            fields.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.fields.lock().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn report(&self) -> FieldReport {
        let fields: Vec<TrackedField> = self
            .fields
            .lock()
            .map(|f| f.values().cloned().collect())
            .unwrap_or_default();
        let count = |status: FieldStatus| fields.iter().filter(|f| f.status == status).count();
        FieldReport {
            total: fields.len(),
            filled: count(FieldStatus::Filled),
            empty: count(FieldStatus::Empty),
            logic: count(FieldStatus::Logic),
            fields,
        }
    }
}

/// Wraps `inner` in the highlighting span used by field-tracking output.
pub fn highlight_span(field: &str, status: FieldStatus, inner: &str) -> String {
    format!(
        r#"<span class="legal-field {}" data-field="{}">{}</span>"#,
        status.css_class(),
        escape_attr(field),
        inner
    )
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
