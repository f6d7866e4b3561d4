//! Language allow-list applied to every received event

use std::collections::BTreeSet;

use crate::record::EventRecord;

/// Decide whether a record should be persisted
///
/// An absent allow-list accepts everything. With a list present, a record is
/// accepted only when its `lang` tag is in the list, ignoring ASCII case;
/// records without a tag never match.
pub fn accept(record: &EventRecord, allow_list: Option<&BTreeSet<String>>) -> bool {
    match allow_list {
        None => true,
        Some(langs) => record
            .lang()
            .is_some_and(|lang| langs.iter().any(|allowed| allowed.eq_ignore_ascii_case(lang))),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LanguageFilter {
    allow: Option<BTreeSet<String>>,
}

impl LanguageFilter {
    /// Filter that accepts any language
    pub fn any() -> Self {
        Self { allow: None }
    }

    pub fn only<I, S>(langs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allow = langs
            .into_iter()
            .map(|l| l.as_ref().trim().to_ascii_lowercase())
            .filter(|l| !l.is_empty())
            .collect();
        Self { allow: Some(allow) }
    }

    pub fn from_list(langs: Option<&[String]>) -> Self {
        match langs {
            Some(langs) => Self::only(langs),
            None => Self::any(),
        }
    }

    pub fn accept(&self, record: &EventRecord) -> bool {
        accept(record, self.allow.as_ref())
    }

    pub fn languages(&self) -> Option<&BTreeSet<String>> {
        self.allow.as_ref()
    }

    /// A present but empty allow-list rejects every record
    pub fn rejects_everything(&self) -> bool {
        self.allow.as_ref().is_some_and(BTreeSet::is_empty)
    }

    pub fn describe(&self) -> String {
        match &self.allow {
            None => "any".to_string(),
            Some(langs) if langs.is_empty() => "none".to_string(),
            Some(langs) => langs.iter().cloned().collect::<Vec<_>>().join(","),
        }
    }
}
