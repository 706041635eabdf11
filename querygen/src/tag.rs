//! GORM-style tag sets.
//!
//! A tag set is an ordered `key -> values` mapping written as
//! `column:id;type:bigint;primaryKey;not null`. Keys are case-sensitive and
//! keep their insertion order so a rendered tag is byte-for-byte stable.

use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    entries: Vec<(String, Vec<String>)>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `key:value;flag;key:value`.
    ///
    /// A key seen twice keeps its first position and collects both values.
    /// `\;` escapes a literal semicolon inside a value.
    pub fn parse(raw: &str) -> Self {
        let mut tags = Self::new();
        for part in split_unescaped(raw) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match part.split_once(':') {
                Some((key, value)) => tags.append(key.trim(), value.trim()),
                None => tags.flag(part),
            }
        }
        tags
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// All values of `key`
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, values)| values.as_slice())
    }

    /// First value of `key`
    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Values of `key` split on commas, e.g. `foreignKey:OrgID,UserID`
    pub fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .into_iter()
            .flatten()
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Replace the values of `key`, keeping its position if present
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, values)) => *values = vec![value],
            None => self.entries.push((key.to_string(), vec![value])),
        }
    }

    /// Add a valueless key such as `primaryKey` or `not null`
    pub fn flag(&mut self, key: &str) {
        if !self.contains(key) {
            self.entries.push((key.to_string(), Vec::new()));
        }
    }

    /// Add one more value for `key`
    pub fn append(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((key.to_string(), vec![value])),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Overlay `other` onto `self`: its keys replace ours in place, new keys go last
    pub fn merge(&mut self, other: &TagSet) {
        for (key, values) in &other.entries {
            match self.entries.iter_mut().find(|(k, _)| k == key) {
                Some((_, existing)) => *existing = values.clone(),
                None => self.entries.push((key.clone(), values.clone())),
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, values) in &self.entries {
            if values.is_empty() {
                if !first {
                    f.write_str(";")?;
                }
                f.write_str(key)?;
                first = false;
                continue;
            }
            for value in values {
                if !first {
                    f.write_str(";")?;
                }
                write!(f, "{}:{}", key, value.replace(';', "\\;"))?;
                first = false;
            }
        }
        Ok(())
    }
}

fn split_unescaped(raw: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&';') => {
                current.push(';');
                chars.next();
            }
            ';' => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_render_preserve_order() {
        let raw = "column:id;type:bigint(20) unsigned;primaryKey;autoIncrement:true";
        let tags = TagSet::parse(raw);
        assert_eq!(tags.first("column"), Some("id"));
        assert!(tags.contains("primaryKey"));
        assert!(!tags.contains("primarykey"));
        assert_eq!(tags.to_string(), raw);
    }

    #[test]
    fn test_set_keeps_position_and_remove() {
        let mut tags = TagSet::parse("column:name;comment:the name;not null");
        tags.set("column", "full_name");
        tags.remove("comment");
        tags.append("index", "idx_name,priority:1");
        assert_eq!(tags.to_string(), "column:full_name;not null;index:idx_name,priority:1");
    }

    #[test]
    fn test_list_splits_composite_keys() {
        let tags = TagSet::parse("foreignKey:OrgID, UserID;references:ID");
        assert_eq!(tags.list("foreignKey"), vec!["OrgID", "UserID"]);
        assert_eq!(tags.list("references"), vec!["ID"]);
        assert!(tags.list("missing").is_empty());
    }

    #[test]
    fn test_escaped_semicolon_round_trips() {
        let mut tags = TagSet::new();
        tags.set("comment", "a;b");
        let rendered = tags.to_string();
        assert_eq!(rendered, "comment:a\\;b");
        assert_eq!(TagSet::parse(&rendered).first("comment"), Some("a;b"));
    }

    #[test]
    fn test_merge_overrides_in_place() {
        let mut base = TagSet::parse("column:id;type:int;not null");
        base.merge(&TagSet::parse("type:bigint;comment:pk"));
        assert_eq!(base.to_string(), "column:id;type:bigint;not null;comment:pk");
    }
}
