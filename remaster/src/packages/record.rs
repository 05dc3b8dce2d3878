//! Package records and sets.

use crate::core::{EntryStatus, PackageStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const KERNEL_PREFIX: &str = "linux-image-";

/// One package known to the target root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    /// Package name, unique within a set.
    pub name: String,
    /// Version string as reported by the package manager.
    pub version: String,
    /// Chosen by the caller for the next install or removal.
    #[serde(default)]
    pub selected_for_action: bool,
    /// Status while a removal is applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PackageStatus>,
}

impl PackageRecord {
    /// Creates an unselected record.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            selected_for_action: false,
            status: None,
        }
    }
}

/// Packages keyed by name.
///
/// Inserting a record whose name is already present replaces it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSet {
    records: BTreeMap<String, PackageRecord>,
}

impl PackageSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a record.
    pub fn insert(&mut self, record: PackageRecord) {
        self.records.insert(record.name.clone(), record);
    }

    /// Looks up a record by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PackageRecord> {
        self.records.get(name)
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in name order.
    pub fn iter(&self) -> impl Iterator<Item = &PackageRecord> {
        self.records.values()
    }

    /// Sets the selection flag. Returns false if `name` is unknown.
    pub fn select(&mut self, name: &str, selected: bool) -> bool {
        match self.records.get_mut(name) {
            Some(record) => {
                record.selected_for_action = selected;
                true
            }
            None => false,
        }
    }

    /// Names of the selected records, in name order.
    #[must_use]
    pub fn selected_names(&self) -> Vec<String> {
        self.records
            .values()
            .filter(|r| r.selected_for_action)
            .map(|r| r.name.clone())
            .collect()
    }

    /// Returns true if any record is selected.
    #[must_use]
    pub fn has_selection(&self) -> bool {
        self.records.values().any(|r| r.selected_for_action)
    }

    /// Sets a record's status.
    pub fn set_status(&mut self, name: &str, status: Option<PackageStatus>) {
        if let Some(record) = self.records.get_mut(name) {
            record.status = status;
        }
    }

    /// Mirrors a removal entry's status onto its package.
    pub fn apply_entry_status(&mut self, name: &str, status: EntryStatus) {
        let status = match status {
            EntryStatus::Pending => None,
            EntryStatus::Running => Some(PackageStatus::Removing),
            EntryStatus::Success => Some(PackageStatus::Removed),
            EntryStatus::Failed => Some(PackageStatus::Error),
        };
        self.set_status(name, status);
    }

    /// Clears every status.
    pub fn clear_statuses(&mut self) {
        for record in self.records.values_mut() {
            record.status = None;
        }
    }

    /// Replaces the contents with a fresh listing. Selections and statuses are dropped.
    pub fn replace_all(&mut self, records: impl IntoIterator<Item = PackageRecord>) {
        self.records.clear();
        for record in records {
            self.insert(record);
        }
    }

    /// Kernel image packages (`linux-image-*`), in name order.
    #[must_use]
    pub fn kernels(&self) -> Vec<&PackageRecord> {
        self.records
            .values()
            .filter(|r| r.name.starts_with(KERNEL_PREFIX))
            .collect()
    }

    /// Records whose name or version contains `query`, ignoring case.
    #[must_use]
    pub fn filter(&self, query: &str) -> Vec<&PackageRecord> {
        let query = query.to_lowercase();
        self.records
            .values()
            .filter(|r| {
                query.is_empty()
                    || r.name.to_lowercase().contains(&query)
                    || r.version.to_lowercase().contains(&query)
            })
            .collect()
    }
}

impl FromIterator<PackageRecord> for PackageSet {
    fn from_iter<I: IntoIterator<Item = PackageRecord>>(iter: I) -> Self {
        let mut set = Self::new();
        set.replace_all(iter);
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> PackageSet {
        [
            PackageRecord::new("vim", "2:8.2.3995-1ubuntu2"),
            PackageRecord::new("nano", "6.2-1"),
            PackageRecord::new("Thunderbird", "1:102.7"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_names_are_unique() {
        let mut set = sample();
        set.insert(PackageRecord::new("vim", "9.0"));
        assert_eq!(set.len(), 3);
        assert_eq!(set.get("vim").map(|r| r.version.as_str()), Some("9.0"));
    }

    #[test]
    fn test_selection() {
        let mut set = sample();
        assert!(!set.has_selection());
        assert!(set.select("vim", true));
        assert!(set.select("nano", true));
        assert!(!set.select("emacs", true));
        assert_eq!(set.selected_names(), vec!["nano", "vim"]);

        set.select("nano", false);
        assert_eq!(set.selected_names(), vec!["vim"]);
    }

    #[test]
    fn test_entry_status_mapping() {
        let mut set = sample();
        set.apply_entry_status("vim", EntryStatus::Running);
        assert_eq!(set.get("vim").unwrap().status, Some(PackageStatus::Removing));
        set.apply_entry_status("vim", EntryStatus::Failed);
        assert_eq!(set.get("vim").unwrap().status, Some(PackageStatus::Error));
        set.apply_entry_status("nano", EntryStatus::Success);
        assert_eq!(set.get("nano").unwrap().status, Some(PackageStatus::Removed));

        set.clear_statuses();
        assert!(set.iter().all(|r| r.status.is_none()));
    }

    #[test]
    fn test_filter_is_case_insensitive() {
        let set = sample();
        let names: Vec<_> = set.filter("THUNDER").iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Thunderbird"]);

        let by_version: Vec<_> = set.filter("6.2").iter().map(|r| r.name.as_str()).collect();
        assert_eq!(by_version, vec!["nano"]);

        assert_eq!(set.filter("").len(), 3);
    }

    #[test]
    fn test_kernels() {
        let mut set = sample();
        set.insert(PackageRecord::new("linux-image-5.15.0-91-generic", "5.15.0-91.101"));
        set.insert(PackageRecord::new("linux-image-generic", "5.15.0.91.88"));
        set.insert(PackageRecord::new("linux-headers-5.15.0-91", "5.15.0-91.101"));

        let names: Vec<_> = set.kernels().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["linux-image-5.15.0-91-generic", "linux-image-generic"]);
        assert!(sample().kernels().is_empty());
    }

    #[test]
    fn test_replace_all_drops_selection() {
        let mut set = sample();
        set.select("vim", true);
        set.replace_all([PackageRecord::new("vim", "2:8.2")]);
        assert_eq!(set.len(), 1);
        assert!(!set.has_selection());
    }
}
