use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QaError;
use crate::state::BugReport;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBank {
    #[serde(default)]
    pub recurring_issues: BTreeMap<String, Vec<IssueEntry>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueEntry {
    pub report: BugReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returncode: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl IssueEntry {
    pub fn new(report: BugReport) -> Self {
        Self {
            report,
            returncode: None,
            recorded_at: Some(Utc::now()),
            run_id: None,
        }
    }
}

/// Whole-document JSON store for recurring issues.
///
/// Every write is load, mutate, replace. Writers in the same process are
/// serialized; separate processes are last-writer-wins.
#[derive(Debug)]
pub struct MemoryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<MemoryBank, QaError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(MemoryBank::default()),
            Err(e) => return Err(QaError::persistence(&self.path, e)),
        };

        serde_json::from_str(&raw).map_err(|e| QaError::persistence(&self.path, e))
    }

    pub fn save(&self, bank: &MemoryBank) -> Result<(), QaError> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| QaError::persistence(&self.path, e))?;

        let text = serde_json::to_string_pretty(bank).map_err(|e| QaError::persistence(&self.path, e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent)
            .map_err(|e| QaError::persistence(&self.path, e))?;
        tmp.write_all(text.as_bytes())
            .map_err(|e| QaError::persistence(&self.path, e))?;
        tmp.persist(&self.path)
            .map_err(|e| QaError::persistence(&self.path, e.error))?;
        Ok(())
    }

    /// Append to `bank` under `key` and write the whole bank back.
    pub fn append_issue(&self, bank: &mut MemoryBank, key: &str, entry: IssueEntry) -> Result<(), QaError> {
        bank.recurring_issues
            .entry(key.to_string())
            .or_default()
            .push(entry);
        self.save(bank)
    }

    /// Fresh load + append, serialized against other writers in this process.
    pub fn record_issue(&self, key: &str, entry: IssueEntry) -> Result<MemoryBank, QaError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut bank = self.load()?;
        self.append_issue(&mut bank, key, entry)?;
        Ok(bank)
    }

    pub fn issues_for(&self, key: &str) -> Result<Vec<IssueEntry>, QaError> {
        Ok(self
            .load()?
            .recurring_issues
            .remove(key)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Severity;

    fn report(title: &str) -> BugReport {
        BugReport {
            title: title.into(),
            description: "tail".into(),
            severity: Severity::Medium,
            suggested_fix: "fix it".into(),
        }
    }

    #[test]
    fn missing_file_loads_empty_bank() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path().join("nested/memory_bank.json"));
        assert_eq!(store.load().unwrap(), MemoryBank::default());
    }

    #[test]
    fn save_then_load_is_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path().join("data/memory_bank.json"));

        let mut bank = MemoryBank::default();
        bank.recurring_issues
            .insert("a.py".into(), vec![IssueEntry::new(report("one"))]);
        store.save(&bank).unwrap();

        assert_eq!(store.load().unwrap(), bank);
    }

    #[test]
    fn append_keeps_prior_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path().join("memory_bank.json"));

        store.record_issue("a.py", IssueEntry::new(report("one"))).unwrap();
        store.record_issue("b.py", IssueEntry::new(report("other"))).unwrap();
        store.record_issue("a.py", IssueEntry::new(report("two"))).unwrap();

        let titles: Vec<String> = store
            .issues_for("a.py")
            .unwrap()
            .into_iter()
            .map(|e| e.report.title)
            .collect();
        assert_eq!(titles, vec!["one", "two"]);
        assert_eq!(store.issues_for("b.py").unwrap().len(), 1);
    }

    #[test]
    fn file_shape_matches_documented_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory_bank.json");
        let store = MemoryStore::new(&path);

        store.record_issue("calc.py", IssueEntry::new(report("t"))).unwrap();

        let v: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let entry = &v["recurring_issues"]["calc.py"][0]["report"];
        assert_eq!(entry["severity"], "medium");
        assert_eq!(entry["suggested_fix"], "fix it");
    }

    #[test]
    fn corrupt_file_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory_bank.json");
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            MemoryStore::new(&path).load(),
            Err(QaError::Persistence { .. })
        ));
    }

    #[test]
    fn minimal_legacy_entries_still_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory_bank.json");
        fs::write(
            &path,
            r#"{"recurring_issues": {"x.py": [{"report": {"title": "t", "description": "d", "severity": "high", "suggested_fix": "s"}}]}}"#,
        )
        .unwrap();

        let bank = MemoryStore::new(&path).load().unwrap();
        assert_eq!(bank.recurring_issues["x.py"][0].report.severity, Severity::High);
        assert_eq!(bank.recurring_issues["x.py"][0].recorded_at, None);
    }
}
