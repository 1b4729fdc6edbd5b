//! End-to-end sweeps over on-disk cache layouts with a file journal.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use cache_sweep::{run_sweep, EffectiveConfig, SweepReport};
use serde_json::json;
use sweep_engine::{CacheKind, RootState};
use tempfile::TempDir;

const DEADLINE: i64 = 1_000;
const STALE: i64 = 100;
const FRESH: i64 = 5_000;

const KEY_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const KEY_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
const KEY_C: &str = "cccccccccccccccccccccccccccccccc";

struct Caches {
    _temp_dir: TempDir,
    dir: PathBuf,
    journal: BTreeMap<String, i64>,
}

impl Caches {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().canonicalize().unwrap().join("caches");
        fs::create_dir_all(&dir).unwrap();
        Self {
            _temp_dir: temp_dir,
            dir,
            journal: BTreeMap::new(),
        }
    }

    /// Create a directory with one file in it, recording `accessed` when given.
    fn entry(&mut self, relative: &str, accessed: Option<i64>) -> PathBuf {
        let path = self.dir.join(relative);
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("content"), relative).unwrap();
        if let Some(ts) = accessed {
            self.journal.insert(path.to_string_lossy().into_owned(), ts);
        }
        path
    }

    fn journal_path(&self) -> PathBuf {
        self.dir.join("journal-1").join("file-access.json")
    }

    fn write_journal(&self) {
        let path = self.journal_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let document = json!({ "entries": self.journal });
        fs::write(path, serde_json::to_vec(&document).unwrap()).unwrap();
    }

    fn read_journal(&self) -> BTreeMap<String, i64> {
        let bytes = fs::read(self.journal_path()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        serde_json::from_value(value["entries"].clone()).unwrap()
    }

    fn sweep(&self, extra: serde_json::Value) -> SweepReport {
        let mut overrides = json!({ "caches_dir": self.dir, "workers": 4 });
        if let (Some(base), Some(extra)) = (overrides.as_object_mut(), extra.as_object()) {
            for (key, value) in extra {
                base.insert(key.clone(), value.clone());
            }
        }
        let effective = EffectiveConfig::build(None, Some(overrides)).unwrap();
        run_sweep(&effective, DEADLINE).unwrap()
    }
}

fn key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[test]
fn test_jars_only_stale_recorded_entry_deleted() {
    let mut caches = Caches::new();
    let a = caches.entry(&format!("jars-9/{KEY_A}"), Some(STALE));
    let b = caches.entry(&format!("jars-9/{KEY_B}"), Some(FRESH));
    let c = caches.entry(&format!("jars-9/{KEY_C}"), None);
    let short = caches.entry("jars-9/not-a-key", Some(STALE));
    caches.write_journal();

    let report = caches.sweep(json!({}));

    assert_eq!(report.deleted, 1);
    assert!(!a.exists());
    assert!(b.exists());
    assert!(c.exists());
    assert!(short.exists());

    let journal = caches.read_journal();
    assert!(!journal.contains_key(&key(&a)));
    assert_eq!(journal.get(&key(&b)), Some(&FRESH));

    assert_eq!(report.roots.len(), 1);
    let root = &report.roots[0];
    assert_eq!(root.kind, CacheKind::Jars);
    assert_eq!(root.state, RootState::Done);
    assert_eq!(root.scanned, 3);
    assert!(root.drained);
}

#[test]
fn test_modules_stale_version_pruned_with_parents_and_mirror() {
    let mut caches = Caches::new();
    let h1 = caches.entry("modules-2/files-2.1/org.example/lib/1.0/h1", Some(STALE));
    let h2 = caches.entry("modules-2/files-2.1/org.example/lib/1.0/h2", Some(STALE + 1));
    let mirror = caches.entry("modules-2/metadata-2.97/descriptors/org.example/lib/1.0", None);
    let kept = caches.entry("modules-2/files-2.1/org.other/tool/2.0/h3", Some(FRESH));
    caches.write_journal();

    let report = caches.sweep(json!({}));

    let root = &report.roots[0];
    assert_eq!(root.kind, CacheKind::Modules);
    assert_eq!(root.deleted, 1);
    assert_eq!(root.mirrors_deleted, 1);
    assert_eq!(root.pruned, 2);

    let files = caches.dir.join("modules-2/files-2.1");
    assert!(!h1.exists());
    assert!(!h2.exists());
    assert!(!mirror.exists());
    assert!(!files.join("org.example/lib").exists());
    assert!(!files.join("org.example").exists());
    assert!(files.exists());
    assert!(kept.exists());

    let journal = caches.read_journal();
    assert!(!journal.contains_key(&key(&h1)));
    assert!(!journal.contains_key(&key(&h2)));
    assert!(journal.contains_key(&key(&kept)));
}

#[test]
fn test_modules_one_fresh_leaf_keeps_version() {
    let mut caches = Caches::new();
    let h1 = caches.entry("modules-2/files-2.1/org.example/lib/1.0/h1", Some(STALE));
    let h2 = caches.entry("modules-2/files-2.1/org.example/lib/1.0/h2", Some(FRESH));
    caches.write_journal();

    let report = caches.sweep(json!({}));

    assert_eq!(report.deleted, 0);
    assert!(h1.exists());
    assert!(h2.exists());
}

#[test]
fn test_sibling_version_keeps_artifact_dir() {
    let mut caches = Caches::new();
    let old = caches.entry("modules-2/files-2.1/org.example/lib/1.0/h1", Some(STALE));
    let new = caches.entry("modules-2/files-2.1/org.example/lib/2.0/h2", Some(FRESH));
    caches.write_journal();

    let report = caches.sweep(json!({}));

    assert_eq!(report.deleted, 1);
    assert_eq!(report.roots[0].pruned, 0);
    assert!(!old.exists());
    assert!(new.exists());
}

#[test]
fn test_missing_mirror_is_not_an_error() {
    let mut caches = Caches::new();
    caches.entry("modules-2/metadata-2.97/descriptors", None);
    let h1 = caches.entry("modules-2/files-2.1/org.example/lib/1.0/h1", Some(STALE));
    caches.write_journal();

    let report = caches.sweep(json!({}));

    let root = &report.roots[0];
    assert_eq!(root.state, RootState::Done);
    assert_eq!(root.deleted, 1);
    assert_eq!(root.mirrors_deleted, 0);
    assert!(root.failures.is_empty());
    assert!(!h1.exists());
}

#[test]
fn test_second_run_deletes_nothing() {
    let mut caches = Caches::new();
    caches.entry(&format!("jars-9/{KEY_A}"), Some(STALE));
    caches.entry("modules-2/files-2.1/org.example/lib/1.0/h1", Some(STALE));
    caches.write_journal();

    let first = caches.sweep(json!({}));
    assert_eq!(first.deleted, 2);

    let second = caches.sweep(json!({}));
    assert_eq!(second.deleted, 0);
    assert_eq!(second.planned, 0);
}

#[test]
fn test_dry_run_leaves_disk_and_journal_alone() {
    let mut caches = Caches::new();
    let a = caches.entry(&format!("jars-9/{KEY_A}"), Some(STALE));
    caches.write_journal();
    let before = fs::read(caches.journal_path()).unwrap();

    let report = caches.sweep(json!({ "dry_run": true }));

    assert!(report.dry_run);
    assert_eq!(report.planned, 1);
    assert_eq!(report.deleted, 0);
    assert!(a.exists());
    assert_eq!(fs::read(caches.journal_path()).unwrap(), before);
    assert_eq!(report.human_line(), format!("Would delete 1 in {}ms (dry run)", report.duration_ms));
}

#[test]
fn test_unrecognized_roots_ignored() {
    let mut caches = Caches::new();
    let transforms = caches.entry(&format!("transforms-3/{KEY_A}"), Some(STALE));
    caches.write_journal();

    let report = caches.sweep(json!({}));

    assert!(report.roots.is_empty());
    assert!(report.ignored.contains(&caches.dir.join("transforms-3")));
    assert!(report.ignored.contains(&caches.dir.join("journal-1")));
    assert!(transforms.exists());
}

#[test]
fn test_missing_journal_deletes_nothing() {
    let mut caches = Caches::new();
    let a = caches.entry(&format!("jars-9/{KEY_A}"), Some(STALE));

    let report = caches.sweep(json!({}));

    assert_eq!(report.deleted, 0);
    assert!(a.exists());
    assert!(!caches.journal_path().exists());
}

#[test]
fn test_custom_key_length() {
    let mut caches = Caches::new();
    let short = caches.entry("jars-9/abcd", Some(STALE));
    let long = caches.entry(&format!("jars-9/{KEY_A}"), Some(STALE));
    caches.write_journal();

    let report = caches.sweep(json!({ "cache_key_length": 4 }));

    assert_eq!(report.deleted, 1);
    assert!(!short.exists());
    assert!(long.exists());
}

#[test]
fn test_all_versions_stale_prunes_artifact_and_group() {
    let mut caches = Caches::new();
    let v1 = caches.entry("modules-2/files-2.1/org.example/lib/1.0/h1", Some(STALE));
    let v2 = caches.entry("modules-2/files-2.1/org.example/lib/2.0/h2", Some(STALE));
    caches.write_journal();

    let report = caches.sweep(json!({}));

    let root = &report.roots[0];
    assert_eq!(root.deleted, 2);
    assert_eq!(root.pruned, 2);
    assert!(!v1.exists());
    assert!(!v2.exists());
    assert!(!caches.dir.join("modules-2/files-2.1/org.example").exists());
}

#[test]
fn test_version_in_two_files_dirs_shares_one_mirror() {
    let mut caches = Caches::new();
    let h1 = caches.entry("modules-2/files-2.0/org.example/lib/1.0/h1", Some(STALE));
    let h2 = caches.entry("modules-2/files-2.1/org.example/lib/1.0/h2", Some(STALE));
    let mirror = caches.entry("modules-2/metadata-2.97/descriptors/org.example/lib/1.0", None);
    caches.write_journal();

    let report = caches.sweep(json!({}));

    let root = &report.roots[0];
    assert_eq!(root.deleted, 2);
    assert_eq!(root.mirrors_deleted, 1);
    assert!(root.failures.is_empty(), "{:?}", root.failures);
    assert!(!h1.exists());
    assert!(!h2.exists());
    assert!(!mirror.exists());
    assert!(caches.read_journal().is_empty());
}

#[test]
fn test_indirect_caches_dir_still_matches_journal() {
    let mut caches = Caches::new();
    let a = caches.entry(&format!("jars-9/{KEY_A}"), Some(STALE));
    caches.write_journal();

    let indirect = caches.dir.join("jars-9").join("..");
    let report = caches.sweep(json!({
        "caches_dir": indirect,
        "journal_path": caches.journal_path(),
    }));

    assert_eq!(report.deleted, 1);
    assert!(!a.exists());
}
