//! Append-only, bounded table mapping category-group strings to an
//! atomically readable enable/disable status.

use std::cell::UnsafeCell;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use crate::stats::StatsCallback;
use crate::string_utils::{glob_match, split_string};

pub const REGISTRY_SIZE: usize = 250;
const INDEX_DEFAULT: usize = 0;
const INDEX_CATEGORY_LIMIT: usize = 1;
const INDEX_METADATA: usize = 2;
const INDEX_NON_DEFAULT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CategoryStatus {
    Disabled = 0,
    Enabled = 1,
}

pub struct AtomicCategoryStatus(AtomicU8);

impl AtomicCategoryStatus {
    fn new(status: CategoryStatus) -> Self {
        AtomicCategoryStatus(AtomicU8::new(status as u8))
    }

    pub fn load(&self) -> CategoryStatus {
        match self.0.load(Ordering::Acquire) {
            1 => CategoryStatus::Enabled,
            _ => CategoryStatus::Disabled,
        }
    }

    fn store(&self, status: CategoryStatus) {
        self.0.store(status as u8, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.load() == CategoryStatus::Enabled
    }
}

#[derive(Default)]
struct Policies {
    enabled: Vec<String>,
    disabled: Vec<String>,
}

/// Fixed-capacity registry of category groups. Slots 0-2 are reserved
/// (`"default"`, `"category limit reached"`, `"__metadata"`); entries
/// beyond slot `REGISTRY_SIZE` all collapse onto the permanently-Disabled
/// limit sentinel.
///
/// `groups` is read lock-free up to the published `group_count`; writes to
/// an as-yet-unpublished slot happen only while `policies` is held, and the
/// `Release` store that publishes the new count happens-after the write, so
/// an `Acquire` load of `group_count` on another thread always observes a
/// fully-written string for every index below it.
pub struct CategoryRegistry {
    group_count: AtomicUsize,
    groups: Box<[UnsafeCell<String>]>,
    statuses: Box<[AtomicCategoryStatus]>,
    policies: Mutex<Policies>,
}

unsafe impl Send for CategoryRegistry {}
unsafe impl Sync for CategoryRegistry {}

impl CategoryRegistry {
    pub fn new() -> Self {
        let mut groups: Box<[UnsafeCell<String>]> = (0..REGISTRY_SIZE)
            .map(|_| UnsafeCell::new(String::new()))
            .collect();
        *groups[INDEX_DEFAULT].get_mut() = "default".to_string();
        *groups[INDEX_CATEGORY_LIMIT].get_mut() = "category limit reached".to_string();
        *groups[INDEX_METADATA].get_mut() = "__metadata".to_string();

        let statuses = (0..REGISTRY_SIZE)
            .map(|_| AtomicCategoryStatus::new(CategoryStatus::Disabled))
            .collect();

        CategoryRegistry {
            group_count: AtomicUsize::new(INDEX_NON_DEFAULT),
            groups,
            statuses,
            policies: Mutex::new(Policies::default()),
        }
    }

    /// Returns the stable status slot for `category_group`, inserting it if
    /// this is the first time it has been seen. The returned reference is
    /// stable for the registry's lifetime.
    pub fn get_status(&self, category_group: &str) -> &AtomicCategoryStatus {
        let curr = self.group_count.load(Ordering::Acquire);
        if let Some(i) = (0..curr).find(|&i| self.group_at(i) == category_group) {
            return &self.statuses[i];
        }

        let mut policies = self.policies.lock().unwrap();
        let curr = self.group_count.load(Ordering::Relaxed);
        if let Some(i) = (0..curr).find(|&i| self.group_at(i) == category_group) {
            return &self.statuses[i];
        }

        if curr < REGISTRY_SIZE {
            unsafe {
                *self.groups[curr].get() = category_group.to_string();
            }
            let computed = calculate_enabled(category_group, &policies.enabled, &policies.disabled);
            self.statuses[curr].store(computed);
            self.group_count.fetch_add(1, Ordering::Release);
            &self.statuses[curr]
        } else {
            &self.statuses[INDEX_CATEGORY_LIMIT]
        }
    }

    fn group_at(&self, i: usize) -> &str {
        unsafe { &*self.groups[i].get() }
    }

    pub fn update_enabled(&self, enabled: Vec<String>, disabled: Vec<String>) {
        let mut policies = self.policies.lock().unwrap();
        policies.enabled = enabled;
        policies.disabled = disabled;

        let curr = self.group_count.load(Ordering::Relaxed);
        for i in 0..curr {
            let computed = calculate_enabled(self.group_at(i), &policies.enabled, &policies.disabled);
            self.statuses[i].store(computed);
        }
    }

    pub fn disable_all(&self) {
        let mut policies = self.policies.lock().unwrap();
        policies.enabled.clear();
        policies.disabled.clear();

        let curr = self.group_count.load(Ordering::Relaxed);
        for i in 0..curr {
            self.statuses[i].store(CategoryStatus::Disabled);
        }
    }

    pub fn stats(&self, cb: &mut dyn StatsCallback) {
        let _policies = self.policies.lock().unwrap();
        cb.record(
            "registry_group_count",
            self.group_count.load(Ordering::Relaxed).into(),
        );
    }
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A group string is Enabled iff some constituent category matches at
/// least one enabled pattern *and* matches no disabled pattern.
fn calculate_enabled(category_group: &str, enabled: &[String], disabled: &[String]) -> CategoryStatus {
    let categories = split_string(category_group, ',');

    let enabled_relevant: Vec<&String> = categories
        .iter()
        .filter(|category| enabled.iter().any(|pattern| glob_match(pattern, category)))
        .collect();

    for category in enabled_relevant {
        if !disabled.iter().any(|pattern| glob_match(pattern, category)) {
            return CategoryStatus::Enabled;
        }
    }

    CategoryStatus::Disabled
}
