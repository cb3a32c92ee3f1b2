//! Tabs of newest-first items with a shared capacity bound.

use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use clipkeep_types::MimeData;
use tracing::{debug, info};

use super::persist::{read_items, remove_file, tab_path, write_items};
use super::{HISTORY_TARGET, HistoryError};

/// Name given to the default tab when no tab is configured.
pub const DEFAULT_TAB: &str = "clipboard";

/// Result of [`HistoryStore::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The item now sits at the given row.
    Committed(usize),
    /// The item was blank or repeated the newest item.
    Skipped,
}

/// A tab whose file failed to load at startup.
#[derive(Debug)]
pub struct TabLoadFailure {
    /// Tab that starts empty.
    pub tab: String,
    /// Why the file was rejected.
    pub error: HistoryError,
}

#[derive(Debug, Clone)]
struct Tab {
    name: String,
    items: VecDeque<MimeData>,
}

impl Tab {
    fn new(name: String) -> Self {
        Self {
            name,
            items: VecDeque::new(),
        }
    }

    fn evict_to(&mut self, capacity: usize) -> usize {
        let excess = self.items.len().saturating_sub(capacity);
        self.items.truncate(capacity);
        excess
    }

    fn row(&self, row: usize) -> Result<usize, HistoryError> {
        if row < self.items.len() {
            Ok(row)
        } else {
            Err(out_of_range(row, self.items.len()))
        }
    }
}

/// The clipboard history: ordered tabs, each bounded by `capacity`.
///
/// Only the engine owner touches a store, so every method runs to completion
/// before anyone can observe the tab again.
#[derive(Debug)]
pub struct HistoryStore {
    dir: PathBuf,
    tabs: Vec<Tab>,
    capacity: usize,
    dirty: bool,
    stale_files: BTreeSet<String>,
}

impl HistoryStore {
    /// Creates empty tabs named by `names`, keeping the first occurrence of
    /// duplicates and skipping empty names. A default tab is created when no
    /// usable name remains.
    pub fn new<I, S>(dir: impl Into<PathBuf>, names: I, capacity: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tabs: Vec<Tab> = Vec::new();
        for name in names {
            let name = name.into();
            if name.is_empty() || tabs.iter().any(|tab| tab.name == name) {
                continue;
            }
            tabs.push(Tab::new(name));
        }
        if tabs.is_empty() {
            tabs.push(Tab::new(DEFAULT_TAB.to_owned()));
        }
        Self {
            dir: dir.into(),
            tabs,
            capacity: capacity.max(1),
            dirty: false,
            stale_files: BTreeSet::new(),
        }
    }

    /// Creates the tabs and fills each from its file in `dir`.
    ///
    /// A tab whose file is missing starts empty. A tab whose file fails the
    /// integrity check also starts empty and is listed in the returned
    /// failures; the remaining tabs still load.
    pub fn load<I, S>(
        dir: impl Into<PathBuf>,
        names: I,
        capacity: usize,
    ) -> (Self, Vec<TabLoadFailure>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut store = Self::new(dir, names, capacity);
        let mut failures = Vec::new();
        let capacity = store.capacity;
        let dir = store.dir.clone();
        for tab in &mut store.tabs {
            match read_items(&tab_path(&dir, &tab.name)) {
                Ok(Some(items)) => {
                    tab.items = items.into();
                    tab.evict_to(capacity);
                    debug!(
                        target: HISTORY_TARGET,
                        tab = %tab.name,
                        items = tab.items.len(),
                        "tab loaded"
                    );
                }
                Ok(None) => {}
                Err(error) => failures.push(TabLoadFailure {
                    tab: tab.name.clone(),
                    error,
                }),
            }
        }
        (store, failures)
    }

    /// Writes every tab to its file and deletes files of removed or renamed
    /// tabs. Clears the dirty flag on success.
    ///
    /// # Errors
    ///
    /// Fails on the first file that cannot be written or deleted; the
    /// in-memory state is untouched either way.
    pub fn save(&mut self) -> Result<(), HistoryError> {
        for tab in &self.tabs {
            write_items(&tab_path(&self.dir, &tab.name), &tab.items)?;
        }
        while let Some(name) = self.stale_files.pop_first() {
            if let Err(error) = remove_file(&tab_path(&self.dir, &name)) {
                self.stale_files.insert(name);
                return Err(error);
            }
        }
        self.dirty = false;
        info!(
            target: HISTORY_TARGET,
            tabs = self.tabs.len(),
            dir = %self.dir.display(),
            "history saved"
        );
        Ok(())
    }

    /// Directory holding the tab files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// True when there are changes not yet saved.
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Maximum number of items per tab.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Changes the capacity and evicts the oldest items of every tab that
    /// now exceeds it. Returns the tabs that lost items.
    pub fn set_capacity(&mut self, capacity: usize) -> Vec<String> {
        self.capacity = capacity.max(1);
        let mut trimmed = Vec::new();
        for tab in &mut self.tabs {
            if tab.evict_to(self.capacity) > 0 {
                trimmed.push(tab.name.clone());
            }
        }
        if !trimmed.is_empty() {
            self.dirty = true;
        }
        trimmed
    }

    /// Name of the default tab, which is always the first one.
    pub fn default_tab(&self) -> &str {
        self.tabs.first().map_or(DEFAULT_TAB, |tab| tab.name.as_str())
    }

    /// Tab names in order.
    pub fn tab_names(&self) -> Vec<String> {
        self.tabs.iter().map(|tab| tab.name.clone()).collect()
    }

    /// Returns true when a tab with this name exists.
    pub fn contains_tab(&self, name: &str) -> bool {
        self.tabs.iter().any(|tab| tab.name == name)
    }

    /// Number of items in `tab`.
    ///
    /// # Errors
    ///
    /// Fails when the tab does not exist.
    pub fn len(&self, tab: &str) -> Result<usize, HistoryError> {
        Ok(self.tab(tab)?.items.len())
    }

    /// Items of `tab`, newest first.
    ///
    /// # Errors
    ///
    /// Fails when the tab does not exist.
    pub fn items(&self, tab: &str) -> Result<impl ExactSizeIterator<Item = &MimeData>, HistoryError> {
        Ok(self.tab(tab)?.items.iter())
    }

    /// Item at `row` of `tab`.
    ///
    /// # Errors
    ///
    /// Fails when the tab does not exist or the row is out of range.
    pub fn get(&self, tab: &str, row: usize) -> Result<&MimeData, HistoryError> {
        let tab = self.tab(tab)?;
        tab.items
            .get(row)
            .ok_or_else(|| out_of_range(row, tab.items.len()))
    }

    /// Adds `item` as the newest entry of `tab`, evicting the oldest item when
    /// the tab is full.
    ///
    /// Blank items and items repeating the current newest entry are skipped.
    ///
    /// # Errors
    ///
    /// Fails when the tab does not exist.
    pub fn commit(&mut self, tab: &str, item: MimeData) -> Result<CommitOutcome, HistoryError> {
        let capacity = self.capacity;
        let target = self.tab_mut(tab)?;
        if item.is_blank()
            || target
                .items
                .front()
                .is_some_and(|newest| newest.same_content(&item))
        {
            return Ok(CommitOutcome::Skipped);
        }
        target.items.push_front(item);
        let evicted = target.evict_to(capacity);
        debug!(
            target: HISTORY_TARGET,
            tab,
            evicted,
            "item committed"
        );
        self.dirty = true;
        Ok(CommitOutcome::Committed(0))
    }

    /// Inserts `item` before `row`; `row` equal to the tab length appends.
    /// The oldest item is evicted when the tab overflows, which may be the
    /// inserted item itself when it was appended to a full tab.
    ///
    /// # Errors
    ///
    /// Fails when the tab does not exist or the row lies past the end.
    pub fn insert(&mut self, tab: &str, row: usize, item: MimeData) -> Result<usize, HistoryError> {
        let capacity = self.capacity;
        let target = self.tab_mut(tab)?;
        if row > target.items.len() {
            return Err(out_of_range(row, target.items.len()));
        }
        target.items.insert(row, item);
        target.evict_to(capacity);
        self.dirty = true;
        Ok(row)
    }

    /// Replaces the item at `row` in place. This is the edit path.
    ///
    /// # Errors
    ///
    /// Fails when the tab does not exist or the row is out of range.
    pub fn replace(&mut self, tab: &str, row: usize, item: MimeData) -> Result<(), HistoryError> {
        let target = self.tab_mut(tab)?;
        let index = target.row(row)?;
        if let Some(slot) = target.items.get_mut(index) {
            *slot = item;
        }
        self.dirty = true;
        Ok(())
    }

    /// Removes the listed rows, ignoring rows past the end, and returns how
    /// many items were removed.
    ///
    /// # Errors
    ///
    /// Fails when the tab does not exist.
    pub fn remove(&mut self, tab: &str, rows: &BTreeSet<usize>) -> Result<usize, HistoryError> {
        let target = self.tab_mut(tab)?;
        let mut removed = 0;
        for row in rows.iter().rev() {
            if target.items.remove(*row).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            self.dirty = true;
        }
        Ok(removed)
    }

    /// Moves the item at `row` so that it ends up at `to_row`.
    ///
    /// # Errors
    ///
    /// Fails when the tab does not exist or either row is out of range.
    pub fn move_item(&mut self, tab: &str, row: usize, to_row: usize) -> Result<(), HistoryError> {
        let target = self.tab_mut(tab)?;
        let from = target.row(row)?;
        let to = target.row(to_row)?;
        if from == to {
            return Ok(());
        }
        if let Some(item) = target.items.remove(from) {
            target.items.insert(to, item);
        }
        self.dirty = true;
        Ok(())
    }

    /// Appends `items` after the oldest entry of `tab`, keeping their order,
    /// until the tab is full. Returns how many were added.
    ///
    /// # Errors
    ///
    /// Fails when the tab does not exist.
    pub fn append(&mut self, tab: &str, items: Vec<MimeData>) -> Result<usize, HistoryError> {
        let capacity = self.capacity;
        let target = self.tab_mut(tab)?;
        let room = capacity.saturating_sub(target.items.len());
        let added = items.len().min(room);
        target.items.extend(items.into_iter().take(room));
        if added > 0 {
            self.dirty = true;
        }
        Ok(added)
    }

    /// Creates an empty tab after the existing ones.
    ///
    /// # Errors
    ///
    /// Fails for an empty or already used name.
    pub fn create_tab(&mut self, name: &str) -> Result<(), HistoryError> {
        self.check_new_name(name)?;
        self.tabs.push(Tab::new(name.to_owned()));
        self.stale_files.remove(name);
        self.dirty = true;
        info!(target: HISTORY_TARGET, tab = name, "tab created");
        Ok(())
    }

    /// Creates the tab unless it exists. Returns true when it was created.
    ///
    /// # Errors
    ///
    /// Fails for an empty name.
    pub fn ensure_tab(&mut self, name: &str) -> Result<bool, HistoryError> {
        if self.contains_tab(name) {
            return Ok(false);
        }
        self.create_tab(name)?;
        Ok(true)
    }

    /// Removes a tab and its items. The last tab cannot be removed.
    ///
    /// # Errors
    ///
    /// Fails when the tab does not exist or is the only one left.
    pub fn remove_tab(&mut self, name: &str) -> Result<(), HistoryError> {
        let index = self.tab_index(name)?;
        if self.tabs.len() == 1 {
            return Err(HistoryError::LastTab {
                name: name.to_owned(),
            });
        }
        self.tabs.remove(index);
        self.stale_files.insert(name.to_owned());
        self.dirty = true;
        info!(target: HISTORY_TARGET, tab = name, "tab removed");
        Ok(())
    }

    /// Renames a tab, keeping its position and items.
    ///
    /// # Errors
    ///
    /// Fails when `old` does not exist or `new` is empty or taken.
    pub fn rename_tab(&mut self, old: &str, new: &str) -> Result<(), HistoryError> {
        let index = self.tab_index(old)?;
        self.check_new_name(new)?;
        if let Some(tab) = self.tabs.get_mut(index) {
            tab.name = new.to_owned();
        }
        self.stale_files.insert(old.to_owned());
        self.stale_files.remove(new);
        self.dirty = true;
        info!(target: HISTORY_TARGET, from = old, to = new, "tab renamed");
        Ok(())
    }

    fn check_new_name(&self, name: &str) -> Result<(), HistoryError> {
        if name.is_empty() {
            return Err(HistoryError::EmptyName);
        }
        if self.contains_tab(name) {
            return Err(HistoryError::DuplicateName {
                name: name.to_owned(),
            });
        }
        Ok(())
    }

    fn tab_index(&self, name: &str) -> Result<usize, HistoryError> {
        self.tabs
            .iter()
            .position(|tab| tab.name == name)
            .ok_or_else(|| HistoryError::tab_not_found(name))
    }

    fn tab(&self, name: &str) -> Result<&Tab, HistoryError> {
        self.tabs
            .iter()
            .find(|tab| tab.name == name)
            .ok_or_else(|| HistoryError::tab_not_found(name))
    }

    fn tab_mut(&mut self, name: &str) -> Result<&mut Tab, HistoryError> {
        self.tabs
            .iter_mut()
            .find(|tab| tab.name == name)
            .ok_or_else(|| HistoryError::tab_not_found(name))
    }
}

fn out_of_range(row: usize, len: usize) -> HistoryError {
    HistoryError::RowOutOfRange {
        row: i64::try_from(row).unwrap_or(i64::MAX),
        len,
    }
}
