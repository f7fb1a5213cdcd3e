//! Stash shelf: a 3x3 cubby layout for arranging yarn balls.
//!
//! The layout is local state only. The backend knows nothing about it, so it
//! is persisted next to the token file and carried in backups separately
//! from the server data.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::Yarn;

/// Slot identifiers, row letter then column number.
pub const SLOT_IDS: [&str; 9] = ["A1", "A2", "A3", "B1", "B2", "B3", "C1", "C2", "C3"];

/// Yarn balls that fit in one slot.
pub const SLOT_CAPACITY: usize = 6;

/// Layout file name in the data directory.
pub const SHELF_FILE: &str = "stashShelf.v2.json";

/// Yarn ids per slot, in placement order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShelfLayout {
    slots: BTreeMap<String, Vec<i64>>,
}

impl Default for ShelfLayout {
    fn default() -> Self {
        Self {
            slots: SLOT_IDS.iter().map(|s| (s.to_string(), Vec::new())).collect(),
        }
    }
}

impl ShelfLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_slot(slot: &str) -> bool {
        SLOT_IDS.contains(&slot)
    }

    /// Yarn ids in `slot`; empty for unknown slots.
    pub fn slot(&self, slot: &str) -> &[i64] {
        self.slots.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Place `yarn` in `slot`. Returns false when the slot is unknown, full,
    /// or already holds it.
    pub fn add(&mut self, slot: &str, yarn: i64) -> bool {
        if !Self::is_slot(slot) {
            return false;
        }
        let balls = self.slots.entry(slot.to_string()).or_default();
        if balls.len() >= SLOT_CAPACITY || balls.contains(&yarn) {
            return false;
        }
        balls.push(yarn);
        true
    }

    /// Move `yarn` from `from` to `to`.
    ///
    /// The ball always leaves its source slot. If the destination is full or
    /// already holds it, the ball ends up back in the tray and false is
    /// returned.
    pub fn move_yarn(&mut self, from: &str, to: &str, yarn: i64) -> bool {
        if !Self::is_slot(to) {
            return false;
        }
        self.clear_ball(from, yarn);
        self.add(to, yarn)
    }

    /// Take one ball off a slot. Returns whether it was there.
    pub fn clear_ball(&mut self, slot: &str, yarn: i64) -> bool {
        match self.slots.get_mut(slot) {
            Some(balls) => match balls.iter().position(|&id| id == yarn) {
                Some(idx) => {
                    balls.remove(idx);
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    /// Empty one slot.
    pub fn clear_all(&mut self, slot: &str) {
        if let Some(balls) = self.slots.get_mut(slot) {
            balls.clear();
        }
    }

    /// Take a ball off every slot, e.g. after the yarn was deleted.
    pub fn remove_everywhere(&mut self, yarn: i64) {
        for balls in self.slots.values_mut() {
            balls.retain(|&id| id != yarn);
        }
    }

    /// Every yarn id that sits on some slot.
    pub fn placed(&self) -> BTreeSet<i64> {
        self.slots.values().flatten().copied().collect()
    }

    /// Yarns from the stash that are not on the shelf.
    pub fn tray<'a>(&self, yarns: &'a [Yarn]) -> Vec<&'a Yarn> {
        let placed = self.placed();
        yarns.iter().filter(|y| !placed.contains(&y.id)).collect()
    }

    /// Drop unknown slot names and add any missing ones.
    fn normalize(mut self) -> Self {
        self.slots.retain(|slot, _| Self::is_slot(slot));
        for slot in SLOT_IDS {
            self.slots.entry(slot.to_string()).or_default();
        }
        self
    }

    /// Load the layout, starting empty when the file is missing or unreadable.
    pub fn load(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => {
                debug!(path = %path.display(), "No shelf layout, starting empty");
                return Self::new();
            }
        };
        match serde_json::from_str::<Self>(&contents) {
            Ok(layout) => layout.normalize(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring corrupt shelf layout");
                Self::new()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write shelf layout to {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yarn(id: i64) -> Yarn {
        serde_json::from_value(serde_json::json!({"id": id, "brand": "Drops"})).unwrap()
    }

    #[test]
    fn test_new_layout_has_every_slot() {
        let layout = ShelfLayout::new();
        assert!(SLOT_IDS.iter().all(|s| layout.slot(s).is_empty()));
        assert_eq!(
            serde_json::to_value(&layout).unwrap()["C3"],
            serde_json::json!([])
        );
    }

    #[test]
    fn test_add_ignores_duplicates_full_and_unknown_slots() {
        let mut layout = ShelfLayout::new();
        assert!(layout.add("A1", 1));
        assert!(!layout.add("A1", 1));
        assert!(!layout.add("D4", 2));

        for id in 2..=6 {
            assert!(layout.add("A1", id));
        }
        assert!(!layout.add("A1", 7));
        assert_eq!(layout.slot("A1"), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_move_leaves_source_first() {
        let mut layout = ShelfLayout::new();
        layout.add("A1", 1);
        assert!(layout.move_yarn("A1", "B2", 1));
        assert!(layout.slot("A1").is_empty());
        assert_eq!(layout.slot("B2"), &[1]);

        // Full destination: the ball drops back to the tray
        for id in 10..16 {
            layout.add("C1", id);
        }
        assert!(!layout.move_yarn("B2", "C1", 1));
        assert!(!layout.placed().contains(&1));
    }

    #[test]
    fn test_clear_ball_and_clear_all() {
        let mut layout = ShelfLayout::new();
        layout.add("A2", 1);
        layout.add("A2", 2);
        layout.add("B1", 2);

        assert!(layout.clear_ball("A2", 1));
        assert!(!layout.clear_ball("A2", 1));
        assert_eq!(layout.slot("A2"), &[2]);

        layout.remove_everywhere(2);
        assert!(layout.placed().is_empty());

        layout.add("C2", 3);
        layout.clear_all("C2");
        assert!(layout.slot("C2").is_empty());
    }

    #[test]
    fn test_tray_lists_unplaced_yarn() {
        let mut layout = ShelfLayout::new();
        layout.add("B3", 2);
        let yarns = vec![yarn(1), yarn(2), yarn(3)];

        let tray: Vec<i64> = layout.tray(&yarns).iter().map(|y| y.id).collect();
        assert_eq!(tray, vec![1, 3]);
    }

    #[test]
    fn test_load_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SHELF_FILE);
        assert_eq!(ShelfLayout::load(&path), ShelfLayout::new());

        let mut layout = ShelfLayout::new();
        layout.add("A3", 42);
        layout.save(&path).unwrap();
        assert_eq!(ShelfLayout::load(&path), layout);

        std::fs::write(&path, r#"{"A1": [5], "Z9": [6]}"#).unwrap();
        let loaded = ShelfLayout::load(&path);
        assert_eq!(loaded.slot("A1"), &[5]);
        assert!(!loaded.placed().contains(&6));
        assert!(loaded.slot("C3").is_empty());

        std::fs::write(&path, "not json").unwrap();
        assert_eq!(ShelfLayout::load(&path), ShelfLayout::new());
    }
}
