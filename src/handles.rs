//! Handle table for native objects.
//!
//! Native matrices cannot cross the scripting boundary, so callers address
//! them by small integer handles. The table owns every object; a handle stays
//! valid until it is explicitly deleted.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::native::Mat;

/// Upper bound of the live handle range. Values at or above it are sentinels.
pub const MAX_HANDLES: usize = 1000;

/// Opaque reference to an object in a [`HandleTable`].
///
/// Always in `0..MAX_HANDLES`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i32")]
pub struct Handle(u16);

impl Handle {
    /// Wrap a raw value, rejecting anything outside the live range.
    #[inline]
    pub fn new(raw: i64) -> Option<Self> {
        if (0..MAX_HANDLES as i64).contains(&raw) {
            Some(Self(raw as u16))
        } else {
            None
        }
    }

    /// Raw value as the scripting side sees it.
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self.0 as i32
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<Handle> for i32 {
    fn from(h: Handle) -> i32 {
        h.as_i32()
    }
}

impl TryFrom<i64> for Handle {
    type Error = String;

    fn try_from(raw: i64) -> std::result::Result<Self, Self::Error> {
        Handle::new(raw).ok_or_else(|| format!("handle {} outside 0..{}", raw, MAX_HANDLES))
    }
}

/// Owns native objects and hands out handles to them.
///
/// Every mutation takes the write lock, and objects sit behind `Arc` so a
/// reader holding an older object is never affected by a later `replace`.
///
/// # Example
///
/// ```
/// use cvbridge::{HandleTable, Mat};
///
/// let table = HandleTable::new();
/// let h = table.create_empty()?;
/// assert_eq!(table.get(h)?.rows(), 0);
/// table.delete(h)?;
/// assert!(table.get(h).is_err());
/// # Ok::<(), cvbridge::Error>(())
/// ```
pub struct HandleTable {
    slots: RwLock<Vec<Option<Arc<Mat>>>>,
    capacity: usize,
}

impl HandleTable {
    /// Table with the full handle range available.
    pub fn new() -> Self {
        Self::with_capacity(MAX_HANDLES)
    }

    /// Table limited to `capacity` live handles (clamped to [`MAX_HANDLES`]).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: RwLock::new(Vec::new()),
            capacity: capacity.min(MAX_HANDLES),
        }
    }

    /// Maximum number of live handles.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Store `mat` under the lowest free handle.
    pub fn create(&self, mat: Mat) -> Result<Handle> {
        let mut slots = self.slots.write();
        let index = match slots.iter().position(Option::is_none) {
            Some(i) => i,
            None if slots.len() < self.capacity => {
                slots.push(None);
                slots.len() - 1
            }
            None => {
                return Err(Error::CapacityExceeded {
                    capacity: self.capacity,
                })
            }
        };
        slots[index] = Some(Arc::new(mat));
        let handle = Handle(index as u16);
        debug!(handle = handle.as_i32(), "created native object");
        Ok(handle)
    }

    /// Store a 0x0 object.
    pub fn create_empty(&self) -> Result<Handle> {
        self.create(Mat::empty())
    }

    /// Shared reference to the object behind `handle`.
    pub fn get(&self, handle: Handle) -> Result<Arc<Mat>> {
        self.slots
            .read()
            .get(handle.index())
            .and_then(|slot| slot.clone())
            .ok_or_else(|| not_found(handle))
    }

    /// Check if `handle` currently names an object.
    pub fn contains(&self, handle: Handle) -> bool {
        matches!(self.slots.read().get(handle.index()), Some(Some(_)))
    }

    /// Swap the object behind an existing handle.
    pub fn replace(&self, handle: Handle, mat: Mat) -> Result<()> {
        let mut slots = self.slots.write();
        match slots.get_mut(handle.index()) {
            Some(slot @ Some(_)) => {
                *slot = Some(Arc::new(mat));
                Ok(())
            }
            _ => Err(not_found(handle)),
        }
    }

    /// Read-modify-write the object behind `handle` under the table lock.
    pub fn update<T>(&self, handle: Handle, f: impl FnOnce(&mut Mat) -> Result<T>) -> Result<T> {
        let mut slots = self.slots.write();
        match slots.get_mut(handle.index()) {
            Some(Some(mat)) => f(Arc::make_mut(mat)),
            _ => Err(not_found(handle)),
        }
    }

    /// Release the object behind `handle`.
    pub fn delete(&self, handle: Handle) -> Result<()> {
        let mut slots = self.slots.write();
        match slots.get_mut(handle.index()) {
            Some(slot @ Some(_)) => {
                *slot = None;
                // Keep the vector short so trailing slots are not scanned forever.
                while matches!(slots.last(), Some(None)) {
                    slots.pop();
                }
                debug!(handle = handle.as_i32(), "deleted native object");
                Ok(())
            }
            _ => Err(not_found(handle)),
        }
    }

    /// Release every object.
    pub fn delete_all(&self) {
        let mut slots = self.slots.write();
        let live = slots.iter().filter(|s| s.is_some()).count();
        slots.clear();
        debug!(released = live, "cleared handle table");
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.slots.read().iter().filter(|s| s.is_some()).count()
    }

    /// Check if no handle is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live handles in ascending order.
    pub fn handles(&self) -> Vec<Handle> {
        self.slots
            .read()
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| Handle(i as u16))
            .collect()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HandleTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleTable")
            .field("live", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

fn not_found(handle: Handle) -> Error {
    Error::NotFound(format!("no native object at handle {}", handle.as_i32()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::cv_type;

    #[test]
    fn test_handle_range() {
        assert!(Handle::new(0).is_some());
        assert!(Handle::new(999).is_some());
        assert!(Handle::new(1000).is_none());
        assert!(Handle::new(-1).is_none());
    }

    #[test]
    fn test_create_reuses_lowest_free_slot() {
        let table = HandleTable::new();
        let a = table.create_empty().unwrap();
        let b = table.create_empty().unwrap();
        let c = table.create_empty().unwrap();
        assert_eq!((a.as_i32(), b.as_i32(), c.as_i32()), (0, 1, 2));

        table.delete(b).unwrap();
        let d = table.create_empty().unwrap();
        assert_eq!(d, b);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_capacity_exceeded() {
        let table = HandleTable::with_capacity(2);
        table.create_empty().unwrap();
        table.create_empty().unwrap();
        let err = table.create_empty().unwrap_err();
        assert!(err.is_capacity_exceeded());
    }

    #[test]
    fn test_capacity_is_clamped() {
        let table = HandleTable::with_capacity(5000);
        assert_eq!(table.capacity(), MAX_HANDLES);
    }

    #[test]
    fn test_replace_and_update() {
        let table = HandleTable::new();
        let h = table.create_empty().unwrap();
        let before = table.get(h).unwrap();

        table
            .replace(h, Mat::filled(2, 2, cv_type::CV_8UC1, 9.0))
            .unwrap();
        assert_eq!(before.rows(), 0, "old reference is untouched");
        assert_eq!(table.get(h).unwrap().rows(), 2);

        table
            .update(h, |m| {
                m.set(0, 0, 0, 1.0);
                Ok(())
            })
            .unwrap();
        assert_eq!(table.get(h).unwrap().at(0, 0, 0), 1.0);
    }

    #[test]
    fn test_missing_handles() {
        let table = HandleTable::new();
        let h = Handle::new(3).unwrap();
        assert!(table.get(h).unwrap_err().is_not_found());
        assert!(table.replace(h, Mat::empty()).unwrap_err().is_not_found());
        assert!(table.delete(h).unwrap_err().is_not_found());
        assert!(!table.contains(h));
    }

    #[test]
    fn test_delete_all() {
        let table = HandleTable::new();
        let hs: Vec<_> = (0..4).map(|_| table.create_empty().unwrap()).collect();
        table.delete_all();
        assert!(table.is_empty());
        for h in hs {
            assert!(table.get(h).unwrap_err().is_not_found());
        }
    }

    #[test]
    fn test_handles_snapshot() {
        let table = HandleTable::new();
        let a = table.create_empty().unwrap();
        let b = table.create_empty().unwrap();
        let c = table.create_empty().unwrap();
        table.delete(b).unwrap();
        assert_eq!(table.handles(), vec![a, c]);
    }

    #[test]
    fn test_handle_serde() {
        let h: Handle = serde_json::from_str("12").unwrap();
        assert_eq!(h.as_i32(), 12);
        assert_eq!(serde_json::to_string(&h).unwrap(), "12");
        assert!(serde_json::from_str::<Handle>("1000").is_err());
    }
}
