// handles.rs — slot storage addressed by stable integer handles

use arclight_common::scene::QHandle;

/// Handle-indexed slot arena. Handles are 1-based so that 0 stays free for
/// "no handle". Freed slots go on a free list and are reused LIFO, so a
/// caller holding a stale handle can observe the replacement data, never a
/// dangling reference.
#[derive(Debug, Clone)]
pub struct HandleSlots<T> {
    slots: Vec<Option<T>>,
    free_list: Vec<i32>,
}

// manual impl, the slot type itself needs no Default
impl<T> Default for HandleSlots<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleSlots<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
        }
    }

    fn index(handle: QHandle) -> Option<usize> {
        if handle <= 0 {
            None
        } else {
            Some((handle - 1) as usize)
        }
    }

    pub fn alloc(&mut self, value: T) -> QHandle {
        if let Some(index) = self.free_list.pop() {
            self.slots[index as usize] = Some(value);
            return index + 1;
        }
        self.slots.push(Some(value));
        self.slots.len() as QHandle
    }

    /// Frees the slot and returns its value. Freeing an unknown or already
    /// freed handle returns None.
    pub fn free(&mut self, handle: QHandle) -> Option<T> {
        let index = Self::index(handle)?;
        let value = self.slots.get_mut(index)?.take()?;
        self.free_list.push(index as i32);
        Some(value)
    }

    pub fn get(&self, handle: QHandle) -> Option<&T> {
        let index = Self::index(handle)?;
        self.slots.get(index)?.as_ref()
    }

    pub fn get_mut(&mut self, handle: QHandle) -> Option<&mut T> {
        let index = Self::index(handle)?;
        self.slots.get_mut(index)?.as_mut()
    }

    /// Places a value at an exact handle, growing storage as needed. Used by
    /// demo playback, which dictates handle values instead of allocating.
    pub fn set_at(&mut self, handle: QHandle, value: T) -> bool {
        let index = match Self::index(handle) {
            Some(i) => i,
            None => return false,
        };
        while self.slots.len() <= index {
            self.slots.push(None);
        }
        if self.slots[index].is_none() {
            self.free_list.retain(|&f| f as usize != index);
        }
        self.slots[index] = Some(value);
        true
    }

    pub fn contains(&self, handle: QHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Live entries in ascending handle order.
    pub fn iter(&self) -> impl Iterator<Item = (QHandle, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (i as QHandle + 1, v)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (QHandle, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_mut().map(|v| (i as QHandle + 1, v)))
    }

    pub fn handles(&self) -> Vec<QHandle> {
        self.iter().map(|(h, _)| h).collect()
    }

    pub fn active_count(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free_list.clear();
    }
}
