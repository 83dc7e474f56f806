use super::cell::Cell;

/// Stable handle to an [`Entry`] in an [`Entries`] slab.
///
/// Handles are reused after [`Entries::discard`], so a handle must not be
/// kept past the destruction of the object it tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(pub(crate) usize);

impl EntryId {
    #[inline(always)]
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Intrusive list node wrapping one tracked object.
#[derive(Debug, Clone)]
pub struct Entry<T> {
    pub object: T,
    pub(crate) prev: Option<EntryId>,
    pub(crate) next: Option<EntryId>,
    /// Slot of the owning cell.
    pub(crate) cell: Option<usize>,
}

impl<T> Entry<T> {
    pub fn new(object: T) -> Self {
        Self {
            object,
            prev: None,
            next: None,
            cell: None,
        }
    }

    #[inline(always)]
    pub fn cell(&self) -> Option<usize> {
        self.cell
    }

    #[inline(always)]
    pub fn prev(&self) -> Option<EntryId> {
        self.prev
    }

    #[inline(always)]
    pub fn next(&self) -> Option<EntryId> {
        self.next
    }

    pub fn is_linked(&self) -> bool {
        self.cell.is_some()
    }
}

/// Slab of entries. Vacant slots are recycled through a free list.
#[derive(Debug)]
pub struct Entries<T> {
    slots: Vec<Option<Entry<T>>>,
    free: Vec<usize>,
}

impl<T> Default for Entries<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Entries<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn insert(&mut self, object: T) -> EntryId {
        let entry = Some(Entry::new(object));
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = entry;
                EntryId(index)
            }
            None => {
                self.slots.push(entry);
                EntryId(self.slots.len() - 1)
            }
        }
    }

    #[inline]
    pub fn get(&self, id: EntryId) -> Option<&Entry<T>> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: EntryId) -> Option<&mut Entry<T>> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntryId, &Entry<T>)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|entry| (EntryId(index), entry)))
    }

    /// Unlinks `id` from its owning cell.
    ///
    /// Returns false if the entry is unknown or not owned by any cell, so a
    /// second call is a harmless no-op.
    pub fn detach(&mut self, id: EntryId, cells: &mut [Option<Cell>]) -> bool {
        let Some(entry) = self.get(id) else { return false };
        let Some(owner) = entry.cell else { return false };
        let (prev, next) = (entry.prev, entry.next);

        // Only the head needs the cell's help; a false return just means the
        // entry sat further down the list.
        if let Some(cell) = cells.get_mut(owner).and_then(Option::as_mut) {
            cell.on_detach(id, self);
        }

        if let Some(prev) = prev.and_then(|prev| self.get_mut(prev)) {
            prev.next = next;
        }
        if let Some(next) = next.and_then(|next| self.get_mut(next)) {
            next.prev = prev;
        }

        if let Some(entry) = self.get_mut(id) {
            entry.prev = None;
            entry.next = None;
            entry.cell = None;
        }
        true
    }

    /// Detaches and frees the entry, handing the wrapped object back.
    pub fn discard(&mut self, id: EntryId, cells: &mut [Option<Cell>]) -> Option<T> {
        self.detach(id, cells);
        let entry = self.slots.get_mut(id.0)?.take()?;
        self.free.push(id.0);
        Some(entry.object)
    }
}

#[cfg(test)]
pub(crate) fn check_list<T>(cells: &[Option<Cell>], entries: &Entries<T>) {
    use ahash::AHashSet;

    let mut seen = AHashSet::new();
    for (slot, cell) in cells.iter().enumerate() {
        let Some(cell) = cell else { continue };
        let mut prev = None;
        let mut current = cell.head();
        while let Some(id) = current {
            let entry = entries.get(id).expect("list links to a dead entry");
            assert!(seen.insert(id), "{id:?} appears twice");
            assert_eq!(entry.cell, Some(slot), "{id:?} owner mismatch");
            assert_eq!(entry.prev, prev, "{id:?} prev link mismatch");
            prev = current;
            current = entry.next;
        }
    }
    for (id, entry) in entries.iter() {
        assert_eq!(entry.cell.is_some(), seen.contains(&id), "{id:?} owner without list membership");
    }
}

#[test]
fn insert_reuses_discarded_slots() {
    let mut cells: Vec<Option<Cell>> = vec![None; 1];
    let mut entries = Entries::new();
    let a = entries.insert("a");
    let b = entries.insert("b");
    assert_eq!(entries.len(), 2);

    assert_eq!(entries.discard(a, &mut cells), Some("a"));
    assert!(!entries.contains(a));
    assert_eq!(entries.len(), 1);

    let c = entries.insert("c");
    assert_eq!(c, a);
    assert_eq!(entries.get(c).map(|e| e.object), Some("c"));
    assert_eq!(entries.get(b).map(|e| e.object), Some("b"));
}

#[test]
fn detach_unlinked_is_noop() {
    let mut cells: Vec<Option<Cell>> = vec![Some(Cell::default())];
    let mut entries = Entries::new();
    let a = entries.insert(1);
    assert!(!entries.detach(a, &mut cells));
    assert!(!entries.detach(EntryId(42), &mut cells));
}

#[test]
fn detach_relinks_neighbours() {
    let mut cells: Vec<Option<Cell>> = vec![Some(Cell::default())];
    let mut entries = Entries::new();
    let ids: Vec<_> = (0..4).map(|i| entries.insert(i)).collect();
    for &id in &ids {
        assert!(Cell::push(&mut cells, 0, id, &mut entries));
    }
    // List is now 3 -> 2 -> 1 -> 0.
    assert_eq!(cells[0].as_ref().unwrap().head(), Some(ids[3]));

    // Middle, tail, then head.
    assert!(entries.detach(ids[2], &mut cells));
    check_list(&cells, &entries);
    assert!(entries.detach(ids[0], &mut cells));
    check_list(&cells, &entries);
    assert!(entries.detach(ids[3], &mut cells));
    check_list(&cells, &entries);

    let cell = cells[0].as_ref().unwrap();
    assert_eq!(cell.iter(&entries).copied().collect::<Vec<_>>(), vec![1]);
    assert!(!entries.detach(ids[3], &mut cells));
}
