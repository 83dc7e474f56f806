use super::entry::{ Entries, Entry, EntryId };

/// One node of the octree. Holds the head of the list of entries classified
/// into exactly this node (not its descendants).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cell {
    head: Option<EntryId>,
}

impl Cell {
    #[inline(always)]
    pub fn head(&self) -> Option<EntryId> {
        self.head
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Links `id` in as the new head of the cell at `slot`, first detaching
    /// it from whichever other cell holds it.
    ///
    /// Returns false, and changes nothing, if the entry already belongs to
    /// `slot`, if the entry does not exist, or if `slot` is not materialized.
    pub fn push<T>(cells: &mut [Option<Cell>], slot: usize, id: EntryId, entries: &mut Entries<T>) -> bool {
        match entries.get(id) {
            None => return false,
            Some(entry) if entry.cell == Some(slot) => return false,
            Some(_) => (),
        }
        if !matches!(cells.get(slot), Some(Some(_))) {
            return false;
        }

        entries.detach(id, cells);

        let Some(cell) = cells.get_mut(slot).and_then(Option::as_mut) else { return false };
        let old_head = cell.head;
        cell.head = Some(id);
        if let Some(head) = old_head.and_then(|head| entries.get_mut(head)) {
            head.prev = Some(id);
        }
        if let Some(entry) = entries.get_mut(id) {
            entry.prev = None;
            entry.next = old_head;
            entry.cell = Some(slot);
        }
        true
    }

    /// Called by a leaving entry. Advances the head past `id` if it was the
    /// head; returns false otherwise.
    pub fn on_detach<T>(&mut self, id: EntryId, entries: &Entries<T>) -> bool {
        if self.head != Some(id) {
            return false;
        }
        self.head = entries.get(id).and_then(Entry::next);
        true
    }

    /// Iterates the objects of this cell, newest first.
    pub fn iter<'a, T>(&self, entries: &'a Entries<T>) -> CellIter<'a, T> {
        CellIter {
            entries,
            current: self.head,
        }
    }
}

#[derive(Debug)]
pub struct CellIter<'a, T> {
    entries: &'a Entries<T>,
    current: Option<EntryId>,
}

impl<'a, T> Iterator for CellIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entries.get(self.current?)?;
        self.current = entry.next;
        Some(&entry.object)
    }
}

#[test]
fn push_links_new_head() {
    let mut cells = vec![Some(Cell::default()); 4];
    let mut entries = Entries::new();
    let a = entries.insert('a');
    let b = entries.insert('b');

    assert!(Cell::push(&mut cells, 3, a, &mut entries));
    assert!(Cell::push(&mut cells, 3, b, &mut entries));
    assert!(!Cell::push(&mut cells, 3, b, &mut entries));

    let cell = cells[3].unwrap();
    assert_eq!(cell.head(), Some(b));
    assert_eq!(entries.get(b).unwrap().next(), Some(a));
    assert_eq!(entries.get(a).unwrap().prev(), Some(b));
    assert_eq!(entries.get(a).unwrap().cell(), Some(3));
    assert_eq!(cell.iter(&entries).copied().collect::<String>(), "ba");
}

#[test]
fn push_moves_entry_between_cells() {
    use super::entry::check_list;

    let mut cells = vec![Some(Cell::default()); 2];
    let mut entries = Entries::new();
    let a = entries.insert('a');
    let b = entries.insert('b');
    let c = entries.insert('c');
    for id in [a, b, c] {
        assert!(Cell::push(&mut cells, 0, id, &mut entries));
    }

    // `b` sits in the middle of cell 0's list.
    assert!(Cell::push(&mut cells, 1, b, &mut entries));
    check_list(&cells, &entries);
    assert_eq!(cells[0].unwrap().iter(&entries).copied().collect::<String>(), "ca");
    assert_eq!(cells[1].unwrap().iter(&entries).copied().collect::<String>(), "b");

    // Head of cell 0 moves too.
    assert!(Cell::push(&mut cells, 1, c, &mut entries));
    check_list(&cells, &entries);
    assert_eq!(cells[0].unwrap().iter(&entries).copied().collect::<String>(), "a");
    assert_eq!(cells[1].unwrap().iter(&entries).copied().collect::<String>(), "cb");
}

#[test]
fn push_into_missing_cell_is_rejected() {
    let mut cells = vec![Some(Cell::default()), None];
    let mut entries = Entries::new();
    let a = entries.insert(0);
    assert!(Cell::push(&mut cells, 0, a, &mut entries));

    assert!(!Cell::push(&mut cells, 1, a, &mut entries));
    assert!(!Cell::push(&mut cells, 7, a, &mut entries));
    assert_eq!(entries.get(a).unwrap().cell(), Some(0));
}

#[test]
fn on_detach_only_moves_head() {
    let mut cells = vec![Some(Cell::default())];
    let mut entries = Entries::new();
    let a = entries.insert(0);
    let b = entries.insert(1);
    Cell::push(&mut cells, 0, a, &mut entries);
    Cell::push(&mut cells, 0, b, &mut entries);

    let mut cell = cells[0].unwrap();
    assert!(!cell.on_detach(a, &entries));
    assert_eq!(cell.head(), Some(b));
    assert!(cell.on_detach(b, &entries));
    assert_eq!(cell.head(), Some(a));
}
