//! Index arena with doubly linked lists threaded through it.
//!
//! Values live in a slab of slots and are addressed by [`ListId`]. Each
//! slot carries `prev` and `next` links, so a value can be unlinked from
//! the middle of its list in O(1), given its id. The list head itself is
//! owned by whoever owns the list (a network owns the head of its route
//! list, a table the head of its hook list), while one arena may hold any
//! number of lists.

//------------ ListId --------------------------------------------------------

/// The index of a slot in a [`ListArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListId(u32);

impl ListId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ListId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//------------ ListHead ------------------------------------------------------

/// The head of one list inside a [`ListArena`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListHead {
    first: Option<ListId>,
    len: usize,
}

impl ListHead {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn first(&self) -> Option<ListId> {
        self.first
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_none()
    }
}

//------------ ListArena -----------------------------------------------------

#[derive(Debug)]
enum Slot<T> {
    Occupied {
        value: T,
        prev: Option<ListId>,
        next: Option<ListId>,
    },
    Vacant,
}

#[derive(Debug)]
pub struct ListArena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<ListId>,
    live: usize,
}

impl<T> Default for ListArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ListArena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// The number of values in the arena, over all lists.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn contains(&self, id: ListId) -> bool {
        matches!(self.slots.get(id.index()), Some(Slot::Occupied { .. }))
    }

    pub fn get(&self, id: ListId) -> Option<&T> {
        match self.slots.get(id.index()) {
            Some(Slot::Occupied { value, .. }) => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: ListId) -> Option<&mut T> {
        match self.slots.get_mut(id.index()) {
            Some(Slot::Occupied { value, .. }) => Some(value),
            _ => None,
        }
    }

    /// The successor of `id` in its list.
    pub fn next(&self, id: ListId) -> Option<ListId> {
        match self.slots.get(id.index()) {
            Some(Slot::Occupied { next, .. }) => *next,
            _ => None,
        }
    }

    fn alloc(&mut self, value: T) -> ListId {
        self.live += 1;
        let slot = Slot::Occupied {
            value,
            prev: None,
            next: None,
        };
        if let Some(id) = self.free.pop() {
            if let Some(s) = self.slots.get_mut(id.index()) {
                *s = slot;
                return id;
            }
        }
        self.slots.push(slot);
        ListId((self.slots.len() - 1) as u32)
    }

    fn set_prev(&mut self, id: ListId, to: Option<ListId>) {
        if let Some(Slot::Occupied { prev, .. }) =
            self.slots.get_mut(id.index())
        {
            *prev = to;
        }
    }

    fn set_next(&mut self, id: ListId, to: Option<ListId>) {
        if let Some(Slot::Occupied { next, .. }) =
            self.slots.get_mut(id.index())
        {
            *next = to;
        }
    }

    fn links(&self, id: ListId) -> (Option<ListId>, Option<ListId>) {
        match self.slots.get(id.index()) {
            Some(Slot::Occupied { prev, next, .. }) => (*prev, *next),
            _ => vacant_slot(id),
        }
    }

    /// Store `value` and link it in as the first element of `head`.
    pub fn push_front(&mut self, head: &mut ListHead, value: T) -> ListId {
        let id = self.alloc(value);
        self.link_front(head, id);
        id
    }

    /// Store `value` and link it in right after `after`, which must be a
    /// member of `head`.
    pub fn insert_after(
        &mut self,
        head: &mut ListHead,
        after: ListId,
        value: T,
    ) -> ListId {
        let id = self.alloc(value);
        let (_, next) = self.links(after);
        self.set_prev(id, Some(after));
        self.set_next(id, next);
        if let Some(next) = next {
            self.set_prev(next, Some(id));
        }
        self.set_next(after, Some(id));
        head.len += 1;
        id
    }

    /// Store `value` and link it in as the last element of `head`. This
    /// walks the list.
    pub fn push_back(&mut self, head: &mut ListHead, value: T) -> ListId {
        match self.ids(head).last() {
            Some(last) => self.insert_after(head, *last, value),
            None => self.push_front(head, value),
        }
    }

    fn link_front(&mut self, head: &mut ListHead, id: ListId) {
        self.set_prev(id, None);
        self.set_next(id, head.first);
        if let Some(first) = head.first {
            self.set_prev(first, Some(id));
        }
        head.first = Some(id);
        head.len += 1;
    }

    fn detach(&mut self, head: &mut ListHead, id: ListId) {
        let (prev, next) = self.links(id);
        match prev {
            Some(prev) => self.set_next(prev, next),
            None => {
                assert!(
                    head.first == Some(id),
                    "list: element {} is not a member of this list",
                    id
                );
                head.first = next;
            }
        }
        if let Some(next) = next {
            self.set_prev(next, prev);
        }
        self.set_prev(id, None);
        self.set_next(id, None);
        head.len -= 1;
    }

    /// Unlink `id` from `head` and free its slot, returning the value.
    pub fn unlink(&mut self, head: &mut ListHead, id: ListId) -> T {
        self.detach(head, id);
        self.live -= 1;
        self.free.push(id);
        match self.slots.get_mut(id.index()).map(|s| {
            std::mem::replace(s, Slot::Vacant)
        }) {
            Some(Slot::Occupied { value, .. }) => value,
            _ => vacant_slot(id),
        }
    }

    /// Move a member of `head` to the front of the list.
    pub fn move_to_front(&mut self, head: &mut ListHead, id: ListId) {
        if head.first == Some(id) {
            return;
        }
        self.detach(head, id);
        self.link_front(head, id);
    }

    pub fn iter<'a>(&'a self, head: &ListHead) -> ListIter<'a, T> {
        ListIter {
            arena: self,
            cursor: head.first,
        }
    }

    /// The ids of all members of `head`, in list order.
    pub fn ids(&self, head: &ListHead) -> Vec<ListId> {
        self.iter(head).map(|(id, _)| id).collect()
    }
}

#[allow(clippy::panic)]
fn vacant_slot(id: ListId) -> ! {
    panic!("list: access to vacant slot {}", id)
}

//------------ ListIter ------------------------------------------------------

pub struct ListIter<'a, T> {
    arena: &'a ListArena<T>,
    cursor: Option<ListId>,
}

impl<'a, T> Iterator for ListIter<'a, T> {
    type Item = (ListId, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        match self.arena.slots.get(id.index()) {
            Some(Slot::Occupied { value, next, .. }) => {
                self.cursor = *next;
                Some((id, value))
            }
            _ => None,
        }
    }
}

//------------ Tests ---------------------------------------------------------
