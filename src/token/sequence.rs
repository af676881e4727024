//! The intrusive ordered token sequence, implemented as an arena of slots
//! addressed by a stable index handle: allocate tokens in a single growable
//! arena, use stable indices as handles, and let prev/next fields become
//! index pairs instead of pointers.
//!
//! Removed slots are tombstoned (`None`) rather than reused, so a
//! [`TokenId`] handed out once never silently refers to a different token
//! later.

use super::Token;

/// A stable handle into a [`TokenSequence`]'s arena.
pub type TokenId = usize;

#[derive(Debug)]
struct Slot {
    token: Token,
    prev: Option<TokenId>,
    next: Option<TokenId>,
}

/// The single mutable token stream the whole pipeline operates over.
#[derive(Default, Debug)]
pub struct TokenSequence {
    slots: Vec<Option<Slot>>,
    head: Option<TokenId>,
    tail: Option<TokenId>,
    len: usize,
}

impl TokenSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn head(&self) -> Option<TokenId> {
        self.head
    }

    pub fn tail(&self) -> Option<TokenId> {
        self.tail
    }

    pub fn get(&self, id: TokenId) -> &Token {
        &self.slots[id].as_ref().expect("dangling TokenId").token
    }

    pub fn get_mut(&mut self, id: TokenId) -> &mut Token {
        &mut self.slots[id].as_mut().expect("dangling TokenId").token
    }

    pub fn next_of(&self, id: TokenId) -> Option<TokenId> {
        self.slots[id].as_ref().expect("dangling TokenId").next
    }

    pub fn prev_of(&self, id: TokenId) -> Option<TokenId> {
        self.slots[id].as_ref().expect("dangling TokenId").prev
    }

    fn alloc(&mut self, token: Token) -> TokenId {
        let id = self.slots.len();
        self.slots.push(Some(Slot {
            token,
            prev: None,
            next: None,
        }));
        id
    }

    /// O(1) append at the tail.
    pub fn append(&mut self, token: impl Into<Token>) -> TokenId {
        let id = self.alloc(token.into());
        match self.tail {
            Some(tail) => {
                self.slots[tail].as_mut().unwrap().next = Some(id);
                self.slots[id].as_mut().unwrap().prev = Some(tail);
                self.tail = Some(id);
            }
            None => {
                self.head = Some(id);
                self.tail = Some(id);
            }
        }
        self.len += 1;
        id
    }

    /// O(1) prepend at the head.
    pub fn prepend(&mut self, token: impl Into<Token>) -> TokenId {
        let id = self.alloc(token.into());
        match self.head {
            Some(head) => {
                self.slots[head].as_mut().unwrap().prev = Some(id);
                self.slots[id].as_mut().unwrap().next = Some(head);
                self.head = Some(id);
            }
            None => {
                self.head = Some(id);
                self.tail = Some(id);
            }
        }
        self.len += 1;
        id
    }

    /// O(1) insertion immediately after `anchor`.
    pub fn insert_after(&mut self, anchor: TokenId, token: impl Into<Token>) -> TokenId {
        let id = self.alloc(token.into());
        let old_next = self.slots[anchor].as_ref().unwrap().next;
        self.slots[anchor].as_mut().unwrap().next = Some(id);
        {
            let slot = self.slots[id].as_mut().unwrap();
            slot.prev = Some(anchor);
            slot.next = old_next;
        }
        match old_next {
            Some(next) => self.slots[next].as_mut().unwrap().prev = Some(id),
            None => self.tail = Some(id),
        }
        self.len += 1;
        id
    }

    /// O(1) insertion immediately before `anchor`.
    pub fn insert_before(&mut self, anchor: TokenId, token: impl Into<Token>) -> TokenId {
        let id = self.alloc(token.into());
        let old_prev = self.slots[anchor].as_ref().unwrap().prev;
        self.slots[anchor].as_mut().unwrap().prev = Some(id);
        {
            let slot = self.slots[id].as_mut().unwrap();
            slot.next = Some(anchor);
            slot.prev = old_prev;
        }
        match old_prev {
            Some(prev) => self.slots[prev].as_mut().unwrap().next = Some(id),
            None => self.head = Some(id),
        }
        self.len += 1;
        id
    }

    /// Insert a run of tokens after `anchor`, in order. Returns the ids in
    /// the order inserted.
    pub fn insert_many_after(
        &mut self,
        mut anchor: TokenId,
        tokens: impl IntoIterator<Item = Token>,
    ) -> Vec<TokenId> {
        let mut ids = Vec::new();
        for token in tokens {
            let id = self.insert_after(anchor, token);
            ids.push(id);
            anchor = id;
        }
        ids
    }

    /// O(1) removal given a handle. The slot is tombstoned; `id` must not be
    /// used afterwards.
    pub fn remove(&mut self, id: TokenId) -> Token {
        let slot = self.slots[id].take().expect("dangling TokenId");
        match slot.prev {
            Some(prev) => self.slots[prev].as_mut().unwrap().next = slot.next,
            None => self.head = slot.next,
        }
        match slot.next {
            Some(next) => self.slots[next].as_mut().unwrap().prev = slot.prev,
            None => self.tail = slot.prev,
        }
        self.len -= 1;
        slot.token
    }

    /// Moves every element of `other` into `self`, splicing the whole run in
    /// immediately after `anchor`. `other` is left empty.
    pub fn splice_after(&mut self, anchor: TokenId, other: TokenSequence) {
        let Some(other_head) = other.head else {
            return;
        };
        let other_tail = other.tail.unwrap();
        let offset = self.slots.len();
        for slot in other.slots {
            match slot {
                Some(s) => self.slots.push(Some(Slot {
                    token: s.token,
                    prev: s.prev.map(|p| p + offset),
                    next: s.next.map(|n| n + offset),
                })),
                None => self.slots.push(None),
            }
        }
        self.len += other.len;
        let new_head = other_head + offset;
        let new_tail = other_tail + offset;

        let old_next = self.slots[anchor].as_ref().unwrap().next;
        self.slots[anchor].as_mut().unwrap().next = Some(new_head);
        self.slots[new_head].as_mut().unwrap().prev = Some(anchor);
        self.slots[new_tail].as_mut().unwrap().next = old_next;
        match old_next {
            Some(next) => self.slots[next].as_mut().unwrap().prev = Some(new_tail),
            None => self.tail = Some(new_tail),
        }
    }

    /// Forward iteration over live token ids, head to tail.
    pub fn iter_ids(&self) -> impl Iterator<Item = TokenId> + '_ {
        ForwardIds {
            seq: self,
            cur: self.head,
        }
    }

    /// Reverse iteration over live token ids, tail to head.
    pub fn iter_ids_rev(&self) -> impl Iterator<Item = TokenId> + '_ {
        ReverseIds {
            seq: self,
            cur: self.tail,
        }
    }
}

struct ForwardIds<'a> {
    seq: &'a TokenSequence,
    cur: Option<TokenId>,
}

impl<'a> Iterator for ForwardIds<'a> {
    type Item = TokenId;
    fn next(&mut self) -> Option<TokenId> {
        let id = self.cur?;
        self.cur = self.seq.next_of(id);
        Some(id)
    }
}

struct ReverseIds<'a> {
    seq: &'a TokenSequence,
    cur: Option<TokenId>,
}

impl<'a> Iterator for ReverseIds<'a> {
    type Item = TokenId;
    fn next(&mut self) -> Option<TokenId> {
        let id = self.cur?;
        self.cur = self.seq.prev_of(id);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Comment;

    fn c(text: &str) -> Comment {
        Comment {
            text: text.to_string(),
        }
    }

    #[test]
    fn append_and_iterate_in_order() {
        let mut seq = TokenSequence::new();
        seq.append(c("a"));
        seq.append(c("b"));
        seq.append(c("c"));
        let texts: Vec<_> = seq
            .iter_ids()
            .map(|id| match &seq.get(id).kind {
                crate::token::TokenKind::Comment(c) => c.text.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert_eq!(seq.len(), 3);
    }

    #[test]
    fn reverse_iteration_mirrors_forward() {
        let mut seq = TokenSequence::new();
        seq.append(c("a"));
        seq.append(c("b"));
        seq.append(c("c"));
        let forward: Vec<_> = seq.iter_ids().collect();
        let mut reverse: Vec<_> = seq.iter_ids_rev().collect();
        reverse.reverse();
        assert_eq!(forward, reverse);
    }

    #[test]
    fn insert_after_splices_in_between() {
        let mut seq = TokenSequence::new();
        let a = seq.append(c("a"));
        seq.append(c("c"));
        seq.insert_after(a, c("b"));
        let texts: Vec<_> = seq
            .iter_ids()
            .map(|id| match &seq.get(id).kind {
                crate::token::TokenKind::Comment(c) => c.text.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn insert_before_head_updates_head() {
        let mut seq = TokenSequence::new();
        let a = seq.append(c("a"));
        seq.insert_before(a, c("z"));
        assert_eq!(seq.head(), Some(0).map(|_| seq.head().unwrap()));
        match &seq.get(seq.head().unwrap()).kind {
            crate::token::TokenKind::Comment(c) => assert_eq!(c.text, "z"),
            _ => unreachable!(),
        }
    }

    #[test]
    fn remove_unlinks_and_preserves_order() {
        let mut seq = TokenSequence::new();
        seq.append(c("a"));
        let b = seq.append(c("b"));
        seq.append(c("c"));
        seq.remove(b);
        let texts: Vec<_> = seq
            .iter_ids()
            .map(|id| match &seq.get(id).kind {
                crate::token::TokenKind::Comment(c) => c.text.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(texts, vec!["a", "c"]);
        assert_eq!(seq.len(), 2);
    }

    #[test]
    fn remove_head_and_tail_updates_both() {
        let mut seq = TokenSequence::new();
        let a = seq.append(c("a"));
        let b = seq.append(c("b"));
        seq.remove(a);
        assert_eq!(seq.head(), Some(b));
        seq.remove(b);
        assert_eq!(seq.head(), None);
        assert_eq!(seq.tail(), None);
        assert!(seq.is_empty());
    }

    #[test]
    fn splice_after_moves_every_element_of_other() {
        let mut main = TokenSequence::new();
        let a = main.append(c("a"));
        main.append(c("d"));

        let mut other = TokenSequence::new();
        other.append(c("b"));
        other.append(c("c"));

        main.splice_after(a, other);

        let texts: Vec<_> = main
            .iter_ids()
            .map(|id| match &main.get(id).kind {
                crate::token::TokenKind::Comment(c) => c.text.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(texts, vec!["a", "b", "c", "d"]);
        assert_eq!(main.len(), 4);
    }

    #[test]
    fn insert_many_after_preserves_order() {
        let mut seq = TokenSequence::new();
        let a = seq.append(c("a"));
        seq.append(c("e"));
        seq.insert_many_after(a, vec![c("b").into(), c("c").into(), c("d").into()]);
        let texts: Vec<_> = seq
            .iter_ids()
            .map(|id| match &seq.get(id).kind {
                crate::token::TokenKind::Comment(c) => c.text.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(texts, vec!["a", "b", "c", "d", "e"]);
    }
}
