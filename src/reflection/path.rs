//! Property path tokenizer.

/// Splits `a[1].b.c` into the head segment (`a`, index `1`) and the
/// remaining child path (`b.c`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyTokenizer<'a> {
    name: &'a str,
    indexed_name: &'a str,
    index: Option<&'a str>,
    children: Option<&'a str>,
}

impl<'a> PropertyTokenizer<'a> {
    pub fn new(full_name: &'a str) -> Self {
        let (head, children) = match full_name.find('.') {
            Some(delim) => (&full_name[..delim], Some(&full_name[delim + 1..])),
            None => (full_name, None),
        };
        let (name, index) = match head.find('[') {
            Some(open) => {
                let inner = &head[open + 1..];
                let inner = inner.strip_suffix(']').unwrap_or(inner);
                (&head[..open], Some(inner))
            }
            None => (head, None),
        };
        Self {
            name,
            indexed_name: head,
            index,
            children: children.filter(|c| !c.is_empty()),
        }
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    /// Head segment including any `[index]` suffix.
    pub fn indexed_name(&self) -> &'a str {
        self.indexed_name
    }

    pub fn index(&self) -> Option<&'a str> {
        self.index
    }

    pub fn children(&self) -> Option<&'a str> {
        self.children
    }

    /// Parse the index as a list position.
    pub fn position(&self) -> Option<usize> {
        self.index.and_then(|i| i.trim().parse().ok())
    }
}
