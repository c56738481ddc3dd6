//! Operational transform algebra: pure, stateless functions over normalized
//! operations. Nothing in this module touches the document log, a hub, or a
//! transport; it only knows how to reconcile two concurrent edits and how to
//! apply/compose/invert a single edit against a code-point sequence.

use serde::{Deserialize, Serialize};

/// One atomic edit intent, tagged by kind.
///
/// `position` and `length` are code-point offsets (see the text-offset
/// convention in the wire protocol docs), never byte offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationKind {
    Insert { content: String },
    Delete {
        length: usize,
        #[serde(default)]
        content: String,
    },
    Retain,
}

/// A normalized operation: `kind` plus the position it applies at and the
/// version it was computed against.
///
/// `kind` is flattened so the wire shape is a single flat object
/// (`{type, position, content, length, client_version}`), not a nested
/// `{kind: {...}, position, ...}`. `base_version` is carried on the wire as
/// `client_version`; absence means "the client believes it is caught up to
/// whatever the server's current version is" (resolved by the hub, not by a
/// hardcoded default here — see `DocumentHub::handle_submit`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(flatten)]
    pub kind: OperationKind,
    pub position: usize,
    #[serde(default, rename = "client_version")]
    pub base_version: Option<u64>,
}

impl Operation {
    pub fn insert(position: usize, content: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Insert {
                content: content.into(),
            },
            position,
            base_version: None,
        }
    }

    pub fn delete(position: usize, length: usize) -> Self {
        Self {
            kind: OperationKind::Delete {
                length,
                content: String::new(),
            },
            position,
            base_version: None,
        }
    }

    pub fn delete_with_content(position: usize, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            kind: OperationKind::Delete {
                length: content.chars().count(),
                content,
            },
            position,
            base_version: None,
        }
    }

    pub fn retain() -> Self {
        Self {
            kind: OperationKind::Retain,
            position: 0,
            base_version: None,
        }
    }

    pub fn with_base_version(mut self, base_version: u64) -> Self {
        self.base_version = Some(base_version);
        self
    }

    /// The client's declared base version, or `current_version` if the
    /// client omitted `client_version` (it is assumed caught up).
    pub fn base_version_or(&self, current_version: u64) -> u64 {
        self.base_version.unwrap_or(current_version)
    }

    pub fn is_noop(&self) -> bool {
        match &self.kind {
            OperationKind::Insert { content } => content.is_empty(),
            OperationKind::Delete { length, .. } => *length == 0,
            OperationKind::Retain => true,
        }
    }

    fn insert_len(&self) -> Option<usize> {
        match &self.kind {
            OperationKind::Insert { content } => Some(content.chars().count()),
            _ => None,
        }
    }

    fn delete_end(&self) -> Option<usize> {
        match &self.kind {
            OperationKind::Delete { length, .. } => Some(self.position + *length),
            _ => None,
        }
    }
}

/// Reconciles two concurrent operations `a` and `b`, both computed against
/// the same base content, returning `(a', b')` such that applying `a` then
/// `b'` yields the same text as applying `b` then `a'`.
pub fn transform(a: &Operation, b: &Operation) -> (Operation, Operation) {
    use OperationKind::*;

    match (&a.kind, &b.kind) {
        (Insert { content: ac }, Insert { content: bc }) => {
            let a_len = ac.chars().count();
            let b_len = bc.chars().count();
            if a.position <= b.position {
                let mut b2 = b.clone();
                b2.position += a_len;
                (a.clone(), b2)
            } else {
                let mut a2 = a.clone();
                a2.position += b_len;
                (a2, b.clone())
            }
        }
        (Delete { length: a_len, .. }, Delete { length: b_len, .. }) => {
            let a_end = a.position + a_len;
            let b_end = b.position + b_len;
            if a_end <= b.position {
                let mut b2 = b.clone();
                b2.position = b2.position.saturating_sub(*a_len);
                (a.clone(), b2)
            } else if b_end <= a.position {
                let mut a2 = a.clone();
                a2.position = a2.position.saturating_sub(*b_len);
                (a2, b.clone())
            } else {
                let overlap =
                    (a_end.min(b_end)).saturating_sub(a.position.max(b.position));
                if a.position < b.position {
                    let mut a2 = a.clone();
                    a2.kind = Delete {
                        length: b.position - a.position,
                        content: String::new(),
                    };
                    let mut b2 = b.clone();
                    b2.position = a.position;
                    b2.kind = Delete {
                        length: b_len.saturating_sub(overlap),
                        content: String::new(),
                    };
                    (a2, b2)
                } else {
                    let mut b2 = b.clone();
                    b2.kind = Delete {
                        length: a.position - b.position,
                        content: String::new(),
                    };
                    let mut a2 = a.clone();
                    a2.position = b.position;
                    a2.kind = Delete {
                        length: a_len.saturating_sub(overlap),
                        content: String::new(),
                    };
                    (a2, b2)
                }
            }
        }
        (Insert { .. }, Delete { .. }) => {
            let (i2, d2) = transform_insert_delete(a, b);
            (i2, d2)
        }
        (Delete { .. }, Insert { .. }) => {
            let (b2, a2) = transform_insert_delete(b, a);
            (a2, b2)
        }
        _ => (a.clone(), b.clone()),
    }
}

/// `insert vs delete`, returning `(insert', delete')`.
fn transform_insert_delete(insert: &Operation, delete: &Operation) -> (Operation, Operation) {
    let i_len = insert.insert_len().expect("insert operand");
    let d_len = match &delete.kind {
        OperationKind::Delete { length, .. } => *length,
        _ => panic!("delete operand"),
    };
    let d_end = delete.delete_end().expect("delete operand");

    if insert.position <= delete.position {
        let mut d2 = delete.clone();
        d2.position += i_len;
        (insert.clone(), d2)
    } else if insert.position >= d_end {
        let mut i2 = insert.clone();
        i2.position = i2.position.saturating_sub(d_len);
        (i2, delete.clone())
    } else {
        let mut i2 = insert.clone();
        i2.position = delete.position;
        let mut d2 = delete.clone();
        d2.kind = OperationKind::Delete {
            length: d_len + i_len,
            content: match &delete.kind {
                OperationKind::Delete { content, .. } => content.clone(),
                _ => unreachable!(),
            },
        };
        (i2, d2)
    }
}

/// Applies `op` to `content`, clamping `position`/`length` into bounds.
/// Never panics.
pub fn apply(content: &str, op: &Operation) -> String {
    let mut chars: Vec<char> = content.chars().collect();
    let len = chars.len();
    let position = op.position.min(len);

    match &op.kind {
        OperationKind::Insert { content: ins } => {
            let ins_chars: Vec<char> = ins.chars().collect();
            chars.splice(position..position, ins_chars);
        }
        OperationKind::Delete { length, .. } => {
            let end = (position + length).min(len);
            chars.splice(position..end, std::iter::empty());
        }
        OperationKind::Retain => {}
    }

    chars.into_iter().collect()
}

/// Folds a sequence of sequential operations (each based on the result of
/// the previous) into the smallest equivalent list: consecutive adjacent
/// inserts merge into one insert, consecutive same-position deletes merge
/// into one delete. Not commutative.
pub fn compose(ops: &[Operation]) -> Vec<Operation> {
    let mut out: Vec<Operation> = Vec::with_capacity(ops.len());

    for op in ops {
        let merged = match (out.last_mut(), &op.kind) {
            (Some(prev), OperationKind::Insert { content: next_content }) => {
                if let OperationKind::Insert { content: prev_content } = &mut prev.kind {
                    let prev_len = prev_content.chars().count();
                    if prev.position + prev_len == op.position {
                        prev_content.push_str(next_content);
                        true
                    } else {
                        false
                    }
                } else {
                    false
                }
            }
            (Some(prev), OperationKind::Delete { length: next_len, content: next_content }) => {
                if let OperationKind::Delete {
                    length: prev_len,
                    content: prev_content,
                } = &mut prev.kind
                {
                    if prev.position == op.position {
                        *prev_len += next_len;
                        prev_content.push_str(next_content);
                        true
                    } else {
                        false
                    }
                } else {
                    false
                }
            }
            _ => false,
        };

        if !merged {
            out.push(op.clone());
        }
    }

    out
}

/// insert -> delete of the inserted span; delete -> insert of the captured
/// content; retain -> retain.
pub fn invert(op: &Operation) -> Operation {
    match &op.kind {
        OperationKind::Insert { content } => Operation {
            kind: OperationKind::Delete {
                length: content.chars().count(),
                content: content.clone(),
            },
            position: op.position,
            base_version: op.base_version,
        },
        OperationKind::Delete { content, .. } => Operation {
            kind: OperationKind::Insert {
                content: content.clone(),
            },
            position: op.position,
            base_version: op.base_version,
        },
        OperationKind::Retain => op.clone(),
    }
}

/// `position` must be in `[0, content_length]`; for delete, the removed
/// span must not extend past `content_length`.
pub fn validate(op: &Operation, content_length: usize) -> bool {
    if op.position > content_length {
        return false;
    }
    match &op.kind {
        OperationKind::Delete { length, .. } => op.position + length <= content_length,
        _ => true,
    }
}
