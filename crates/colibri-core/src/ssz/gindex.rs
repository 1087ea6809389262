use super::types::SszType;
use super::SszError;

/// One step of a tree path: a container field by name or a list/vector
/// element by index.
#[derive(Debug, Clone, Copy)]
pub enum PathStep<'a> {
    Field(&'a str),
    Index(usize),
}

/// Depth of a generalized index (0 for the root).
pub fn gindex_depth(g: u64) -> u32 {
    63 - g.leading_zeros()
}

/// Append a subtree gindex to a root-relative gindex: the child's leading 1
/// is removed and its path bits are shifted under the parent.
pub fn gindex_add(parent: u64, child: u64) -> u64 {
    let depth = gindex_depth(child);
    (parent << depth) | (child & !(1u64 << depth))
}

/// Resolve a path through a descriptor to the generalized index of the
/// addressed subtree (chunk level), along with the type found there.
///
/// List paths descend through the data side of the length mixin; basic
/// elements resolve to the 32-byte chunk that contains them.
pub fn resolve_path(
    ty: &'static SszType,
    path: &[PathStep<'_>],
) -> Result<(u64, &'static SszType), SszError> {
    let mut g: u64 = 1;
    let mut current = ty;

    for step in path {
        match (current, step) {
            (SszType::Container(fields), PathStep::Field(name)) => {
                let index = fields
                    .iter()
                    .position(|f| f.name == *name)
                    .ok_or_else(|| SszError::UnknownField(name.to_string()))?;
                let depth = chunk_tree_depth(fields.len());
                g = (g << depth) | index as u64;
                current = fields[index].ty;
            }
            (SszType::Vector(elem, n), PathStep::Index(i)) => {
                if *i >= *n {
                    return Err(SszError::IndexOutOfBounds { index: *i, len: *n });
                }
                let depth = chunk_tree_depth(current.chunk_limit());
                g = (g << depth) | element_chunk(elem, *i) as u64;
                current = *elem;
            }
            (SszType::List(elem, limit), PathStep::Index(i)) => {
                if *i >= *limit {
                    return Err(SszError::IndexOutOfBounds {
                        index: *i,
                        len: *limit,
                    });
                }
                // Step through the length mixin to the data subtree first.
                g <<= 1;
                let depth = chunk_tree_depth(current.chunk_limit());
                g = (g << depth) | element_chunk(elem, *i) as u64;
                current = *elem;
            }
            _ => return Err(SszError::TypeMismatch("path step does not match type")),
        }
    }
    Ok((g, current))
}

/// Depth of the chunk tree for the given leaf budget.
pub(crate) fn chunk_tree_depth(chunks: usize) -> u32 {
    chunks.max(1).next_power_of_two().trailing_zeros()
}

/// Chunk index that holds element `i`. Packed basic elements share chunks;
/// composite elements occupy one chunk subtree each.
fn element_chunk(elem: &SszType, i: usize) -> usize {
    match elem.basic_size() {
        Some(size) => i * size / 32,
        None => i,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssz::types::Field;

    static U64: SszType = SszType::Uint(8);
    static B32: SszType = SszType::Bytes(32);
    static HEADER: SszType = SszType::Container(&[
        Field { name: "slot", ty: &U64 },
        Field { name: "proposer_index", ty: &U64 },
        Field { name: "parent_root", ty: &B32 },
        Field { name: "state_root", ty: &B32 },
        Field { name: "body_root", ty: &B32 },
    ]);

    #[test]
    fn header_field_gindexes() {
        // 5 fields pad to 8 leaves: slot at 8, state_root at 11.
        let (g, _) = resolve_path(&HEADER, &[PathStep::Field("slot")]).unwrap();
        assert_eq!(g, 8);
        let (g, _) = resolve_path(&HEADER, &[PathStep::Field("state_root")]).unwrap();
        assert_eq!(g, 11);
    }

    #[test]
    fn vector_element_gindex() {
        static ROOTS: SszType = SszType::Vector(&B32, 8192);
        let (g, _) = resolve_path(&ROOTS, &[PathStep::Index(5)]).unwrap();
        assert_eq!(g, 8192 + 5);
    }

    #[test]
    fn list_descends_through_mixin() {
        static TXS: SszType = SszType::List(&B32, 16);
        let (g, _) = resolve_path(&TXS, &[PathStep::Index(3)]).unwrap();
        // Root -> data (2) -> 16-leaf tree -> leaf 3.
        assert_eq!(g, (2 << 4) | 3);
    }

    #[test]
    fn gindex_add_is_associative() {
        let cases = [(2u64, 5u64, 9u64), (25, 34, 3), (3, 3, 3), (11, 2, 7)];
        for (a, b, c) in cases {
            assert_eq!(
                gindex_add(gindex_add(a, b), c),
                gindex_add(a, gindex_add(b, c))
            );
        }
    }

    #[test]
    fn gindex_add_identity() {
        assert_eq!(gindex_add(25, 1), 25);
        assert_eq!(gindex_add(1, 25), 25);
    }

    #[test]
    fn nested_path_matches_manual_addition() {
        static BODY: SszType = SszType::Container(&[
            Field { name: "a", ty: &U64 },
            Field { name: "header", ty: &HEADER },
        ]);
        let (nested, _) = resolve_path(
            &BODY,
            &[PathStep::Field("header"), PathStep::Field("state_root")],
        )
        .unwrap();
        let (outer, _) = resolve_path(&BODY, &[PathStep::Field("header")]).unwrap();
        let (inner, _) = resolve_path(&HEADER, &[PathStep::Field("state_root")]).unwrap();
        assert_eq!(nested, gindex_add(outer, inner));
    }
}
