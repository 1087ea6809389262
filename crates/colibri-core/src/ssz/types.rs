/// A named container field.
#[derive(Debug)]
pub struct Field {
    pub name: &'static str,
    pub ty: &'static SszType,
}

/// A union variant. Selector 0 with `ty: None` is the SSZ `None` variant,
/// encoded as a single zero byte.
#[derive(Debug)]
pub struct UnionVariant {
    pub name: &'static str,
    pub ty: Option<&'static SszType>,
}

/// Static SSZ type descriptor.
///
/// Descriptors are built as `static` items referencing each other, so the
/// whole consensus schema lives in rodata and views carry a `&'static`
/// pointer instead of owning type information.
#[derive(Debug)]
pub enum SszType {
    /// Unsigned little-endian integer of the given byte width (1, 2, 4, 8, 32).
    Uint(usize),
    Bool,
    /// Fixed-length byte vector (`Vector[uint8, N]` shorthand).
    Bytes(usize),
    /// Variable list: element type and maximum element count.
    List(&'static SszType, usize),
    /// Fixed vector: element type and element count.
    Vector(&'static SszType, usize),
    /// Bitlist with maximum bit count (delimiter-bit encoding).
    Bitlist(usize),
    /// Fixed bitvector with bit count.
    Bitvector(usize),
    Container(&'static [Field]),
    Union(&'static [UnionVariant]),
}

impl SszType {
    /// Serialized size if the type is fixed-size, `None` otherwise.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            SszType::Uint(w) => Some(*w),
            SszType::Bool => Some(1),
            SszType::Bytes(n) => Some(*n),
            SszType::Vector(elem, n) => elem.fixed_size().map(|s| s * n),
            SszType::Bitvector(bits) => Some(bits.div_ceil(8)),
            SszType::List(..) | SszType::Bitlist(_) | SszType::Union(_) => None,
            SszType::Container(fields) => {
                let mut total = 0;
                for f in *fields {
                    total += f.ty.fixed_size()?;
                }
                Some(total)
            }
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed_size().is_some()
    }

    /// Byte width of a *basic* type (uint, bool). Basic elements pack into
    /// shared chunks when merkleized; everything else gets a chunk subtree
    /// per element.
    pub fn basic_size(&self) -> Option<usize> {
        match self {
            SszType::Uint(w) => Some(*w),
            SszType::Bool => Some(1),
            _ => None,
        }
    }

    /// Number of 32-byte chunks at this type's own Merkle leaf layer
    /// (the limit for lists, the actual count for everything else).
    pub fn chunk_limit(&self) -> usize {
        match self {
            SszType::Uint(_) | SszType::Bool => 1,
            SszType::Bytes(n) => n.div_ceil(32).max(1),
            SszType::Vector(elem, n) => match elem.basic_size() {
                Some(size) => (n * size).div_ceil(32).max(1),
                None => *n,
            },
            SszType::List(elem, limit) => match elem.basic_size() {
                Some(size) => (limit * size).div_ceil(32).max(1),
                None => *limit,
            },
            SszType::Bitvector(bits) => bits.div_ceil(256).max(1),
            SszType::Bitlist(limit) => limit.div_ceil(256).max(1),
            SszType::Container(fields) => fields.len().max(1),
            // Union value occupies a single subtree next to the selector.
            SszType::Union(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static U64: SszType = SszType::Uint(8);
    static B32: SszType = SszType::Bytes(32);
    static HEADER: SszType = SszType::Container(&[
        Field { name: "slot", ty: &U64 },
        Field { name: "root", ty: &B32 },
    ]);
    static ROOTS: SszType = SszType::Vector(&B32, 4);
    static TXS: SszType = SszType::List(&BYTES_LIST, 1048576);
    static BYTES_LIST: SszType = SszType::List(&U8, 1073741824);
    static U8: SszType = SszType::Uint(1);

    #[test]
    fn fixed_sizes() {
        assert_eq!(U64.fixed_size(), Some(8));
        assert_eq!(HEADER.fixed_size(), Some(40));
        assert_eq!(ROOTS.fixed_size(), Some(128));
        assert_eq!(TXS.fixed_size(), None);
        assert_eq!(SszType::Bitvector(512).fixed_size(), Some(64));
    }

    #[test]
    fn chunk_limits() {
        assert_eq!(U64.chunk_limit(), 1);
        assert_eq!(SszType::Bytes(48).chunk_limit(), 2);
        assert_eq!(ROOTS.chunk_limit(), 4);
        assert_eq!(TXS.chunk_limit(), 1048576);
        assert_eq!(BYTES_LIST.chunk_limit(), 33554432);
        assert_eq!(SszType::Bitvector(512).chunk_limit(), 2);
    }
}
