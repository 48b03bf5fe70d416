//! Tagged VM values
//!
//! A value is a 64-bit word plus a 4-bit tag, the primitive carrier the
//! whole slot store is built from. Values are plain data: `Copy`, no
//! heap ownership. Words of object-kind values are dense handles into
//! the context's instance registry, and function words are indices into
//! the function reference set, so a value never carries a raw pointer
//! that a moving collector could invalidate.

/// A machine word: the payload half of a value.
pub type Word = u64;

/// Value tags. The representation is confined to 4 bits; the in-range
/// check is a compile-time assertion below.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// The `undefined` sentinel
    Undef = 0,
    /// The `null` value
    Null,
    /// Boolean
    Bool,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// IEEE 754 double
    Float64,
    /// Raw host pointer (opaque to the object model)
    RawPtr,
    /// String payload
    String,
    /// Function reference
    FunPtr,
    /// Untyped heap reference (element tables and similar internals)
    RefPtr,
    /// Plain object instance
    Object,
    /// Closure instance
    Closure,
    /// Array instance
    Array,
}

// Tags must fit the 4-bit field reserved for them in slot stores.
const _: () = assert!(Tag::Array as u8 <= 0xF);

impl Tag {
    /// True for values represented as shaped instances.
    #[inline]
    pub const fn is_object_kind(self) -> bool {
        matches!(self, Tag::Object | Tag::Closure | Tag::Array)
    }

    /// True for values whose word is a heap handle of some sort.
    #[inline]
    pub const fn is_heap(self) -> bool {
        matches!(
            self,
            Tag::String | Tag::RefPtr | Tag::Object | Tag::Closure | Tag::Array
        )
    }
}

/// Dense handle to a registered instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(pub(crate) u32);

/// Dense index into the VM's function reference set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunId(pub(crate) u32);

impl FunId {
    /// The raw index.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

/// A tagged value: word plus tag. Copied freely.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Value {
    word: Word,
    tag: Tag,
}

impl Value {
    /// Build a value from raw parts.
    #[inline]
    pub const fn new(word: Word, tag: Tag) -> Self {
        Self { word, tag }
    }

    /// The `undefined` value.
    #[inline]
    pub const fn undef() -> Self {
        Self::new(0, Tag::Undef)
    }

    /// The `null` value.
    #[inline]
    pub const fn null() -> Self {
        Self::new(0, Tag::Null)
    }

    /// A boolean value.
    #[inline]
    pub const fn boolean(b: bool) -> Self {
        Self::new(b as Word, Tag::Bool)
    }

    /// A 32-bit integer value.
    #[inline]
    pub const fn int32(i: i32) -> Self {
        Self::new(i as u32 as Word, Tag::Int32)
    }

    /// A 64-bit integer value.
    #[inline]
    pub const fn int64(i: i64) -> Self {
        Self::new(i as Word, Tag::Int64)
    }

    /// A float value.
    #[inline]
    pub fn float64(f: f64) -> Self {
        Self::new(f.to_bits(), Tag::Float64)
    }

    /// A function reference value.
    #[inline]
    pub const fn fun(id: FunId) -> Self {
        Self::new(id.0 as Word, Tag::FunPtr)
    }

    /// An untyped heap reference to a registered instance.
    #[inline]
    pub const fn refptr(h: HandleId) -> Self {
        Self::new(h.0 as Word, Tag::RefPtr)
    }

    pub(crate) const fn instance_ref(h: HandleId, tag: Tag) -> Self {
        debug_assert!(tag.is_object_kind());
        Self::new(h.0 as Word, tag)
    }

    /// The value's word.
    #[inline]
    pub const fn word(self) -> Word {
        self.word
    }

    /// The value's tag.
    #[inline]
    pub const fn tag(self) -> Tag {
        self.tag
    }

    /// Is this `undefined`?
    #[inline]
    pub const fn is_undef(self) -> bool {
        matches!(self.tag, Tag::Undef)
    }

    /// Is this `null`?
    #[inline]
    pub const fn is_null(self) -> bool {
        matches!(self.tag, Tag::Null)
    }

    /// The integer payload, when the tag is `Int32`.
    #[inline]
    pub fn as_int32(self) -> Option<i32> {
        match self.tag {
            Tag::Int32 => Some(self.word as u32 as i32),
            _ => None,
        }
    }

    /// The float payload, when the tag is `Float64`.
    #[inline]
    pub fn as_float64(self) -> Option<f64> {
        match self.tag {
            Tag::Float64 => Some(f64::from_bits(self.word)),
            _ => None,
        }
    }

    /// The boolean payload, when the tag is `Bool`.
    #[inline]
    pub fn as_bool(self) -> Option<bool> {
        match self.tag {
            Tag::Bool => Some(self.word != 0),
            _ => None,
        }
    }

    /// The function reference, when the tag is `FunPtr`.
    #[inline]
    pub fn as_fun(self) -> Option<FunId> {
        match self.tag {
            Tag::FunPtr => Some(FunId(self.word as u32)),
            _ => None,
        }
    }

    /// The instance handle, for object-kind and heap-reference values.
    #[inline]
    pub fn as_handle(self) -> Option<HandleId> {
        if self.tag.is_object_kind() || matches!(self.tag, Tag::RefPtr) {
            Some(HandleId(self.word as u32))
        } else {
            None
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.tag {
            Tag::Undef => write!(f, "undefined"),
            Tag::Null => write!(f, "null"),
            Tag::Bool => write!(f, "{}", self.word != 0),
            Tag::Int32 => write!(f, "{}", self.word as u32 as i32),
            Tag::Int64 => write!(f, "{}i64", self.word as i64),
            Tag::Float64 => write!(f, "{}", f64::from_bits(self.word)),
            _ => write!(f, "{:?}({:#x})", self.tag, self.word),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int32_round_trip() {
        assert_eq!(Value::int32(42).as_int32(), Some(42));
        assert_eq!(Value::int32(-7).as_int32(), Some(-7));
        assert_eq!(Value::int32(i32::MIN).as_int32(), Some(i32::MIN));
        assert_eq!(Value::boolean(true).as_int32(), None);
    }

    #[test]
    fn test_float64_round_trip() {
        assert_eq!(Value::float64(1.5).as_float64(), Some(1.5));
        let nan = Value::float64(f64::NAN);
        assert!(nan.as_float64().unwrap().is_nan());
    }

    #[test]
    fn test_sentinels() {
        assert!(Value::undef().is_undef());
        assert!(Value::null().is_null());
        assert!(!Value::null().is_undef());
    }

    #[test]
    fn test_object_kind_predicate() {
        assert!(Tag::Object.is_object_kind());
        assert!(Tag::Closure.is_object_kind());
        assert!(Tag::Array.is_object_kind());
        assert!(!Tag::String.is_object_kind());
        assert!(!Tag::FunPtr.is_object_kind());
        assert!(!Tag::RefPtr.is_object_kind());
    }

    #[test]
    fn test_fun_round_trip() {
        let v = Value::fun(FunId(9));
        assert_eq!(v.as_fun(), Some(FunId(9)));
        assert_eq!(v.as_handle(), None);
    }
}
