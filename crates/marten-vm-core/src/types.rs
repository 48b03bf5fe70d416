//! Value-type lattice
//!
//! A `ValueType` records what the VM knows about a value: possibly its
//! tag, and possibly one of three mutually exclusive refinements (the
//! shape of an object, the identity of a function, or the exact word of
//! an integer). The compiler merges these facts at control-flow joins and
//! the shape tree records their projection per property, which is where
//! type feedback for specialization comes from.
//!
//! The payload is an enum rather than three flag/field pairs: the "at
//! most one refinement at a time" invariant is unrepresentable instead
//! of asserted.

use crate::context::VmContext;
use crate::shape::ShapeId;
use crate::value::{FunId, Tag, Value, Word};

/// The exclusive refinement carried by a [`ValueType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TypePayload {
    /// Nothing beyond the tag is known.
    #[default]
    None,
    /// The value is an instance with this exact shape.
    Shape(ShapeId),
    /// The value is this exact function.
    Fun(FunId),
    /// The value is this exact word.
    Word(Word),
}

/// A lattice element describing partial knowledge of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueType {
    tag: Option<Tag>,
    payload: TypePayload,
    /// Value is known to be strictly below the tag's maximum; lets the
    /// compiler elide overflow checks.
    sub_max: bool,
}

impl ValueType {
    /// ⊤, the all-unknown element.
    #[inline]
    pub const fn any() -> Self {
        Self {
            tag: None,
            payload: TypePayload::None,
            sub_max: false,
        }
    }

    /// The exact type of a concrete value: tag known, plus the shape of
    /// an object, the identity of a function, or the word of an `Int32`.
    pub fn of(ctx: &VmContext, v: Value) -> Self {
        let tag = v.tag();
        let payload = if tag.is_object_kind() {
            TypePayload::Shape(ctx.instance(v).shape_idx())
        } else {
            match tag {
                Tag::FunPtr => TypePayload::Fun(v.as_fun().expect("funptr value without an id")),
                Tag::Int32 => TypePayload::Word(v.word()),
                _ => TypePayload::None,
            }
        };
        Self {
            tag: Some(tag),
            payload,
            sub_max: false,
        }
    }

    /// Construct from parts (compiler-side use).
    #[inline]
    pub const fn with(tag: Option<Tag>, payload: TypePayload, sub_max: bool) -> Self {
        Self {
            tag,
            payload,
            sub_max,
        }
    }

    /// The tag, when known.
    #[inline]
    pub const fn tag(self) -> Option<Tag> {
        self.tag
    }

    /// The exclusive refinement.
    #[inline]
    pub const fn payload(self) -> TypePayload {
        self.payload
    }

    /// Overflow-elision flag.
    #[inline]
    pub const fn sub_max(self) -> bool {
        self.sub_max
    }

    /// This type with `sub_max` set.
    #[inline]
    pub const fn with_sub_max(self) -> Self {
        Self {
            tag: self.tag,
            payload: self.payload,
            sub_max: true,
        }
    }

    /// Is this ⊤?
    #[inline]
    pub fn is_any(self) -> bool {
        self == Self::any()
    }

    /// Lattice join: each fact survives only when both sides agree on it.
    pub fn join(a: Self, b: Self) -> Self {
        Self {
            tag: if a.tag == b.tag { a.tag } else { None },
            payload: if a.payload == b.payload {
                a.payload
            } else {
                TypePayload::None
            },
            sub_max: a.sub_max && b.sub_max,
        }
    }

    /// `a` refines `b`: joining adds nothing `b` did not already admit.
    #[inline]
    pub fn is_subtype(self, sup: Self) -> bool {
        Self::join(self, sup) == sup
    }

    /// The projection recorded in a shape node.
    ///
    /// Shapes must not depend on particular instances or exact words, so
    /// the shape and word refinements are dropped, along with `sub_max`.
    /// Two options narrow further: `shape_notagspec` drops the tag, and
    /// `shape_nofptrspec` drops function identity. When function
    /// identity is kept and the input is a closure with a known shape,
    /// the identity is lifted out of the closure shape's `__fptr__`
    /// entry, so callsites stay specialized across shape transitions
    /// without tying the shape to one closure instance.
    pub fn prop_type(self, ctx: &VmContext) -> Self {
        let config = ctx.config();
        let tag = if config.shape_notagspec {
            None
        } else {
            self.tag
        };
        let payload = match self.payload {
            TypePayload::Fun(f) if !config.shape_nofptrspec => TypePayload::Fun(f),
            TypePayload::Shape(sid)
                if !config.shape_nofptrspec && self.tag == Some(Tag::Closure) =>
            {
                match ctx
                    .shape_at(sid)
                    .get_def_shape(ctx, crate::object::FPTR_PROP_NAME)
                {
                    Some(def) => match def.ty().payload {
                        TypePayload::Fun(f) => TypePayload::Fun(f),
                        _ => TypePayload::None,
                    },
                    None => TypePayload::None,
                }
            }
            _ => TypePayload::None,
        };
        Self {
            tag,
            payload,
            sub_max: false,
        }
    }
}

impl Default for ValueType {
    fn default() -> Self {
        Self::any()
    }
}
