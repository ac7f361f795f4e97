//! Small crate-wide macros, in the spirit of the teacher's
//! `flag_to_function!`/`flags_to_struct!`: declarative generation of the
//! repetitive bitflag-shaped types used for stub flags, cell flags, and
//! parameter flags.

/// A minimal `bitflags`-shaped type: named power-of-two constants plus
/// `contains`/`union`/`insert`/`remove`. Kept dependency-free and local
/// since every flag set in this crate fits in a `u8`/`u16`.
macro_rules! bitflags_like {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $repr:ty {
            $(const $flag:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
        pub struct $name($repr);
        impl $name {
            $(pub const $flag: $name = $name($value);)*
            pub const EMPTY: $name = $name(0);

            pub const fn contains(self, other: $name) -> bool {
                (self.0 & other.0) == other.0
            }
            pub const fn union(self, other: $name) -> $name {
                $name(self.0 | other.0)
            }
            pub fn insert(&mut self, other: $name) {
                self.0 |= other.0;
            }
            pub fn remove(&mut self, other: $name) {
                self.0 &= !other.0;
            }
        }
        impl std::ops::BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                self.union(rhs)
            }
        }
    };
}

pub(crate) use bitflags_like;
