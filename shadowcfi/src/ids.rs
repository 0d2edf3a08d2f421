//! Typed index newtypes for every entity arena in the analyzer.
//!
//! Mirrors the `FuncIdx`/`BBlockIdx`/`InstrIdx` family used by AOT IR
//! deserializers elsewhere in the tree: a plain `u32` wrapped so that a
//! `BlockId` can never be used where a `FuncId` is expected.

use std::fmt;

macro_rules! index_type {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
        pub struct $name(u32);

        impl $name {
            pub fn new(v: usize) -> Self {
                Self(u32::try_from(v).expect("index overflow"))
            }

            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl From<usize> for $name {
            fn from(v: usize) -> Self {
                Self::new(v)
            }
        }

        impl From<$name> for usize {
            fn from(v: $name) -> Self {
                v.index()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

index_type!(FuncId);
index_type!(BlockId);
index_type!(InstrId);
index_type!(SccId);
index_type!(ObjectId);
