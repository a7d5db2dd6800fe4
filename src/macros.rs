#![macro_use]

macro_rules! iterator_for_nodeiterator {
    ($ty: ty) => {
        impl Iterator for $ty {
            type Item = $crate::newtypes::NodeId;
            fn next(&mut self) -> Option<Self::Item> {
                self.next_node();
                self.current_node()
            }
        }
    };
}

macro_rules! impl_table_id {
    ($idtype: ident) => {
        impl $idtype {
            /// Sentinel for "no row".
            pub const NULL: $idtype = Self(-1);
        }

        impl $crate::traits::private_traits::TableIdPrivate for $idtype {
            fn new(value: $crate::newtypes::RawId) -> Self {
                Self(value)
            }

            fn raw(&self) -> $crate::newtypes::RawId {
                self.0
            }
        }

        impl $crate::traits::TableId for $idtype {
            fn is_null(&self) -> bool {
                *self == Self::NULL
            }
        }

        impl From<$crate::newtypes::RawId> for $idtype {
            fn from(value: $crate::newtypes::RawId) -> Self {
                if value >= 0 {
                    Self(value)
                } else {
                    Self::NULL
                }
            }
        }

        impl From<usize> for $idtype {
            fn from(value: usize) -> Self {
                use num_traits::ToPrimitive;
                match value.to_i32() {
                    Some(x) => Self(x),
                    None => Self::NULL,
                }
            }
        }

        impl From<$idtype> for usize {
            fn from(value: $idtype) -> Self {
                value.0 as Self
            }
        }

        impl From<$idtype> for $crate::newtypes::RawId {
            fn from(item: $idtype) -> Self {
                item.0
            }
        }

        impl PartialEq<$crate::newtypes::RawId> for $idtype {
            fn eq(&self, other: &$crate::newtypes::RawId) -> bool {
                self.0 == *other
            }
        }

        impl PartialEq<$idtype> for $crate::newtypes::RawId {
            fn eq(&self, other: &$idtype) -> bool {
                *self == other.0
            }
        }

        impl PartialOrd<$crate::newtypes::RawId> for $idtype {
            fn partial_cmp(&self, other: &$crate::newtypes::RawId) -> Option<std::cmp::Ordering> {
                self.0.partial_cmp(other)
            }
        }

        impl PartialOrd<$idtype> for $crate::newtypes::RawId {
            fn partial_cmp(&self, other: &$idtype) -> Option<std::cmp::Ordering> {
                self.partial_cmp(&other.0)
            }
        }

        impl std::fmt::Display for $idtype {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}
