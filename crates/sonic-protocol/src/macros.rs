//! Declarative helpers for enumerations that travel over the wire as text.

/// Declare a closed enumeration with a textual wire form.
///
/// Each member maps to a wire string and optionally to an integer form.
/// Parsing is case-insensitive and accepts the wire string, the member name
/// (ignoring underscores) or the integer form.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $wire:literal $(=> $int:literal)?
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant
            ),+
        }

        impl $name {
            /// All members in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Get the wire string of this member.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }

            /// Get the member name as declared.
            pub fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant)),+
                }
            }

            /// Get the integer form, if the enumeration is integer-valued.
            pub fn int_value(&self) -> Option<i64> {
                match self {
                    $($name::$variant => wire_enum!(@int $($int)?)),+
                }
            }

            /// Parse a member from its wire string, name or integer form.
            pub fn parse(input: &str) -> Option<$name> {
                let input = input.trim();
                let squashed = input.replace('_', "");
                let number = input.parse::<i64>().ok();
                $name::ALL.iter().copied().find(|member| {
                    member.as_str().eq_ignore_ascii_case(input)
                        || member.name().eq_ignore_ascii_case(&squashed)
                        || (number.is_some() && member.int_value() == number)
                })
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::ParseValueError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $name::parse(s).ok_or_else(|| $crate::ParseValueError::new(stringify!($name), s))
            }
        }
    };
    (@int $int:literal) => { Some($int) };
    (@int) => { None };
}
