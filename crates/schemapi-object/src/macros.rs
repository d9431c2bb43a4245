//! # Wrapper Declarations
//!
//! [`schema_class!`](crate::schema_class) declares a typed wrapper struct
//! for one definition of a schema family. Two shapes are supported:
//!
//! ```text
//! schema_class! {
//!     /// An aggregated field.
//!     pub struct AggregatedFieldDef in VEGALITE => "AggregatedFieldDef" {
//!         op: "op",
//!         field: "field",
//!         as_: "as",
//!     }
//! }
//!
//! schema_class! {
//!     /// Horizontal alignment.
//!     pub struct Align(value) in VEGALITE => "Align";
//! }
//! ```
//!
//! Keyword classes get one `Option<Prop>` field per declared property plus
//! an `extra` map for anything else; `None` means Undefined. The quoted
//! name is the JSON key, which lets a property whose name is a Rust keyword
//! (`as`, `type`) live in a field with a trailing underscore. Positional
//! classes wrap a single [`Prop`](crate::Prop).
//!
//! Use `=> root` instead of a definition name for a class backed by the
//! document root.

/// Declare a typed wrapper for a schema definition. See the
/// [module docs](crate::macros).
#[macro_export]
macro_rules! schema_class {
    (@fragment root) => {
        $crate::Fragment::Root
    };
    (@fragment $def:literal) => {
        $crate::Fragment::Definition($def)
    };

    (@conversions $name:ident) => {
        impl ::core::convert::From<$name> for $crate::SchemaObject {
            fn from(value: $name) -> Self {
                <$name as $crate::SchemaWrapper>::into_object(value)
            }
        }

        impl ::core::convert::From<$name> for $crate::Prop {
            fn from(value: $name) -> Self {
                $crate::Prop::from(<$name as $crate::SchemaWrapper>::into_object(value))
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                ::core::fmt::Display::fmt(
                    &<$name as $crate::SchemaWrapper>::into_object(::core::clone::Clone::clone(self)),
                    f,
                )
            }
        }
    };

    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident (value) in $family:path => $def:tt;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        $vis struct $name(pub $crate::Prop);

        impl $name {
            /// Wrap a value.
            pub fn new(value: impl ::core::convert::Into<$crate::Prop>) -> Self {
                Self(value.into())
            }
        }

        impl $crate::SchemaWrapper for $name {
            fn class() -> &'static $crate::SchemaClass {
                static CLASS: $crate::SchemaClass = $crate::SchemaClass::new(
                    ::core::stringify!($name),
                    &$family,
                    $crate::schema_class!(@fragment $def),
                    $crate::ClassKind::Value,
                );
                &CLASS
            }

            fn into_object(self) -> $crate::SchemaObject {
                $crate::SchemaObject::from_value(<Self as $crate::SchemaWrapper>::class(), self.0)
            }
        }

        impl ::core::convert::TryFrom<$crate::SchemaObject> for $name {
            type Error = $crate::ConstructionError;

            fn try_from(obj: $crate::SchemaObject) -> ::core::result::Result<Self, Self::Error> {
                $crate::macros::check_class(&obj, <Self as $crate::SchemaWrapper>::class())?;
                ::core::result::Result::Ok(Self(obj.value().clone()))
            }
        }

        $crate::schema_class!(@conversions $name);
    };

    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident in $family:path => $def:tt {
            $( $(#[$fmeta:meta])* $field:ident : $key:literal ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq)]
        $vis struct $name {
            $(
                $(#[$fmeta])*
                pub $field: ::core::option::Option<$crate::Prop>,
            )*
            /// Properties not declared by the schema.
            pub extra: ::std::collections::BTreeMap<::std::string::String, $crate::Prop>,
        }

        impl $name {
            /// JSON names of the declared properties.
            pub const PROPERTIES: &'static [&'static str] = &[$($key),*];

            /// An instance with every property Undefined.
            pub fn new() -> Self {
                Self::default()
            }

            $(
                #[must_use]
                pub fn $field(mut self, value: impl ::core::convert::Into<$crate::Prop>) -> Self {
                    self.$field = ::core::option::Option::Some(value.into());
                    self
                }
            )*

            /// Set an undeclared property.
            #[must_use]
            pub fn with_extra(
                mut self,
                key: impl ::core::convert::Into<::std::string::String>,
                value: impl ::core::convert::Into<$crate::Prop>,
            ) -> Self {
                self.extra.insert(key.into(), value.into());
                self
            }
        }

        impl $crate::SchemaWrapper for $name {
            fn class() -> &'static $crate::SchemaClass {
                static CLASS: $crate::SchemaClass = $crate::SchemaClass::new(
                    ::core::stringify!($name),
                    &$family,
                    $crate::schema_class!(@fragment $def),
                    $crate::ClassKind::Object,
                );
                &CLASS
            }

            fn into_object(self) -> $crate::SchemaObject {
                let mut obj = $crate::SchemaObject::new(<Self as $crate::SchemaWrapper>::class());
                $(
                    if let ::core::option::Option::Some(value) = self.$field {
                        obj.set($key, value);
                    }
                )*
                obj.extend(self.extra);
                obj
            }
        }

        impl ::core::convert::TryFrom<$crate::SchemaObject> for $name {
            type Error = $crate::ConstructionError;

            fn try_from(obj: $crate::SchemaObject) -> ::core::result::Result<Self, Self::Error> {
                $crate::macros::check_class(&obj, <Self as $crate::SchemaWrapper>::class())?;
                let mut out = Self::default();
                for (key, value) in obj.properties() {
                    match key {
                        $( $key => out.$field = ::core::option::Option::Some(value.clone()), )*
                        _ => {
                            out.extra.insert(key.to_string(), value.clone());
                        }
                    }
                }
                ::core::result::Result::Ok(out)
            }
        }

        $crate::schema_class!(@conversions $name);
    };
}

use crate::class::SchemaClass;
use crate::error::ConstructionError;
use crate::object::SchemaObject;

/// Fail unless `obj` is an instance of `class`. Used by generated
/// `TryFrom` impls.
#[doc(hidden)]
pub fn check_class(obj: &SchemaObject, class: &'static SchemaClass) -> Result<(), ConstructionError> {
    if obj.class() == class {
        Ok(())
    } else {
        Err(ConstructionError::Shape {
            class: class.name().to_string(),
            expected: format!("a {} object", class.name()),
            found: format!("a {} object", obj.class_name()),
        })
    }
}
